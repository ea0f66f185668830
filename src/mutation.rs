//! Pod mutation engine
//!
//! Decides, per admission request, whether a Pod is rewritten:
//!
//! 1. Requests for anything other than the configured Pod resource pass through
//! 2. The embedded object is decoded into a [`Pod`] (the only fatal failure)
//! 3. Pods without the managed label pass through
//! 4. Every claim-backed volume is pointed at its replica claim, which is
//!    reconciled into existence first
//! 5. The Pod is pinned to the target node via its node selector
//! 6. Changed fields are turned into a JSON Patch
//!
//! Reconciliation failures are logged and never block the Pod.

use std::collections::BTreeMap;
use std::sync::Arc;

use json_patch::PatchOperation;
use k8s_openapi::api::core::v1::{Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use kube::core::admission::AdmissionRequest;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::ClaimClient;
use crate::config::{WebhookConfig, HOSTNAME_LABEL};
use crate::patch::{build_patch, PodChanges};
use crate::reconciler::{ClaimOutcome, ClaimReconciler};
use crate::Error;

/// Stateless decision engine shared across concurrent admissions
pub struct PodMutator {
    config: WebhookConfig,
    reconciler: ClaimReconciler,
}

impl PodMutator {
    /// Create an engine with fixed configuration and a shared API client
    pub fn new(config: WebhookConfig, client: Arc<dyn ClaimClient>) -> Self {
        Self {
            config,
            reconciler: ClaimReconciler::new(client),
        }
    }

    /// Configuration the engine was built with
    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Compute the patch for one admission request
    ///
    /// Returns an empty set when the request is not for a managed Pod or when
    /// nothing changed. Only a decode failure is returned as an error.
    pub async fn decide(
        &self,
        request: &AdmissionRequest<DynamicObject>,
    ) -> Result<Vec<PatchOperation>, Error> {
        let uid = &request.uid;

        if !self.config.is_pod_resource(&request.resource) {
            warn!(
                uid = %uid,
                resource = ?request.resource,
                "Expected pod resource, allowing unchanged"
            );
            return Ok(Vec::new());
        }

        let mut pod = decode_pod(request.object.as_ref())?;

        if !self.is_managed(&pod) {
            debug!(uid = %uid, pod = ?pod.metadata.name, "Pod is not managed, allowing unchanged");
            return Ok(Vec::new());
        }

        let deadline = Instant::now() + self.config.reconcile_timeout;
        let namespace = pod
            .metadata
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .or_else(|| request.namespace.clone().filter(|ns| !ns.is_empty()))
            .unwrap_or_else(|| "default".to_string());
        let pod_name = pod
            .metadata
            .name
            .clone()
            .or_else(|| pod.metadata.generate_name.clone())
            .unwrap_or_default();
        let owner = pod
            .metadata
            .owner_references
            .as_ref()
            .and_then(|refs| refs.first())
            .cloned();

        let spec = pod.spec.get_or_insert_with(PodSpec::default);
        let mut changes = PodChanges::default();

        for volume in spec.volumes.iter_mut().flatten() {
            let Some(source) = volume.persistent_volume_claim.as_mut() else {
                continue;
            };
            let replica = self.config.replica_claim_name(&source.claim_name);
            info!(
                pod = %pod_name,
                namespace = %namespace,
                from = %source.claim_name,
                to = %replica,
                "Rewriting claim reference"
            );

            self.reconcile_claim(&namespace, &replica, owner.as_ref(), deadline)
                .await;

            source.claim_name = replica;
            changes.volumes = true;
        }

        let selector = spec.node_selector.get_or_insert_with(BTreeMap::new);
        let previous = selector.insert(HOSTNAME_LABEL.to_string(), self.config.target_node.clone());
        if previous.as_deref() != Some(self.config.target_node.as_str()) {
            info!(pod = %pod_name, node = %self.config.target_node, "Assigning pod to node");
            changes.node_selector = true;
        }

        if changes.is_empty() {
            return Ok(Vec::new());
        }
        build_patch(spec, changes)
    }

    fn is_managed(&self, pod: &Pod) -> bool {
        pod.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(&self.config.managed_label_key))
            .is_some_and(|value| *value == self.config.managed_label_value)
    }

    /// Run get-or-create for one claim, bounded by the request deadline
    async fn reconcile_claim(
        &self,
        namespace: &str,
        claim: &str,
        owner: Option<&OwnerReference>,
        deadline: Instant,
    ) {
        let result = match tokio::time::timeout_at(
            deadline,
            self.reconciler.ensure_replica_claim(namespace, claim, owner),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                namespace: namespace.to_string(),
                claim: claim.to_string(),
            }),
        };

        match result {
            Ok(ClaimOutcome::Created) => {
                info!(namespace = %namespace, claim = %claim, "Created replica claim");
            }
            Ok(ClaimOutcome::Found) => {}
            Err(e) => {
                warn!(
                    namespace = %namespace,
                    claim = %claim,
                    error = %e,
                    "Replica claim reconciliation failed, rewriting anyway"
                );
            }
        }
    }
}

fn decode_pod(object: Option<&DynamicObject>) -> Result<Pod, Error> {
    let object = object.ok_or_else(|| Error::decode("admission request carries no object"))?;
    let value = serde_json::to_value(object).map_err(|e| Error::decode(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| Error::decode(e.to_string()))
}
