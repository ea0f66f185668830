//! Replica claim reconciliation
//!
//! Get-or-create for the PersistentVolumeClaim a rewritten Pod volume points
//! at. An existing claim is never touched. A missing one is stamped out from
//! the first volume-claim template of the StatefulSet owning the Pod.

use std::sync::Arc;

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use tracing::{debug, info};

use crate::client::{ClaimClient, CreateOutcome, Lookup};
use crate::Error;

/// Owner kind whose volume-claim templates can seed a replica claim
pub const STATEFUL_SET_KIND: &str = "StatefulSet";

/// What reconciliation found for a replica claim
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The claim already existed, possibly created by a concurrent admission
    Found,
    /// This call created the claim
    Created,
}

/// Ensures replica claims exist before Pods are pointed at them
pub struct ClaimReconciler {
    client: Arc<dyn ClaimClient>,
}

impl ClaimReconciler {
    /// Create a reconciler issuing calls through the given client
    pub fn new(client: Arc<dyn ClaimClient>) -> Self {
        Self { client }
    }

    /// Ensure `desired_name` exists in `namespace`
    ///
    /// `owner` is the Pod's first owner reference and is only consulted when
    /// the claim has to be created. Issues at most one create call.
    pub async fn ensure_replica_claim(
        &self,
        namespace: &str,
        desired_name: &str,
        owner: Option<&OwnerReference>,
    ) -> Result<ClaimOutcome, Error> {
        if let Lookup::Found(_) = self.client.get_claim(namespace, desired_name).await? {
            debug!(namespace = %namespace, claim = %desired_name, "Replica claim already exists");
            return Ok(ClaimOutcome::Found);
        }

        let owner = owner.ok_or_else(|| Error::MissingOwner {
            namespace: namespace.to_string(),
            claim: desired_name.to_string(),
        })?;
        if owner.kind != STATEFUL_SET_KIND {
            return Err(Error::UnsupportedOwner {
                kind: owner.kind.clone(),
                name: owner.name.clone(),
            });
        }

        let workload = match self.client.get_workload(namespace, &owner.name).await? {
            Lookup::Found(sts) => sts,
            Lookup::NotFound => {
                return Err(Error::WorkloadNotFound {
                    namespace: namespace.to_string(),
                    name: owner.name.clone(),
                })
            }
        };

        let template = workload
            .spec
            .and_then(|spec| spec.volume_claim_templates)
            .and_then(|templates| templates.into_iter().next())
            .ok_or_else(|| Error::MissingClaimTemplate {
                namespace: namespace.to_string(),
                name: owner.name.clone(),
            })?;

        let claim = PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(desired_name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: template.spec,
            ..Default::default()
        };

        info!(
            namespace = %namespace,
            claim = %desired_name,
            workload = %owner.name,
            "Creating replica claim from workload template"
        );

        match self.client.create_claim(namespace, &claim).await? {
            CreateOutcome::Created => Ok(ClaimOutcome::Created),
            CreateOutcome::AlreadyExists => {
                info!(
                    namespace = %namespace,
                    claim = %desired_name,
                    "Replica claim was created concurrently"
                );
                Ok(ClaimOutcome::Found)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockClaimClient;
    use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
    use k8s_openapi::api::core::v1::PersistentVolumeClaimSpec;

    // =========================================================================
    // Fixtures
    // =========================================================================

    fn owner(kind: &str, name: &str) -> OwnerReference {
        OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            uid: "5f1c2a9e-0000-0000-0000-000000000000".to_string(),
            ..Default::default()
        }
    }

    fn redis_owner() -> OwnerReference {
        owner("StatefulSet", "redis-set")
    }

    fn template(name: &str, storage_class: &str) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                storage_class_name: Some(storage_class.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn stateful_set(templates: Option<Vec<PersistentVolumeClaim>>) -> StatefulSet {
        StatefulSet {
            metadata: ObjectMeta {
                name: Some("redis-set".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                volume_claim_templates: templates,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn api_error(code: u16) -> Error {
        Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("api error {code}"),
            reason: "InternalError".to_string(),
            code,
        }))
    }

    fn reconciler(mock: MockClaimClient) -> ClaimReconciler {
        ClaimReconciler::new(Arc::new(mock))
    }

    // =========================================================================
    // Story Tests
    // =========================================================================

    /// Story: a replica provisioned by an earlier admission is left alone
    #[tokio::test]
    async fn story_existing_claim_is_not_touched() {
        let mut mock = MockClaimClient::new();
        mock.expect_get_claim()
            .withf(|ns, name| ns == "default" && name == "data-0-replica")
            .times(1)
            .returning(|_, _| Ok(Lookup::Found(PersistentVolumeClaim::default())));
        // No get_workload/create_claim expectations: any call would panic

        let outcome = reconciler(mock)
            .ensure_replica_claim("default", "data-0-replica", Some(&redis_owner()))
            .await
            .unwrap();

        assert_eq!(outcome, ClaimOutcome::Found);
    }

    /// Story: first sight of a replica stamps it out from the first template
    #[tokio::test]
    async fn story_missing_claim_created_from_first_template() {
        let mut mock = MockClaimClient::new();
        mock.expect_get_claim()
            .returning(|_, _| Ok(Lookup::NotFound));
        mock.expect_get_workload()
            .withf(|ns, name| ns == "default" && name == "redis-set")
            .times(1)
            .returning(|_, _| {
                Ok(Lookup::Found(stateful_set(Some(vec![
                    template("data", "fast"),
                    template("logs", "slow"),
                ]))))
            });
        mock.expect_create_claim()
            .withf(|ns, claim| {
                ns == "default"
                    && claim.metadata.name.as_deref() == Some("data-0-replica")
                    && claim.metadata.namespace.as_deref() == Some("default")
                    && claim
                        .spec
                        .as_ref()
                        .and_then(|s| s.storage_class_name.as_deref())
                        == Some("fast")
            })
            .times(1)
            .returning(|_, _| Ok(CreateOutcome::Created));

        let outcome = reconciler(mock)
            .ensure_replica_claim("default", "data-0-replica", Some(&redis_owner()))
            .await
            .unwrap();

        assert_eq!(outcome, ClaimOutcome::Created);
    }

    /// Story: two admissions race to create the same claim and both succeed
    #[tokio::test]
    async fn story_already_exists_on_create_is_success() {
        let mut mock = MockClaimClient::new();
        mock.expect_get_claim()
            .returning(|_, _| Ok(Lookup::NotFound));
        mock.expect_get_workload().returning(|_, _| {
            Ok(Lookup::Found(stateful_set(Some(vec![template("data", "fast")]))))
        });
        mock.expect_create_claim()
            .times(1)
            .returning(|_, _| Ok(CreateOutcome::AlreadyExists));

        let outcome = reconciler(mock)
            .ensure_replica_claim("default", "data-0-replica", Some(&redis_owner()))
            .await
            .unwrap();

        assert_eq!(outcome, ClaimOutcome::Found);
    }

    /// Story: a flaky API server during lookup abandons reconciliation
    #[tokio::test]
    async fn story_transient_lookup_failure_is_surfaced() {
        let mut mock = MockClaimClient::new();
        mock.expect_get_claim()
            .returning(|_, _| Err(api_error(503)));

        let err = reconciler(mock)
            .ensure_replica_claim("default", "data-0-replica", Some(&redis_owner()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Kube(_)));
        assert!(!err.is_fatal());
    }

    /// Story: a create rejected for reasons other than a race is reported
    #[tokio::test]
    async fn story_create_failure_is_surfaced() {
        let mut mock = MockClaimClient::new();
        mock.expect_get_claim()
            .returning(|_, _| Ok(Lookup::NotFound));
        mock.expect_get_workload().returning(|_, _| {
            Ok(Lookup::Found(stateful_set(Some(vec![template("data", "fast")]))))
        });
        mock.expect_create_claim()
            .times(1)
            .returning(|_, _| Err(api_error(403)));

        let err = reconciler(mock)
            .ensure_replica_claim("default", "data-0-replica", Some(&redis_owner()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Kube(_)));
    }

    /// Story: an unowned Pod cannot source a template, but does not panic
    #[tokio::test]
    async fn story_missing_owner_fails_gracefully() {
        let mut mock = MockClaimClient::new();
        mock.expect_get_claim()
            .returning(|_, _| Ok(Lookup::NotFound));

        let err = reconciler(mock)
            .ensure_replica_claim("default", "data-0-replica", None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MissingOwner { ref claim, .. } if claim == "data-0-replica"));
    }

    /// Story: an owner that is not a StatefulSet has no claim templates
    #[tokio::test]
    async fn story_non_statefulset_owner_rejected() {
        let mut mock = MockClaimClient::new();
        mock.expect_get_claim()
            .returning(|_, _| Ok(Lookup::NotFound));

        let replica_set = owner("ReplicaSet", "web-7d9f");
        let err = reconciler(mock)
            .ensure_replica_claim("default", "data-0-replica", Some(&replica_set))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnsupportedOwner { ref kind, .. } if kind == "ReplicaSet"));
    }

    #[tokio::test]
    async fn test_workload_not_found() {
        let mut mock = MockClaimClient::new();
        mock.expect_get_claim()
            .returning(|_, _| Ok(Lookup::NotFound));
        mock.expect_get_workload()
            .returning(|_, _| Ok(Lookup::NotFound));

        let err = reconciler(mock)
            .ensure_replica_claim("default", "data-0-replica", Some(&owner("StatefulSet", "gone")))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::WorkloadNotFound { ref name, .. } if name == "gone"));
    }

    #[tokio::test]
    async fn test_workload_without_templates() {
        let mut mock = MockClaimClient::new();
        mock.expect_get_claim()
            .returning(|_, _| Ok(Lookup::NotFound));
        mock.expect_get_workload()
            .returning(|_, _| Ok(Lookup::Found(stateful_set(Some(vec![])))));

        let err = reconciler(mock)
            .ensure_replica_claim("default", "data-0-replica", Some(&redis_owner()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MissingClaimTemplate { .. }));
    }
}
