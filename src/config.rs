//! Core webhook configuration
//!
//! These values are fixed for the life of the process and injected into
//! [`PodMutator`](crate::mutation::PodMutator) at construction.

use std::time::Duration;

use kube::core::GroupVersionResource;

use crate::Error;

/// Node selector key used to pin a Pod to a single node
pub const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

/// Default node managed Pods are scheduled onto
pub const DEFAULT_TARGET_NODE: &str = "slave-213";

/// Default label key identifying managed Pods
pub const DEFAULT_MANAGED_LABEL_KEY: &str = "middleware";

/// Default label value identifying managed Pods
pub const DEFAULT_MANAGED_LABEL_VALUE: &str = "redis";

/// Default suffix appended to a claim name to derive its replica claim
pub const DEFAULT_CLAIM_SUFFIX: &str = "-replica";

/// Default budget for all claim reconciliation within one admission
///
/// The API server gives webhooks 10s by default.
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings consumed by the mutation engine
#[derive(Clone, Debug)]
pub struct WebhookConfig {
    /// Node name written under [`HOSTNAME_LABEL`]
    pub target_node: String,
    /// Label key a Pod must carry to be mutated
    pub managed_label_key: String,
    /// Value the managed label must have
    pub managed_label_value: String,
    /// Suffix appended to claim names
    pub claim_suffix: String,
    /// Resource descriptor a request must target to be processed
    pub pod_resource: GroupVersionResource,
    /// Deadline for claim reconciliation across one request
    pub reconcile_timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            target_node: DEFAULT_TARGET_NODE.to_string(),
            managed_label_key: DEFAULT_MANAGED_LABEL_KEY.to_string(),
            managed_label_value: DEFAULT_MANAGED_LABEL_VALUE.to_string(),
            claim_suffix: DEFAULT_CLAIM_SUFFIX.to_string(),
            pod_resource: GroupVersionResource::gvr("", "v1", "pods"),
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
        }
    }
}

impl WebhookConfig {
    /// Check that every setting the engine relies on is usable
    pub fn validate(&self) -> Result<(), Error> {
        if self.target_node.trim().is_empty() {
            return Err(Error::config("target node must not be empty"));
        }
        if self.managed_label_key.trim().is_empty() {
            return Err(Error::config("managed label key must not be empty"));
        }
        if self.claim_suffix.is_empty() {
            return Err(Error::config("claim suffix must not be empty"));
        }
        if self.pod_resource.resource.is_empty() {
            return Err(Error::config("pod resource must not be empty"));
        }
        if self.reconcile_timeout.is_zero() {
            return Err(Error::config("reconcile timeout must be greater than zero"));
        }
        Ok(())
    }

    /// Derive the replica claim name for an existing claim
    pub fn replica_claim_name(&self, claim_name: &str) -> String {
        format!("{}{}", claim_name, self.claim_suffix)
    }

    /// Whether a request's resource descriptor is the configured Pod resource
    pub fn is_pod_resource(&self, resource: &GroupVersionResource) -> bool {
        resource.group == self.pod_resource.group
            && resource.version == self.pod_resource.version
            && resource.resource == self.pod_resource.resource
    }
}
