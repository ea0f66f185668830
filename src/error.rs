//! Error types for the replica webhook
//!
//! Only [`Error::Decode`] is fatal to an admission. Every other variant is a
//! reconciliation failure: it is logged and the Pod is still admitted.

use thiserror::Error;

/// Main error type for webhook operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error other than not-found/already-exists
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The embedded admission object could not be decoded into a Pod
    #[error("could not deserialize pod object: {0}")]
    Decode(String),

    /// The Pod has no owner reference to copy a claim template from
    #[error("no owner reference to create claim {namespace}/{claim} from")]
    MissingOwner {
        /// Namespace of the claim
        namespace: String,
        /// Claim that needed creating
        claim: String,
    },

    /// The Pod's first owner is not a workload with volume-claim templates
    #[error("owner {kind}/{name} is not a StatefulSet")]
    UnsupportedOwner {
        /// Kind of the owner reference
        kind: String,
        /// Name of the owner reference
        name: String,
    },

    /// The owning workload does not exist
    #[error("workload {namespace}/{name} not found")]
    WorkloadNotFound {
        /// Namespace searched
        namespace: String,
        /// Workload name from the owner reference
        name: String,
    },

    /// The owning workload exposes no volume-claim template
    #[error("workload {namespace}/{name} has no volume claim templates")]
    MissingClaimTemplate {
        /// Namespace of the workload
        namespace: String,
        /// Name of the workload
        name: String,
    },

    /// Reconciliation ran past the request deadline
    #[error("reconciliation of claim {namespace}/{claim} timed out")]
    Timeout {
        /// Namespace of the claim
        namespace: String,
        /// Claim being reconciled
        claim: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid webhook configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a decode error with the given message
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error must reject the admission
    ///
    /// Everything except a decode failure degrades to a best-effort mutation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Decode(_))
    }
}
