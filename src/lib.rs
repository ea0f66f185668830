//! Replica claim webhook - mutating admission for replicated storage Pods
//!
//! Pods carrying the managed label (by default `middleware=redis`) are
//! rewritten on admission:
//!
//! - every PersistentVolumeClaim volume is pointed at a `-replica` claim,
//!   which is created from the owning StatefulSet's first volume-claim
//!   template if it does not exist yet
//! - the Pod is pinned to a configured node through its node selector
//!
//! The rewrite is returned to the API server as a JSON Patch.
//!
//! # Modules
//!
//! - [`config`] - Core settings injected at construction
//! - [`client`] - Kubernetes API access (get/create claims, get workloads)
//! - [`reconciler`] - Get-or-create for replica claims
//! - [`mutation`] - Per-request decision engine
//! - [`patch`] - JSON Patch construction
//! - [`webhook`] - AdmissionReview HTTP endpoint
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod client;
pub mod config;
pub mod error;
pub mod mutation;
pub mod patch;
pub mod reconciler;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default address the HTTPS server listens on
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8443";

/// Default certificate file name inside the TLS directory
pub const DEFAULT_TLS_CERT_FILE: &str = "server.crt";

/// Default private key file name inside the TLS directory
pub const DEFAULT_TLS_KEY_FILE: &str = "server.key";
