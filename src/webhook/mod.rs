//! Mutating admission webhook endpoint
//!
//! Terminates AdmissionReview calls for Pods and hands the embedded request
//! to the [`PodMutator`]. The router is served over HTTPS by the binary.

pub mod pod;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::mutation::PodMutator;

/// Path the MutatingWebhookConfiguration points at
pub const MUTATE_PATH: &str = "/mutate";

/// Liveness check path
pub const HEALTH_PATH: &str = "/healthz";

/// Shared state for webhook handlers
#[derive(Clone)]
pub struct WebhookState {
    /// Decision engine, immutable and shared by every request
    pub mutator: Arc<PodMutator>,
}

impl WebhookState {
    /// Create a new webhook state around the given engine
    pub fn new(mutator: PodMutator) -> Self {
        Self {
            mutator: Arc::new(mutator),
        }
    }
}

/// Create the webhook router
///
/// - POST /mutate - Mutate Pods (replica claims + node pin)
/// - GET /healthz - Liveness
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(MUTATE_PATH, post(pod::mutate_handler))
        .route(HEALTH_PATH, get(pod::health_handler))
        .with_state(state)
}
