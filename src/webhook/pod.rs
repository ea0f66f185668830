//! Pod Mutation Webhook
//!
//! Unwraps AdmissionReview requests, runs the mutation engine and wraps the
//! resulting patch. Every Pod is allowed unless its object cannot be decoded.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use kube::{
    api::DynamicObject,
    core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview},
};
use serde_json::Value;
use tracing::{debug, error, info};

use super::WebhookState;

/// Handle mutating admission review for Pods
///
/// The body is decoded here rather than by the extractor so a malformed
/// review still gets an AdmissionReview back instead of a bare 422.
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<Value>,
) -> Json<AdmissionReview<DynamicObject>> {
    let review: AdmissionReview<DynamicObject> = match serde_json::from_value(body.clone()) {
        Ok(review) => review,
        Err(e) => {
            error!(error = %e, "Failed to deserialize admission review");
            let mut response =
                AdmissionResponse::invalid(format!("could not deserialize admission review: {e}"));
            if let Some(uid) = body.pointer("/request/uid").and_then(Value::as_str) {
                response.uid = uid.to_string();
            }
            return Json(response.into_review());
        }
    };

    let req: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let response = mutate_pod(&state, &req).await;
    Json(response.into_review())
}

/// Liveness check
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Process a single pod mutation request
async fn mutate_pod(
    state: &WebhookState,
    request: &AdmissionRequest<DynamicObject>,
) -> AdmissionResponse {
    let uid = request.uid.clone();

    let ops = match state.mutator.decide(request).await {
        Ok(ops) => ops,
        Err(e) => {
            error!(uid = %uid, error = %e, "Rejecting pod admission");
            return AdmissionResponse::from(request).deny(e.to_string());
        }
    };

    if ops.is_empty() {
        debug!(uid = %uid, "No mutation needed, allowing unchanged");
        return AdmissionResponse::from(request);
    }

    info!(uid = %uid, patch_ops = ops.len(), "Applying patch to pod");

    match AdmissionResponse::from(request).with_patch(json_patch::Patch(ops)) {
        Ok(response) => response,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to serialize patch");
            AdmissionResponse::from(request).deny(format!("patch serialization error: {e}"))
        }
    }
}
