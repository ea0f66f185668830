//! Shared fixtures for unit tests

use json_patch::PatchOperation;
use jsonptr::PointerBuf;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionReview};
use serde_json::{json, Value};

pub(crate) fn pods_resource() -> Value {
    json!({"group": "", "version": "v1", "resource": "pods"})
}

/// Build an admission request the way the API server would send it
pub(crate) fn admission_request(resource: Value, object: Value) -> AdmissionRequest<DynamicObject> {
    let review: AdmissionReview<DynamicObject> =
        serde_json::from_value(admission_review(resource, object))
            .expect("admission review should deserialize");
    review.try_into().expect("review should carry a request")
}

pub(crate) fn admission_review(resource: Value, object: Value) -> Value {
    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
            "kind": {"group": "", "version": "v1", "kind": "Pod"},
            "resource": resource,
            "name": "redis-0",
            "namespace": "default",
            "operation": "CREATE",
            "userInfo": {"username": "system:serviceaccount:kube-system:statefulset-controller"},
            "object": object,
            "dryRun": false
        }
    })
}

/// A redis Pod owned by `redis-set` mounting the given claims
pub(crate) fn redis_pod(claims: &[&str]) -> Value {
    let volumes: Vec<Value> = claims
        .iter()
        .enumerate()
        .map(|(i, claim)| {
            json!({
                "name": format!("vol-{i}"),
                "persistentVolumeClaim": {"claimName": claim}
            })
        })
        .collect();

    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": "redis-0",
            "namespace": "default",
            "labels": {"middleware": "redis"},
            "ownerReferences": [{
                "apiVersion": "apps/v1",
                "kind": "StatefulSet",
                "name": "redis-set",
                "uid": "5f1c2a9e-0000-0000-0000-000000000000",
                "controller": true
            }]
        },
        "spec": {
            "containers": [{"name": "redis", "image": "redis:7"}],
            "volumes": volumes
        }
    })
}

/// Value of the replace operation at `path`, if one was emitted
pub(crate) fn replaced(ops: &[PatchOperation], path: &[&str]) -> Option<Value> {
    let path = PointerBuf::from_tokens(path.iter().copied());
    ops.iter().find_map(|op| match op {
        PatchOperation::Replace(r) if r.path == path => Some(r.value.clone()),
        _ => None,
    })
}
