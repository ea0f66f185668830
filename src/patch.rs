//! JSON Patch construction for mutated Pods
//!
//! Fields are always replaced whole. Element-level operations would shift
//! indices if volumes were reordered between admission and apply.

use json_patch::{PatchOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use k8s_openapi::api::core::v1::PodSpec;

use crate::Error;

/// Which Pod spec fields the engine changed in its working copy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PodChanges {
    /// At least one volume claim reference was rewritten
    pub volumes: bool,
    /// The node selector differs from the one in the request
    pub node_selector: bool,
}

impl PodChanges {
    /// Whether anything needs patching
    pub fn is_empty(&self) -> bool {
        !self.volumes && !self.node_selector
    }
}

/// Build the patch for a mutated Pod spec
///
/// Emits at most `replace /spec/volumes` followed by
/// `replace /spec/nodeSelector`, each carrying the full final value.
pub fn build_patch(spec: &PodSpec, changes: PodChanges) -> Result<Vec<PatchOperation>, Error> {
    let mut ops = Vec::new();

    if changes.volumes {
        ops.push(PatchOperation::Replace(ReplaceOperation {
            path: PointerBuf::from_tokens(["spec", "volumes"]),
            value: serde_json::to_value(spec.volumes.as_deref().unwrap_or_default())?,
        }));
    }

    if changes.node_selector {
        ops.push(PatchOperation::Replace(ReplaceOperation {
            path: PointerBuf::from_tokens(["spec", "nodeSelector"]),
            value: serde_json::to_value(spec.node_selector.clone().unwrap_or_default())?,
        }));
    }

    Ok(ops)
}
