// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! JSON merge-patch (RFC 7386) construction from an observed/desired pair.

use serde_json::{Map, Value};

/// Patches needed to move an object from its observed to its desired state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectPatch {
    /// Patch for the main resource (metadata and spec)
    pub main: Option<Value>,
    /// Patch for the status subresource
    pub status: Option<Value>,
}

impl ObjectPatch {
    /// True if the objects are identical.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.main.is_none() && self.status.is_none()
    }
}

/// Compute the merge patch turning `old` into `new`, or `None` if they are equal.
///
/// Keys removed from an object become `null`; arrays and scalars are replaced
/// wholesale, as merge patches cannot address array elements.
#[must_use]
pub fn merge_patch(old: &Value, new: &Value) -> Option<Value> {
    if old == new {
        return None;
    }
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let mut patch = Map::new();
            for (key, old_value) in old_map {
                match new_map.get(key) {
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                    Some(new_value) => {
                        if let Some(diff) = merge_patch(old_value, new_value) {
                            patch.insert(key.clone(), diff);
                        }
                    }
                }
            }
            for (key, new_value) in new_map {
                if !old_map.contains_key(key) {
                    patch.insert(key.clone(), new_value.clone());
                }
            }
            Some(Value::Object(patch))
        }
        _ => Some(new.clone()),
    }
}

fn split_status(value: &Value) -> (Value, Value) {
    let mut main = value.clone();
    let status = main
        .as_object_mut()
        .and_then(|object| object.remove("status"))
        .unwrap_or(Value::Null);
    (main, status)
}

/// Diff two serialized objects, separating the status subresource.
#[must_use]
pub fn object_patch(observed: &Value, desired: &Value) -> ObjectPatch {
    let (observed_main, observed_status) = split_status(observed);
    let (desired_main, desired_status) = split_status(desired);

    let status = match (&observed_status, &desired_status) {
        (Value::Null, Value::Null) => None,
        (Value::Null, desired) => Some(desired.clone()),
        (observed, Value::Null) => merge_patch(observed, &Value::Object(Map::new())),
        (observed, desired) => merge_patch(observed, desired),
    }
    .map(|diff| serde_json::json!({ "status": diff }));

    ObjectPatch {
        main: merge_patch(&observed_main, &desired_main),
        status,
    }
}

/// Add `metadata.resourceVersion` to a patch so a stale observation is rejected.
#[must_use]
pub fn with_resource_version(mut patch: Value, resource_version: Option<&str>) -> Value {
    let Some(resource_version) = resource_version else {
        return patch;
    };
    if let Some(object) = patch.as_object_mut() {
        let metadata = object
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(metadata) = metadata.as_object_mut() {
            metadata.insert(
                "resourceVersion".to_string(),
                Value::String(resource_version.to_string()),
            );
        }
    }
    patch
}

#[cfg(test)]
#[path = "patch_tests.rs"]
mod patch_tests;
