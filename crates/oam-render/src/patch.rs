//! Trait patch composition: merging a trait's `patch` output into the
//! workload manifest it targets.
//!
//! Default behaviour mirrors a Kubernetes strategic merge over plain JSON:
//! records merge key by key, recursing into nested records, and scalars (or
//! type mismatches) from the patch simply replace the base. Lists replace
//! wholesale unless the patch annotates one with a merge key, written as
//! `"$patchKey": "<field name>"` alongside the list in the patch record —
//! then elements are paired up by that key's value and merged instead of
//! replaced, with unmatched patch elements appended.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

const PATCH_KEY_PREFIX: &str = "$patchKey/";

/// Applies `patch` on top of `base`, returning the merged document.
///
/// `component` and `json_path` are carried only for error messages; callers
/// pass the root path (usually the empty string) and `merge` extends it as
/// it recurses.
pub fn merge(component: &str, json_path: &str, base: &Value, patch: &Value) -> Result<Value> {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            merge_objects(component, json_path, base_map, patch_map)
        }
        (_, Value::Null) => Ok(base.clone()),
        _ => Ok(patch.clone()),
    }
}

fn merge_objects(
    component: &str,
    json_path: &str,
    base: &Map<String, Value>,
    patch: &Map<String, Value>,
) -> Result<Value> {
    let mut merged = base.clone();

    // A field named by a `$patchKey/<field>` annotation is also present in
    // `patch` as an ordinary key (the list itself). Handle every annotation
    // first and remember which fields it covers, so the second pass below
    // doesn't re-merge that same key the naive way and clobber the
    // by-key-paired result.
    let mut keyed_fields: std::collections::HashSet<&str> = std::collections::HashSet::new();
    for (key, patch_value) in patch {
        let Some(field) = key.strip_prefix(PATCH_KEY_PREFIX) else {
            continue;
        };
        keyed_fields.insert(field);
        let merge_key = expect_string(component, json_path, patch_value)?;
        let child_path = format!("{json_path}/{field}");
        let Some(base_list) = base.get(field) else {
            continue;
        };
        let Some(patch_list) = patch.get(field) else {
            continue;
        };
        let merged_list = merge_lists_by_key(component, &child_path, base_list, patch_list, &merge_key)?;
        merged.insert(field.to_owned(), merged_list);
    }

    for (key, patch_value) in patch {
        if key.starts_with(PATCH_KEY_PREFIX) || keyed_fields.contains(key.as_str()) {
            continue;
        }

        let child_path = format!("{json_path}/{key}");
        let merged_value = match base.get(key) {
            Some(base_value) => merge(component, &child_path, base_value, patch_value)?,
            None => patch_value.clone(),
        };
        merged.insert(key.clone(), merged_value);
    }

    Ok(Value::Object(merged))
}

fn merge_lists_by_key(
    component: &str,
    json_path: &str,
    base: &Value,
    patch: &Value,
    merge_key: &str,
) -> Result<Value> {
    let base_items = expect_array(component, json_path, base)?;
    let patch_items = expect_array(component, json_path, patch)?;

    let mut merged: Vec<Value> = Vec::with_capacity(base_items.len());
    let mut consumed = vec![false; patch_items.len()];

    for base_item in base_items {
        let base_key = key_value(base_item, merge_key);
        let mut matched = None;
        for (i, patch_item) in patch_items.iter().enumerate() {
            if consumed[i] {
                continue;
            }
            if key_value(patch_item, merge_key) == base_key && base_key.is_some() {
                matched = Some(i);
                break;
            }
        }

        match matched {
            Some(i) => {
                consumed[i] = true;
                let element_path = format!("{json_path}[{merge_key}={base_key:?}]");
                merged.push(merge(component, &element_path, base_item, &patch_items[i])?);
            }
            None => merged.push(base_item.clone()),
        }
    }

    for (i, patch_item) in patch_items.iter().enumerate() {
        if !consumed[i] {
            merged.push(patch_item.clone());
        }
    }

    Ok(Value::Array(merged))
}

fn key_value(item: &Value, merge_key: &str) -> Option<Value> {
    item.as_object()?.get(merge_key).cloned()
}

fn expect_string(component: &str, json_path: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| Error::PatchConflict {
            component: component.to_owned(),
            json_path: json_path.to_owned(),
            message: "patch key annotation must be a string naming the merge field".to_owned(),
        })
}

fn expect_array<'a>(component: &str, json_path: &str, value: &'a Value) -> Result<&'a Vec<Value>> {
    value.as_array().ok_or_else(|| Error::PatchConflict {
        component: component.to_owned(),
        json_path: json_path.to_owned(),
        message: "patch key annotation used on a field that is not a list".to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_merge_recurses_into_nested_records() {
        let base = json!({"metadata": {"name": "web", "labels": {"a": "1"}}, "spec": {"replicas": 1}});
        let patch = json!({"metadata": {"labels": {"b": "2"}}, "spec": {"replicas": 3}});
        let merged = merge("web", "", &base, &patch).unwrap();
        assert_eq!(
            merged,
            json!({"metadata": {"name": "web", "labels": {"a": "1", "b": "2"}}, "spec": {"replicas": 3}})
        );
    }

    #[test]
    fn default_list_merge_replaces_wholesale() {
        let base = json!({"containers": [{"name": "a"}, {"name": "b"}]});
        let patch = json!({"containers": [{"name": "c"}]});
        let merged = merge("web", "", &base, &patch).unwrap();
        assert_eq!(merged, json!({"containers": [{"name": "c"}]}));
    }

    #[test]
    fn strategic_merge_pairs_list_elements_by_key() {
        let base = json!({
            "containers": [
                {"name": "app", "image": "app:1"},
                {"name": "sidecar", "image": "sidecar:1"}
            ]
        });
        let patch = json!({
            "$patchKey/containers": "name",
            "containers": [
                {"name": "app", "image": "app:2"},
                {"name": "logger", "image": "logger:1"}
            ]
        });
        let merged = merge("web", "", &base, &patch).unwrap();
        assert_eq!(
            merged,
            json!({
                "containers": [
                    {"name": "app", "image": "app:2"},
                    {"name": "sidecar", "image": "sidecar:1"},
                    {"name": "logger", "image": "logger:1"}
                ]
            })
        );
    }

    #[test]
    fn strategic_merge_key_on_non_list_field_conflicts() {
        let base = json!({"spec": {"replicas": 1}});
        let patch = json!({"$patchKey/spec": "name", "spec": {"replicas": 2}});
        let err = merge("web", "", &base, &patch).unwrap_err();
        assert!(matches!(err, Error::PatchConflict { .. }));
    }
}
