// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Machine-readable output: the status tree as a kubectl-style list of
//! objects with `object`, `health`, `conditions` and `subobjects` fields.

use anyhow::Result;
use serde_json::{Value, json};

use crate::status::ObjectStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KubectlFormat {
    Json,
    Yaml,
}

pub fn render_kubectl(statuses: &[ObjectStatus], format: KubectlFormat) -> Result<String> {
    let items: Vec<Value> = statuses.iter().map(status_to_value).collect();
    let list = json!({
        "apiVersion": "v1",
        "kind": "List",
        "items": items,
    });

    Ok(match format {
        KubectlFormat::Json => serde_json::to_string_pretty(&list)?,
        KubectlFormat::Yaml => serde_yaml::to_string(&list)?,
    })
}

fn status_to_value(status: &ObjectStatus) -> Value {
    let object = status.object.as_ref();
    let mut object_ref = json!({
        "apiVersion": object.gvk().api_version(),
        "kind": object.gvk().kind,
        "name": object.name(),
    });
    if !object.namespace().is_empty()
        && let Value::Object(map) = &mut object_ref
    {
        map.insert(
            "namespace".to_string(),
            Value::String(object.namespace().to_string()),
        );
    }

    let conditions: Vec<Value> = status
        .conditions
        .iter()
        .map(|c| serde_json::to_value(c).unwrap_or(Value::Null))
        .collect();

    let subobjects: Vec<Value> = status.sub_statuses.iter().map(status_to_value).collect();

    json!({
        "object": object_ref,
        "health": serde_json::to_value(&status.status).unwrap_or(Value::Null),
        "conditions": conditions,
        "subobjects": subobjects,
    })
}
