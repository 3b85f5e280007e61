// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! In-memory representation of a Kubernetes object.
//!
//! An [`Object`] pairs the typed identity fields analyzers need all the time
//! (kind, namespace, name, UID, labels, owner references) with the full
//! untyped payload, so kind-specific analyzers can reach into arbitrary
//! `status.*` fields via JSON pointers.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a resource type without version (e.g. `Deployment.apps`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            kind: kind.to_string(),
        }
    }

    /// A kind in the core (empty) API group.
    pub fn core(kind: &str) -> Self {
        Self::new("", kind)
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// Fully versioned identifier of a resource type (`apps/v1` + `Deployment`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Parse an `apiVersion` string (`v1` or `apps/v1`) plus a kind.
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        let (group, version) = split_api_version(api_version);
        Self::new(group, version, kind)
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(&self.group, &self.kind)
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// Identifier of a resource endpoint without version (e.g. `deployments.apps`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GroupResource {
    pub group: String,
    pub resource: String,
}

impl GroupResource {
    pub fn new(group: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            resource: resource.to_string(),
        }
    }
}

impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// A pointer from a managed object back to its controller.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    pub controller: Option<bool>,
}

/// A loose reference to another object, as found in `status.*Ref` fields.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub uid: String,
}

impl ObjectReference {
    pub fn group_kind(&self) -> GroupKind {
        let (group, _) = split_api_version(&self.api_version);
        GroupKind::new(group, &self.kind)
    }
}

/// A normalized Kubernetes object. Immutable after construction; shared
/// between the evaluator cache and result trees via `Arc<Object>`.
#[derive(Debug, Clone)]
pub struct Object {
    gvk: GroupVersionKind,
    namespace: String,
    name: String,
    uid: String,
    generation: i64,
    labels: BTreeMap<String, String>,
    owner_references: Vec<OwnerReference>,
    data: Value,
}

impl Object {
    /// Build an object from a raw Kubernetes JSON payload.
    pub fn from_json(data: Value) -> Result<Self> {
        let api_version = str_at(&data, "/apiVersion").unwrap_or_default();
        let kind = str_at(&data, "/kind")
            .with_context(|| format!("object has no kind: {}", summarize(&data)))?;
        let gvk = GroupVersionKind::from_api_version(&api_version, &kind);

        let labels = match data.pointer("/metadata/labels") {
            Some(Value::Object(map)) => map
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect(),
            _ => BTreeMap::new(),
        };

        let owner_references = match data.pointer("/metadata/ownerReferences") {
            Some(refs @ Value::Array(_)) => serde_json::from_value(refs.clone())
                .with_context(|| format!("invalid ownerReferences: {}", summarize(&data)))?,
            _ => Vec::new(),
        };

        Ok(Self {
            gvk,
            namespace: str_at(&data, "/metadata/namespace").unwrap_or_default(),
            name: str_at(&data, "/metadata/name").unwrap_or_default(),
            uid: str_at(&data, "/metadata/uid").unwrap_or_default(),
            generation: data
                .pointer("/metadata/generation")
                .and_then(Value::as_i64)
                .unwrap_or_default(),
            labels,
            owner_references,
            data,
        })
    }

    /// Build a synthetic object that does not exist in the cluster, e.g. a
    /// `Container` sub-object of a Pod or a `Log` wrapper.
    pub fn synthetic(kind: &str, api_version: &str, name: &str, data: Value) -> Self {
        Self {
            gvk: GroupVersionKind::from_api_version(api_version, kind),
            namespace: String::new(),
            name: name.to_string(),
            uid: String::new(),
            generation: 0,
            labels: BTreeMap::new(),
            owner_references: Vec::new(),
            data,
        }
    }

    pub fn gvk(&self) -> &GroupVersionKind {
        &self.gvk
    }

    pub fn group_kind(&self) -> GroupKind {
        self.gvk.group_kind()
    }

    /// Namespace of the object; empty for cluster-scoped resources.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn generation(&self) -> i64 {
        self.generation
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn owner_references(&self) -> &[OwnerReference] {
        &self.owner_references
    }

    /// The full untyped payload.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Nested lookup by JSON pointer (e.g. `/status/phase`).
    pub fn at(&self, pointer: &str) -> Option<&Value> {
        self.data.pointer(pointer)
    }

    pub fn str_at(&self, pointer: &str) -> Option<&str> {
        self.data.pointer(pointer).and_then(Value::as_str)
    }

    pub fn i64_at(&self, pointer: &str) -> Option<i64> {
        self.data.pointer(pointer).and_then(Value::as_i64)
    }

    pub fn bool_at(&self, pointer: &str) -> Option<bool> {
        self.data.pointer(pointer).and_then(Value::as_bool)
    }

    /// Whether the object has a `status` block at all.
    pub fn has_status(&self) -> bool {
        matches!(self.at("/status"), Some(Value::Object(_)))
    }

    /// `namespace/Kind/name` identifier used in logs and printed output.
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            format!("{}/{}", self.gvk.kind, self.name)
        } else {
            format!("{}/{}/{}", self.namespace, self.gvk.kind, self.name)
        }
    }
}

fn str_at(data: &Value, pointer: &str) -> Option<String> {
    data.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Short description of a payload for error messages, avoiding dumping the
/// whole document.
fn summarize(data: &Value) -> String {
    let kind = data
        .pointer("/kind")
        .and_then(Value::as_str)
        .unwrap_or("<unknown kind>");
    let name = data
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>");
    format!("{}/{}", kind, name)
}
