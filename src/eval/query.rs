// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Query specifications.
//!
//! A [`Query`] tells the evaluator which namespace to preload, which kinds
//! the preload must cover, and how to filter the preloaded cache into the
//! actual result. The filter runs after the evaluator has ensured the
//! namespace is loaded under the merged matcher, so owner lookups always see
//! a filled cache.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::evaluator::Evaluator;
use super::matcher::GroupKindMatcher;
use crate::status::{GroupKind, Object, ObjectReference};

/// Special namespace token matching every namespace and cluster-scoped
/// resources.
pub const NAMESPACE_ALL: &str = "*all*";
/// Special namespace token for cluster-scoped resources only.
pub const NAMESPACE_NONE: &str = "";

/// API version assigned to synthetic log objects.
pub const LOG_API_VERSION: &str = "kube-health.io/v1";

/// A specification of a query for objects. Closed family: every variant the
/// evaluator understands is listed here.
#[derive(Debug, Clone)]
pub enum Query {
    /// Objects of matching kinds in a namespace.
    Kind {
        ns: String,
        matcher: GroupKindMatcher,
    },
    /// Objects owned (via `ownerReferences`) by the given object.
    Owner {
        object: Arc<Object>,
        matcher: GroupKindMatcher,
        /// Namespace of the child objects, for cluster-scoped parents whose
        /// children live in a specific namespace.
        ns_override: Option<String>,
    },
    /// Objects of one kind selected by the object's `spec.selector`.
    Label {
        object: Arc<Object>,
        matcher: GroupKindMatcher,
        selector: Option<Selector>,
    },
    /// The single object referenced by an object reference.
    Ref {
        object: Arc<Object>,
        ref_object: ObjectReference,
    },
    /// Logs of one container of a pod, wrapped as a synthetic `Log` object.
    PodLog {
        object: Arc<Object>,
        container: String,
    },
}

impl Query {
    pub fn kind(ns: &str, matcher: GroupKindMatcher) -> Self {
        Query::Kind {
            ns: ns.to_string(),
            matcher,
        }
    }

    pub fn owner(object: Arc<Object>, matcher: GroupKindMatcher) -> Self {
        Query::Owner {
            object,
            matcher,
            ns_override: None,
        }
    }

    pub fn owner_in_namespace(object: Arc<Object>, matcher: GroupKindMatcher, ns: &str) -> Self {
        Query::Owner {
            object,
            matcher,
            ns_override: Some(ns.to_string()),
        }
    }

    /// Label query with the richer `matchLabels`/`matchExpressions` selector
    /// form used by newer resources (ReplicaSet, Deployment).
    pub fn label_set_based(object: Arc<Object>, kind: GroupKind) -> Self {
        let selector = build_selector(&object, SelectorMode::SetBased);
        Query::Label {
            object,
            matcher: GroupKindMatcher::single(kind),
            selector,
        }
    }

    /// Label query with the flat equality selector form used by older
    /// resources (Service).
    pub fn label_equality(object: Arc<Object>, kind: GroupKind) -> Self {
        let selector = build_selector(&object, SelectorMode::EqualityBased);
        Query::Label {
            object,
            matcher: GroupKindMatcher::single(kind),
            selector,
        }
    }

    pub fn reference(object: Arc<Object>, ref_object: ObjectReference) -> Self {
        Query::Ref { object, ref_object }
    }

    pub fn pod_log(object: Arc<Object>, container: &str) -> Self {
        Query::PodLog {
            object,
            container: container.to_string(),
        }
    }

    /// Namespace to preload for this query.
    pub fn namespace(&self) -> &str {
        match self {
            Query::Kind { ns, .. } => ns,
            Query::Owner {
                object, ns_override, ..
            } => ns_override.as_deref().unwrap_or_else(|| object.namespace()),
            Query::Label { object, .. } => object.namespace(),
            Query::Ref { object, .. } => object.namespace(),
            Query::PodLog { object, .. } => object.namespace(),
        }
    }

    /// Matcher describing the kinds the preload must cover.
    pub fn matcher(&self) -> GroupKindMatcher {
        match self {
            Query::Kind { matcher, .. } => matcher.clone(),
            Query::Owner { matcher, .. } => matcher.clone(),
            Query::Label { matcher, .. } => matcher.clone(),
            Query::Ref { ref_object, .. } => GroupKindMatcher::single(ref_object.group_kind()),
            // No implicit preload for log queries.
            Query::PodLog { .. } => GroupKindMatcher::none(),
        }
    }

    /// Filter the preloaded cache into the query result. Runs after the
    /// evaluator loaded the namespace under the merged matcher.
    pub(crate) async fn eval(&self, e: &Evaluator) -> Vec<Arc<Object>> {
        match self {
            Query::Kind { ns, matcher } => e.filter(ns, matcher).await,
            Query::Owner {
                object, matcher, ..
            } => {
                let candidates = e.filter(self.namespace(), matcher).await;
                e.filter_owned_by(object, candidates).await
            }
            Query::Label {
                object,
                matcher,
                selector,
            } => {
                let Some(selector) = selector else {
                    return Vec::new();
                };
                e.filter(object.namespace(), matcher)
                    .await
                    .into_iter()
                    .filter(|cand| selector.matches(cand.labels()))
                    .collect()
            }
            Query::Ref { object, ref_object } => e
                .filter(object.namespace(), &self.matcher())
                .await
                .into_iter()
                .filter(|cand| {
                    if !ref_object.uid.is_empty() {
                        ref_object.uid == cand.uid()
                    } else {
                        ref_object.name == cand.name()
                    }
                })
                .collect(),
            Query::PodLog { object, container } => {
                vec![Arc::new(e.fetch_pod_log(object, container).await)]
            }
        }
    }
}

enum SelectorMode {
    SetBased,
    EqualityBased,
}

/// Build a selector from the object's `spec.selector`. Construction failures
/// are logged and turn the query into an empty result.
fn build_selector(object: &Object, mode: SelectorMode) -> Option<Selector> {
    let raw = object.at("/spec/selector")?;
    match try_build_selector(raw, mode) {
        Ok(selector) => Some(selector),
        Err(err) => {
            debug!(object = %object.full_name(), error = %err, "error building selector");
            None
        }
    }
}

fn try_build_selector(raw: &Value, mode: SelectorMode) -> Result<Selector> {
    match mode {
        SelectorMode::EqualityBased => {
            let labels: BTreeMap<String, String> =
                serde_json::from_value(raw.clone()).context("invalid equality selector")?;
            Ok(Selector::Equality(labels))
        }
        SelectorMode::SetBased => {
            let selector: SetSelector =
                serde_json::from_value(raw.clone()).context("invalid label selector")?;
            for req in &selector.match_expressions {
                match req.operator {
                    SelectorOperator::In | SelectorOperator::NotIn if req.values.is_empty() => {
                        anyhow::bail!("selector requirement for {} has no values", req.key)
                    }
                    _ => {}
                }
            }
            Ok(Selector::Set(selector))
        }
    }
}

/// A label selector in one of the two wire forms.
#[derive(Debug, Clone)]
pub enum Selector {
    /// Flat `key: value` map; all pairs must match.
    Equality(BTreeMap<String, String>),
    /// `matchLabels` + `matchExpressions`.
    Set(SetSelector),
}

impl Selector {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Selector::Equality(want) => want
                .iter()
                .all(|(k, v)| labels.get(k).is_some_and(|have| have == v)),
            Selector::Set(set) => {
                set.match_labels
                    .iter()
                    .all(|(k, v)| labels.get(k).is_some_and(|have| have == v))
                    && set.match_expressions.iter().all(|req| req.matches(labels))
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetSelector {
    pub match_labels: BTreeMap<String, String>,
    pub match_expressions: Vec<SelectorRequirement>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorRequirement {
    pub key: String,
    pub operator: SelectorOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

impl SelectorRequirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            SelectorOperator::In => value.is_some_and(|v| self.values.contains(v)),
            SelectorOperator::NotIn => !value.is_some_and(|v| self.values.contains(v)),
            SelectorOperator::Exists => value.is_some(),
            SelectorOperator::DoesNotExist => value.is_none(),
        }
    }
}

/// Synthetic object wrapping fetched container logs.
pub(crate) fn log_object(container: &str, logs: Option<String>) -> Object {
    let data = match logs {
        Some(log) => json!({ "log": log }),
        None => json!({}),
    };
    Object::synthetic("Log", LOG_API_VERSION, container, data)
}
