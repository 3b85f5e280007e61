// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Analyzers: turning objects and their conditions into health statuses.

mod common;
mod deployment;
mod generic;
mod node;
pub mod openshift;
mod pod;
mod pvc;
mod replicaset;
mod service;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::eval::{Analyzer, AnalyzerInit, AnalyzerSet, Eval};
use crate::status::{
    Condition, ConditionStatus, GroupKind, Object, ObjectStatus, Status, Verdict,
};

pub use common::{
    GenericConditionAnalyzer, Matcher, condition_status_error, condition_status_ok,
    condition_status_progressing, condition_status_unknown, condition_status_unknown_with_error,
    condition_status_warning, default_condition_analyzers, regex_matchers, string_matchers,
    synthetic_condition, synthetic_condition_error, synthetic_condition_ok,
    synthetic_condition_progressing, synthetic_condition_warning,
};
pub use generic::{GenericAnalyzer, analyze_observed_generation, generic_owner_query};
pub use pod::PodAnalyzer;

/// Derives a status from a single condition. Returns `None` when the
/// analyzer does not apply to the condition, letting the next one in the
/// list have a go.
pub trait ConditionAnalyzer: Send + Sync {
    fn analyze(&self, cond: &Condition) -> Option<ConditionStatus>;
}

/// Kind-specific condition analyzers are plain functions.
impl<F> ConditionAnalyzer for F
where
    F: Fn(&Condition) -> Option<ConditionStatus> + Send + Sync,
{
    fn analyze(&self, cond: &Condition) -> Option<ConditionStatus> {
        self(cond)
    }
}

/// Analyze the conditions found in the object's `status.conditions`.
pub fn analyze_object_conditions(
    obj: &Object,
    analyzers: &[Arc<dyn ConditionAnalyzer>],
) -> Result<Vec<ConditionStatus>> {
    match obj.at("/status/conditions") {
        None => Ok(Vec::new()),
        Some(Value::Array(data)) => analyze_raw_conditions(data, analyzers),
        Some(_) => anyhow::bail!("status.conditions is not a list"),
    }
}

pub fn analyze_raw_conditions(
    data: &[Value],
    analyzers: &[Arc<dyn ConditionAnalyzer>],
) -> Result<Vec<ConditionStatus>> {
    let mut conditions = Vec::with_capacity(data.len());
    for cond_data in data {
        let cond: Condition =
            serde_json::from_value(cond_data.clone()).context("error converting condition")?;
        conditions.push(cond);
    }

    Ok(analyze_conditions(&conditions, analyzers))
}

/// Run each condition through the analyzers in order; the first one that
/// does not decline wins. Unmatched conditions analyze as Unknown.
pub fn analyze_conditions(
    conditions: &[Condition],
    analyzers: &[Arc<dyn ConditionAnalyzer>],
) -> Vec<ConditionStatus> {
    conditions
        .iter()
        .map(|cond| {
            analyzers
                .iter()
                .find_map(|a| a.analyze(cond))
                .unwrap_or_else(|| condition_status_unknown(cond.clone()))
        })
        .collect()
}

/// Combine condition results and sub-object results into the parent's
/// status: the maximum verdict across contributors, progressing if any
/// contributor is progressing.
///
/// An object with no contributors aggregates to Unknown; analyzers of
/// intrinsically inert resources emit a synthetic condition or use
/// [`ObjectStatus::ok`] instead.
pub fn aggregate_result(
    object: Arc<Object>,
    sub_statuses: Vec<ObjectStatus>,
    conditions: Vec<ConditionStatus>,
) -> ObjectStatus {
    let mut result = Verdict::Unknown;
    let mut progressing = false;

    for cond in &conditions {
        result = result.max(cond.status.result);
        progressing |= cond.status.progressing;
    }

    for sub in &sub_statuses {
        result = result.max(sub.status.result);
        progressing |= sub.status.progressing;
    }

    ObjectStatus {
        object,
        status: Status {
            result,
            progressing,
            message: result.to_string(),
            err: None,
        },
        sub_statuses,
        conditions,
    }
}

/// Reports OK for the configured kinds, for resources that carry no health
/// signal of their own.
pub struct AlwaysGreenAnalyzer {
    pub kinds: Vec<GroupKind>,
}

#[async_trait]
impl Analyzer for AlwaysGreenAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        self.kinds.contains(&obj.group_kind())
    }

    async fn analyze(&self, obj: &Arc<Object>) -> ObjectStatus {
        ObjectStatus::ok(obj.clone(), Vec::new())
    }
}

/// Registry of analyzers. Modules opt in through an explicit builder rather
/// than process-wide initializers, and the evaluator receives the finished
/// set as a constructor parameter so tests can swap in alternative sets.
#[derive(Default)]
pub struct AnalyzerRegistry {
    inits: Vec<AnalyzerInit>,
    ignored: Vec<GroupKind>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an analyzer constructor. The constructor receives an
    /// evaluator handle, needed whenever the analyzer issues sub-queries.
    pub fn register<F>(&mut self, init: F)
    where
        F: FnOnce(Eval) -> Arc<dyn Analyzer> + Send + 'static,
    {
        self.inits.push(Box::new(init));
    }

    /// Register analyzers that do not call back into the evaluator.
    pub fn register_simple(&mut self, analyzer: Arc<dyn Analyzer>) {
        self.register(move |_| analyzer);
    }

    /// Kinds skipped by owner traversal to suppress noise.
    pub fn register_ignored_kinds(&mut self, kinds: impl IntoIterator<Item = GroupKind>) {
        self.ignored.extend(kinds);
    }

    pub fn is_ignored_kind(&self, gk: &GroupKind) -> bool {
        self.ignored.contains(gk)
    }

    /// Finish the registry into the analyzer set consumed by the evaluator:
    /// the registered constructors plus the tail pair. The tail order is
    /// load-bearing: the generic catch-all must come last so every object
    /// finds an analyzer.
    pub fn default_analyzers(mut self) -> AnalyzerSet {
        self.register(|_| {
            Arc::new(AlwaysGreenAnalyzer {
                kinds: vec![GroupKind::core("Namespace")],
            })
        });
        self.register(|e| Arc::new(GenericAnalyzer::new(e)));
        AnalyzerSet {
            inits: self.inits,
            ignored_kinds: self.ignored,
        }
    }
}

/// The standard registry: analyzers for the core workload kinds, the
/// OpenShift vendor pack, and the owner-traversal ignore list.
pub fn default_registry() -> AnalyzerRegistry {
    let mut reg = AnalyzerRegistry::new();

    pod::register(&mut reg);
    replicaset::register(&mut reg);
    deployment::register(&mut reg);
    service::register(&mut reg);
    node::register(&mut reg);
    pvc::register(&mut reg);

    // Resources that are mostly configuration plumbing; evaluating them as
    // sub-objects adds noise without signal.
    reg.register_ignored_kinds([
        GroupKind::core("ConfigMap"),
        GroupKind::core("ServiceAccount"),
        GroupKind::new("rbac.authorization.k8s.io", "Role"),
        GroupKind::new("rbac.authorization.k8s.io", "RoleBinding"),
        GroupKind::core("Secret"),
        GroupKind::new("discovery.k8s.io", "EndpointSlice"),
        GroupKind::core("Service"),
        GroupKind::new("apps", "ControllerRevision"),
        GroupKind::new("rbac.authorization.k8s.io", "ClusterRole"),
        GroupKind::new("rbac.authorization.k8s.io", "ClusterRoleBinding"),
        GroupKind::new("authorization.openshift.io", "ClusterRole"),
        GroupKind::new("authorization.openshift.io", "ClusterRoleBinding"),
        GroupKind::new("project.openshift.io", "Project"),
    ]);

    openshift::register(&mut reg);

    reg
}
