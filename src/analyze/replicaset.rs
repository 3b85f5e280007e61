// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! ReplicaSet analyzer: pod evaluation via the label selector plus
//! conditions synthesized from the replica counters.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::ReplicaSet;

use super::pod::{PodAnalyzer, gk_pod};
use super::{
    AnalyzerRegistry, ConditionAnalyzer, aggregate_result, analyze_object_conditions,
    condition_status_error, condition_status_ok, default_condition_analyzers,
    synthetic_condition,
};
use crate::eval::{Analyzer, Eval, Query};
use crate::status::{Condition, ConditionStatus, ConditionValue, GroupKind, Object, ObjectStatus};

pub(super) fn gk_replicaset() -> GroupKind {
    GroupKind::new("apps", "ReplicaSet")
}

pub struct ReplicaSetAnalyzer {
    e: Eval,
}

impl ReplicaSetAnalyzer {
    pub fn new(e: Eval) -> Self {
        Self { e }
    }
}

#[async_trait]
impl Analyzer for ReplicaSetAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == gk_replicaset()
    }

    async fn analyze(&self, obj: &Arc<Object>) -> ObjectStatus {
        let sub_statuses = match self
            .e
            .eval_query(
                &Query::label_set_based(obj.clone(), gk_pod()),
                Some(Arc::new(PodAnalyzer::new(self.e.clone()))),
            )
            .await
        {
            Ok(subs) => subs,
            Err(err) => return ObjectStatus::unknown_with_error(obj.clone(), &err),
        };

        let mut analyzers: Vec<Arc<dyn ConditionAnalyzer>> =
            vec![Arc::new(replicaset_condition_analyzer)];
        analyzers.extend(default_condition_analyzers());

        let mut conditions = match analyze_object_conditions(obj, &analyzers) {
            Ok(conds) => conds,
            Err(err) => return ObjectStatus::unknown_with_error(obj.clone(), &err),
        };

        match replicaset_synthetic_conditions(obj) {
            Ok(synth) => conditions.extend(synth),
            Err(err) => return ObjectStatus::unknown_with_error(obj.clone(), &err),
        }

        aggregate_result(obj.clone(), sub_statuses, conditions)
    }
}

/// Conditions derived from the `status.*Replicas` counters against the
/// desired replica count.
fn replicaset_synthetic_conditions(obj: &Object) -> Result<Vec<ConditionStatus>> {
    let rs: ReplicaSet = serde_json::from_value(obj.data().clone())?;
    let mut conditions = Vec::new();

    // The controller uses 1 when replicas is not specified.
    let replicas = rs.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);

    let status = rs.status.unwrap_or_default();
    let labeled = status.fully_labeled_replicas.unwrap_or(0);
    let available = status.available_replicas.unwrap_or(0);
    let ready = status.ready_replicas.unwrap_or(0);

    if replicas > labeled {
        conditions.push(condition_status_error(synthetic_condition(
            "ReplicasLabeled",
            false,
            "Unlabeled",
            &format!("Labeled: {labeled}/{replicas}"),
        )));
    }
    if replicas > available {
        conditions.push(condition_status_error(synthetic_condition(
            "ReplicasAvailable",
            false,
            "Unavailable",
            &format!("Available: {available}/{replicas}"),
        )));
    }
    if replicas > ready {
        conditions.push(condition_status_error(synthetic_condition(
            "ReplicasReady",
            false,
            "NotReady",
            &format!("Ready: {ready}/{replicas}"),
        )));
    } else if replicas == ready {
        conditions.push(condition_status_ok(synthetic_condition(
            "ReplicasReady",
            true,
            "Ready",
            "All replicas are ready",
        )));
    }
    if status.replicas > replicas {
        conditions.push(condition_status_error(synthetic_condition(
            "TerminatedReplicas",
            false,
            "Terminating",
            &format!("Pending terminations: {}", status.replicas - replicas),
        )));
    }

    Ok(conditions)
}

fn replicaset_condition_analyzer(cond: &Condition) -> Option<ConditionStatus> {
    if cond.type_ == "ReplicaFailure" && cond.status == ConditionValue::True {
        return Some(condition_status_error(cond.clone()));
    }

    None
}

pub(super) fn register(reg: &mut AnalyzerRegistry) {
    reg.register(|e| Arc::new(ReplicaSetAnalyzer::new(e)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::default_registry;
    use crate::eval::{Evaluator, FakeLoader};
    use crate::status::Verdict;
    use serde_json::{Value, json};

    fn rs(name: &str, uid: &str, status: Value) -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "ReplicaSet",
            "metadata": {"name": name, "namespace": "default", "uid": uid,
                         "labels": {"app": name}},
            "spec": {
                "replicas": 2,
                "selector": {"matchLabels": {"app": name}}
            },
            "status": status
        })
    }

    #[tokio::test]
    async fn test_replicaset_all_ready() {
        let loader = FakeLoader::new();
        let objs = loader
            .register([rs(
                "rs1",
                "u1",
                json!({"replicas": 2, "fullyLabeledReplicas": 2,
                       "availableReplicas": 2, "readyReplicas": 2}),
            )])
            .unwrap();
        let obj = objs[0].clone();
        let e = Evaluator::new(default_registry().default_analyzers(), Box::new(loader));

        let st = e.eval(&obj).await;
        assert_eq!(st.status.result, Verdict::Ok);
        let ready = st
            .conditions
            .iter()
            .find(|c| c.condition.type_ == "ReplicasReady")
            .unwrap();
        assert_eq!(ready.status.result, Verdict::Ok);
        assert_eq!(ready.condition.message, "All replicas are ready");
    }

    #[tokio::test]
    async fn test_replicaset_none_ready() {
        let loader = FakeLoader::new();
        let objs = loader
            .register([rs(
                "rs2",
                "u2",
                json!({"replicas": 2, "fullyLabeledReplicas": 0,
                       "availableReplicas": 0, "readyReplicas": 0}),
            )])
            .unwrap();
        let obj = objs[0].clone();
        let e = Evaluator::new(default_registry().default_analyzers(), Box::new(loader));

        let st = e.eval(&obj).await;
        assert_eq!(st.status.result, Verdict::Error);

        let types: Vec<&str> = st
            .conditions
            .iter()
            .map(|c| c.condition.type_.as_str())
            .collect();
        assert!(types.contains(&"ReplicasLabeled"));
        assert!(types.contains(&"ReplicasAvailable"));
        assert!(types.contains(&"ReplicasReady"));
        let ready = st
            .conditions
            .iter()
            .find(|c| c.condition.type_ == "ReplicasReady")
            .unwrap();
        assert_eq!(ready.condition.message, "Ready: 0/2");
    }

    #[tokio::test]
    async fn test_replicaset_pending_terminations() {
        let loader = FakeLoader::new();
        let objs = loader
            .register([rs(
                "rs3",
                "u3",
                json!({"replicas": 3, "fullyLabeledReplicas": 2,
                       "availableReplicas": 2, "readyReplicas": 2}),
            )])
            .unwrap();
        let obj = objs[0].clone();
        let e = Evaluator::new(default_registry().default_analyzers(), Box::new(loader));

        let st = e.eval(&obj).await;
        let term = st
            .conditions
            .iter()
            .find(|c| c.condition.type_ == "TerminatedReplicas")
            .unwrap();
        assert_eq!(term.status.result, Verdict::Error);
        assert_eq!(term.condition.message, "Pending terminations: 1");
    }

    #[tokio::test]
    async fn test_replica_failure_condition() {
        let loader = FakeLoader::new();
        let objs = loader
            .register([json!({
                "apiVersion": "apps/v1",
                "kind": "ReplicaSet",
                "metadata": {"name": "rs4", "namespace": "default", "uid": "u4"},
                "spec": {"replicas": 1, "selector": {"matchLabels": {"app": "rs4"}}},
                "status": {
                    "replicas": 1, "readyReplicas": 1,
                    "fullyLabeledReplicas": 1, "availableReplicas": 1,
                    "conditions": [{"type": "ReplicaFailure", "status": "True",
                                    "reason": "FailedCreate"}]
                }
            })])
            .unwrap();
        let obj = objs[0].clone();
        let e = Evaluator::new(default_registry().default_analyzers(), Box::new(loader));

        let st = e.eval(&obj).await;
        assert_eq!(st.status.result, Verdict::Error);
        let failure = st
            .conditions
            .iter()
            .find(|c| c.condition.type_ == "ReplicaFailure")
            .unwrap();
        assert_eq!(failure.status.result, Verdict::Error);
    }

    #[tokio::test]
    async fn test_replicaset_defaults_to_one_replica() {
        let loader = FakeLoader::new();
        let objs = loader
            .register([json!({
                "apiVersion": "apps/v1",
                "kind": "ReplicaSet",
                "metadata": {"name": "rs5", "namespace": "default", "uid": "u5"},
                "spec": {"selector": {"matchLabels": {"app": "rs5"}}},
                "status": {"replicas": 1, "readyReplicas": 1,
                           "fullyLabeledReplicas": 1, "availableReplicas": 1}
            })])
            .unwrap();
        let obj = objs[0].clone();
        let e = Evaluator::new(default_registry().default_analyzers(), Box::new(loader));

        let st = e.eval(&obj).await;
        assert_eq!(st.status.result, Verdict::Ok);
    }

    #[tokio::test]
    async fn test_replicaset_selects_pods() {
        let loader = FakeLoader::new();
        let objs = loader
            .register([
                rs(
                    "rs6",
                    "u6",
                    json!({"replicas": 2, "fullyLabeledReplicas": 2,
                           "availableReplicas": 2, "readyReplicas": 2}),
                ),
                json!({
                    "apiVersion": "v1",
                    "kind": "Pod",
                    "metadata": {"name": "rs6-pod", "namespace": "default", "uid": "u7",
                                 "labels": {"app": "rs6"}},
                    "status": {"phase": "Running"}
                }),
                json!({
                    "apiVersion": "v1",
                    "kind": "Pod",
                    "metadata": {"name": "other", "namespace": "default", "uid": "u8",
                                 "labels": {"app": "other"}},
                    "status": {"phase": "Failed"}
                }),
            ])
            .unwrap();
        let obj = objs[0].clone();
        let e = Evaluator::new(default_registry().default_analyzers(), Box::new(loader));

        let st = e.eval(&obj).await;
        // Only the labeled pod is picked up; the failing unrelated pod must
        // not leak into the ReplicaSet's verdict.
        assert_eq!(st.sub_statuses.len(), 1);
        assert_eq!(st.sub_statuses[0].object.name(), "rs6-pod");
        assert_eq!(st.status.result, Verdict::Ok);
    }
}
