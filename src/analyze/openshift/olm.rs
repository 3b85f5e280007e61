// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Analyzers for resources managed by the Operator Lifecycle Manager
//! (https://olm.operatorframework.io/). Also a template for extending the
//! tool with custom analyzers.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::analyze::{
    AlwaysGreenAnalyzer, AnalyzerRegistry, ConditionAnalyzer, GenericConditionAnalyzer,
    aggregate_result, analyze_conditions, analyze_object_conditions, condition_status_error,
    default_condition_analyzers, string_matchers, synthetic_condition_progressing,
};
use crate::eval::{Analyzer, Eval, Query};
use crate::status::{
    Condition, ConditionStatus, GroupKind, Object, ObjectReference, ObjectStatus,
};

fn gk_subscription() -> GroupKind {
    GroupKind::new("operators.coreos.com", "Subscription")
}

fn gk_install_plan() -> GroupKind {
    GroupKind::new("operators.coreos.com", "InstallPlan")
}

fn gk_operator_group() -> GroupKind {
    GroupKind::new("operators.coreos.com", "OperatorGroup")
}

fn gk_csv() -> GroupKind {
    GroupKind::new("operators.coreos.com", "ClusterServiceVersion")
}

fn subscription_conditions_analyzer() -> GenericConditionAnalyzer {
    GenericConditionAnalyzer {
        reversed_polarity_conditions: string_matchers(&[
            "CatalogSourcesUnhealthy",
            "ResolutionFailed",
        ]),
        ..Default::default()
    }
}

pub struct OlmSubscriptionAnalyzer {
    e: Eval,
}

#[async_trait]
impl Analyzer for OlmSubscriptionAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == gk_subscription()
    }

    async fn analyze(&self, obj: &Arc<Object>) -> ObjectStatus {
        let install_plan_statuses = self.analyze_install_plans(obj).await;
        let csv_statuses = self.analyze_csv(obj).await;

        let mut analyzers: Vec<Arc<dyn ConditionAnalyzer>> =
            vec![Arc::new(subscription_conditions_analyzer())];
        analyzers.extend(default_condition_analyzers());

        let mut conditions = match analyze_object_conditions(obj, &analyzers) {
            Ok(conds) => conds,
            Err(err) => return ObjectStatus::unknown_with_error(obj.clone(), &err),
        };

        if install_plan_statuses.is_empty() {
            conditions.push(synthetic_condition_progressing(
                "InstallPlan",
                "InstallPlanMissing",
                "Install plan not found",
            ));
        }

        let mut sub_statuses = install_plan_statuses;
        sub_statuses.extend(csv_statuses);

        aggregate_result(obj.clone(), sub_statuses, conditions)
    }
}

impl OlmSubscriptionAnalyzer {
    async fn analyze_install_plans(&self, obj: &Arc<Object>) -> Vec<ObjectStatus> {
        let Some(ref_data) = obj.at("/status/installPlanRef") else {
            return Vec::new();
        };

        let obj_ref: ObjectReference = match serde_json::from_value(ref_data.clone()) {
            Ok(obj_ref) => obj_ref,
            Err(err) => {
                debug!(object = %obj.full_name(), error = %err,
                    "failed to read install plan reference");
                return Vec::new();
            }
        };

        match self
            .e
            .eval_query(
                &Query::reference(obj.clone(), obj_ref),
                Some(Arc::new(OlmInstallPlanAnalyzer)),
            )
            .await
        {
            Ok(plans) => plans,
            Err(err) => {
                debug!(object = %obj.full_name(), error = format!("{err:#}"),
                    "failed to evaluate install plan dependency");
                Vec::new()
            }
        }
    }

    async fn analyze_csv(&self, obj: &Arc<Object>) -> Vec<ObjectStatus> {
        let Some(csv_name) = obj.str_at("/status/currentCSV") else {
            return Vec::new();
        };

        let obj_ref = ObjectReference {
            api_version: "operators.coreos.com/v1alpha1".to_string(),
            kind: "ClusterServiceVersion".to_string(),
            name: csv_name.to_string(),
            namespace: obj.namespace().to_string(),
            ..Default::default()
        };

        match self
            .e
            .eval_query(
                &Query::reference(obj.clone(), obj_ref),
                Some(Arc::new(OlmCsvAnalyzer)),
            )
            .await
        {
            Ok(csvs) => csvs,
            Err(err) => {
                debug!(object = %obj.full_name(), error = format!("{err:#}"),
                    "failed to evaluate csv status");
                Vec::new()
            }
        }
    }
}

pub struct OlmInstallPlanAnalyzer;

#[async_trait]
impl Analyzer for OlmInstallPlanAnalyzer {
    // Supports is informational here, the analyzer is invoked explicitly.
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == gk_install_plan()
    }

    async fn analyze(&self, obj: &Arc<Object>) -> ObjectStatus {
        let analyzer = Arc::new(GenericConditionAnalyzer {
            conditions: string_matchers(&["Installed"]),
            ..Default::default()
        }) as Arc<dyn ConditionAnalyzer>;

        let conditions = match analyze_object_conditions(obj, &[analyzer]) {
            Ok(conds) => conds,
            Err(err) => return ObjectStatus::unknown_with_error(obj.clone(), &err),
        };

        aggregate_result(obj.clone(), Vec::new(), conditions)
    }
}

pub struct OlmCsvAnalyzer;

#[async_trait]
impl Analyzer for OlmCsvAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == gk_csv()
    }

    async fn analyze(&self, obj: &Arc<Object>) -> ObjectStatus {
        // The CSV publishes its state as flat status fields rather than a
        // conditions list; adapt it into one condition typed by the phase.
        if !obj.has_status() {
            return ObjectStatus::unknown(obj.clone());
        }

        let mut condition = Condition {
            reason: obj.str_at("/status/reason").unwrap_or_default().to_string(),
            message: obj.str_at("/status/message").unwrap_or_default().to_string(),
            ..Default::default()
        };
        if let Some(phase) = obj.str_at("/status/phase") {
            condition.type_ = phase.to_string();
        }

        let analyzer = Arc::new(olm_csv_condition_analyzer) as Arc<dyn ConditionAnalyzer>;
        let conditions = analyze_conditions(&[condition], &[analyzer]);

        aggregate_result(obj.clone(), Vec::new(), conditions)
    }
}

fn olm_csv_condition_analyzer(cond: &Condition) -> Option<ConditionStatus> {
    if cond.type_ == "Failed" {
        return Some(condition_status_error(cond.clone()));
    }

    None
}

pub(super) fn register(reg: &mut AnalyzerRegistry) {
    reg.register(|e| Arc::new(OlmSubscriptionAnalyzer { e }));
    reg.register_simple(Arc::new(AlwaysGreenAnalyzer {
        kinds: vec![gk_operator_group()],
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::default_registry;
    use crate::eval::{Evaluator, FakeLoader};
    use crate::status::Verdict;
    use serde_json::{Value, json};

    fn subscription(name: &str, uid: &str, status: Value) -> Value {
        json!({
            "apiVersion": "operators.coreos.com/v1alpha1",
            "kind": "Subscription",
            "metadata": {"name": name, "namespace": "operators", "uid": uid},
            "status": status
        })
    }

    fn install_plan(name: &str, uid: &str, installed: &str) -> Value {
        json!({
            "apiVersion": "operators.coreos.com/v1alpha1",
            "kind": "InstallPlan",
            "metadata": {"name": name, "namespace": "operators", "uid": uid},
            "status": {"conditions": [{"type": "Installed", "status": installed}]}
        })
    }

    fn csv(name: &str, uid: &str, phase: &str) -> Value {
        json!({
            "apiVersion": "operators.coreos.com/v1alpha1",
            "kind": "ClusterServiceVersion",
            "metadata": {"name": name, "namespace": "operators", "uid": uid},
            "status": {"phase": phase, "reason": "InstallSucceeded", "message": ""}
        })
    }

    #[tokio::test]
    async fn test_subscription_with_installed_plan_and_csv() {
        let loader = FakeLoader::new();
        let objs = loader
            .register([
                subscription(
                    "sub",
                    "s1",
                    json!({
                        "installPlanRef": {
                            "apiVersion": "operators.coreos.com/v1alpha1",
                            "kind": "InstallPlan", "name": "install-1",
                            "namespace": "operators", "uid": "ip1"
                        },
                        "currentCSV": "operator.v1.0.0",
                        "conditions": [{"type": "CatalogSourcesUnhealthy", "status": "False"}]
                    }),
                ),
                install_plan("install-1", "ip1", "True"),
                csv("operator.v1.0.0", "csv1", "Succeeded"),
            ])
            .unwrap();
        let obj = objs[0].clone();
        let e = Evaluator::new(default_registry().default_analyzers(), Box::new(loader));

        let st = e.eval(&obj).await;
        assert_eq!(st.status.result, Verdict::Ok);
        assert_eq!(st.sub_statuses.len(), 2);
        assert!(!st.conditions.iter().any(|c| c.condition.type_ == "InstallPlan"));
    }

    #[tokio::test]
    async fn test_subscription_missing_install_plan_progressing() {
        let loader = FakeLoader::new();
        let objs = loader
            .register([subscription("sub2", "s2", json!({}))])
            .unwrap();
        let obj = objs[0].clone();
        let e = Evaluator::new(default_registry().default_analyzers(), Box::new(loader));

        let st = e.eval(&obj).await;
        assert!(st.status.progressing);
        let cond = st
            .conditions
            .iter()
            .find(|c| c.condition.type_ == "InstallPlan")
            .unwrap();
        assert_eq!(cond.condition.reason, "InstallPlanMissing");
        assert_eq!(cond.status.result, Verdict::Unknown);
    }

    #[tokio::test]
    async fn test_subscription_unhealthy_catalog_source() {
        let loader = FakeLoader::new();
        let objs = loader
            .register([subscription(
                "sub3",
                "s3",
                json!({"conditions": [
                    {"type": "CatalogSourcesUnhealthy", "status": "True",
                     "reason": "UnhealthyCatalogSourceFound"}
                ]}),
            )])
            .unwrap();
        let obj = objs[0].clone();
        let e = Evaluator::new(default_registry().default_analyzers(), Box::new(loader));

        let st = e.eval(&obj).await;
        assert_eq!(st.status.result, Verdict::Error);
    }

    #[tokio::test]
    async fn test_failed_csv() {
        let loader = FakeLoader::new();
        let objs = loader
            .register([
                subscription(
                    "sub4",
                    "s4",
                    json!({
                        "installPlanRef": {
                            "apiVersion": "operators.coreos.com/v1alpha1",
                            "kind": "InstallPlan", "name": "install-4",
                            "namespace": "operators", "uid": "ip4"
                        },
                        "currentCSV": "operator.v2.0.0"
                    }),
                ),
                install_plan("install-4", "ip4", "True"),
                csv("operator.v2.0.0", "csv4", "Failed"),
            ])
            .unwrap();
        let obj = objs[0].clone();
        let e = Evaluator::new(default_registry().default_analyzers(), Box::new(loader));

        let st = e.eval(&obj).await;
        assert_eq!(st.status.result, Verdict::Error);
    }

    #[tokio::test]
    async fn test_operator_group_is_always_green() {
        let loader = FakeLoader::new();
        let objs = loader
            .register([json!({
                "apiVersion": "operators.coreos.com/v1",
                "kind": "OperatorGroup",
                "metadata": {"name": "og", "namespace": "operators", "uid": "og1"},
                "status": {"lastUpdated": "2024-01-01T00:00:00Z"}
            })])
            .unwrap();
        let obj = objs[0].clone();
        let e = Evaluator::new(default_registry().default_analyzers(), Box::new(loader));

        let st = e.eval(&obj).await;
        assert_eq!(st.status.result, Verdict::Ok);
    }
}
