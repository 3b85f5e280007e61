// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! ClusterOperator analyzer: condition analysis plus expansion of
//! `status.relatedObjects` into sub-statuses.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::analyze::{
    AnalyzerRegistry, ConditionAnalyzer, GenericConditionAnalyzer, aggregate_result,
    analyze_object_conditions, default_condition_analyzers, regex_matchers, string_matchers,
};
use crate::eval::{Analyzer, Eval};
use crate::status::{GroupKind, GroupResource, Object, ObjectStatus};

fn gk_clusteroperator() -> GroupKind {
    GroupKind::new("config.openshift.io", "ClusterOperator")
}

fn clusteroperator_conditions_analyzer() -> GenericConditionAnalyzer {
    GenericConditionAnalyzer {
        conditions: string_matchers(&["Available"]),
        reversed_polarity_conditions: string_matchers(&["Degraded"]),
        ..Default::default()
    }
}

/// The insights operator reports cluster-transfer conditions with their own
/// conventions.
fn insights_conditions_analyzer() -> GenericConditionAnalyzer {
    GenericConditionAnalyzer {
        reversed_polarity_conditions: string_matchers(&["ClusterTransferAvailable"]),
        warning_conditions: regex_matchers(&["RemoteConfiguration"]),
        progressing_conditions: string_matchers(&["ClusterTransferAvailable"]),
        ..Default::default()
    }
}

pub struct ClusterOperatorAnalyzer {
    e: Eval,
}

#[async_trait]
impl Analyzer for ClusterOperatorAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == gk_clusteroperator()
    }

    async fn analyze(&self, obj: &Arc<Object>) -> ObjectStatus {
        let mut analyzers: Vec<Arc<dyn ConditionAnalyzer>> =
            vec![Arc::new(clusteroperator_conditions_analyzer())];
        analyzers.extend(default_condition_analyzers());
        if obj.name() == "insights" {
            analyzers.push(Arc::new(insights_conditions_analyzer()));
        }

        let conditions = match analyze_object_conditions(obj, &analyzers) {
            Ok(conds) => conds,
            Err(err) => return ObjectStatus::unknown_with_error(obj.clone(), &err),
        };

        let related = match obj.at("/status/relatedObjects") {
            Some(Value::Array(related)) => related.as_slice(),
            // With no or malformed related objects, report conditions only.
            _ => &[],
        };

        let object_infos = adapt_related_objects(obj, related);
        let sub_statuses = self.evaluate_related_objects(&object_infos).await;

        aggregate_result(obj.clone(), sub_statuses, conditions)
    }
}

impl ClusterOperatorAnalyzer {
    async fn evaluate_related_objects(&self, object_infos: &[ObjectInfo]) -> Vec<ObjectStatus> {
        let mut statuses = Vec::new();
        for info in object_infos {
            let Some(gk) = self
                .e
                .resource_to_kind(&info.group_resource)
                .map(|gvk| gvk.group_kind())
            else {
                debug!(resource = %info.group_resource, "no kind mapping, skipping related object");
                continue;
            };
            if self.e.is_ignored_kind(&gk) {
                debug!(kind = %gk, "kind is registered as ignored");
                continue;
            }

            match self
                .e
                .eval_resource(&info.group_resource, &info.namespace, &info.name)
                .await
            {
                Ok(related) => statuses.extend(related),
                Err(err) => {
                    debug!(resource = %info.group_resource, name = %info.name,
                        namespace = %info.namespace, error = format!("{err:#}"),
                        "failed to evaluate related object");
                }
            }
        }
        statuses
    }
}

struct ObjectInfo {
    group_resource: GroupResource,
    name: String,
    namespace: String,
}

/// Read the untyped related-object entries, dropping malformed ones and any
/// entry referencing the parent itself (some operators list themselves).
fn adapt_related_objects(parent: &Object, related_objects: &[Value]) -> Vec<ObjectInfo> {
    let mut adapted = Vec::new();
    for entry in related_objects {
        let (Some(resource), Some(group), Some(name)) = (
            entry.pointer("/resource").and_then(Value::as_str),
            entry.pointer("/group").and_then(Value::as_str),
            entry.pointer("/name").and_then(Value::as_str),
        ) else {
            debug!(entry = %entry, "malformed related object entry");
            continue;
        };

        if parent.name() == name {
            debug!(name, "related object references itself, skipping");
            continue;
        }

        adapted.push(ObjectInfo {
            group_resource: GroupResource::new(group, resource),
            name: name.to_string(),
            namespace: entry
                .pointer("/namespace")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }
    adapted
}

pub(super) fn register(reg: &mut AnalyzerRegistry) {
    reg.register(|e| Arc::new(ClusterOperatorAnalyzer { e }));

    reg.register_ignored_kinds([
        GroupKind::core("Namespace"),
        GroupKind::core("Secret"),
        GroupKind::core("ConfigMap"),
        GroupKind::core("ServiceAccount"),
        GroupKind::new("rbac.authorization.k8s.io", "ClusterRole"),
        GroupKind::new("rbac.authorization.k8s.io", "ClusterRoleBinding"),
        GroupKind::new("rbac.authorization.k8s.io", "Role"),
        GroupKind::new("rbac.authorization.k8s.io", "RoleBinding"),
        GroupKind::new("apiextensions.k8s.io", "CustomResourceDefinition"),
        GroupKind::new("security.openshift.io", "SecurityContextConstraints"),
        GroupKind::new("admissionregistration.k8s.io", "MutatingWebhookConfiguration"),
        GroupKind::new("admissionregistration.k8s.io", "ValidatingWebhookConfiguration"),
        GroupKind::new("config.openshift.io", "OAuth"),
        GroupKind::new("config.openshift.io", "Node"),
        GroupKind::new("operator.openshift.io", "CloudCredential"),
        GroupKind::new("console.openshift.io", "ConsolePlugin"),
        GroupKind::new("machineconfiguration.openshift.io", "MachineConfig"),
        GroupKind::new("template.openshift.io", "Template"),
        GroupKind::new("monitoring.coreos.com", "ServiceMonitor"),
        GroupKind::new("monitoring.coreos.com", "PrometheusRule"),
    ]);
}
