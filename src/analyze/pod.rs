// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Pod analyzer. Containers are treated as synthetic sub-objects of the pod
//! so each container's state is reported separately, with the tail of its
//! logs attached when it is unhealthy.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use serde_json::Value;

use super::{
    AnalyzerRegistry, aggregate_result, analyze_object_conditions, default_condition_analyzers,
    synthetic_condition_error, synthetic_condition_ok,
};
use crate::eval::{Analyzer, Eval, Query};
use crate::status::{ConditionStatus, GroupKind, Object, ObjectStatus, Verdict};

pub(super) fn gk_pod() -> GroupKind {
    GroupKind::core("Pod")
}

/// A waiting container counts as progressing until its last termination is
/// older than this.
fn progressing_timeout() -> Duration {
    Duration::minutes(3)
}

pub struct PodAnalyzer {
    e: Eval,
}

impl PodAnalyzer {
    pub fn new(e: Eval) -> Self {
        Self { e }
    }
}

#[async_trait]
impl Analyzer for PodAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == gk_pod()
    }

    async fn analyze(&self, obj: &Arc<Object>) -> ObjectStatus {
        let mut conditions =
            match analyze_object_conditions(obj, &default_condition_analyzers()) {
                Ok(conds) => conds,
                Err(err) => return ObjectStatus::unknown_with_error(obj.clone(), &err),
            };

        let pod: Pod = match serde_json::from_value(obj.data().clone()) {
            Ok(pod) => pod,
            Err(err) => {
                return ObjectStatus::unknown_with_error(obj.clone(), &anyhow::Error::new(err));
            }
        };
        conditions.extend(pod_synthetic_conditions(&pod));

        let container_statuses = self.analyze_pod_containers(obj, &pod).await;

        aggregate_result(obj.clone(), container_statuses, conditions)
    }
}

fn pod_synthetic_conditions(pod: &Pod) -> Vec<ConditionStatus> {
    let phase = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .unwrap_or_default();

    match phase {
        "Succeeded" => vec![synthetic_condition_ok("Succeeded", "")],
        "Failed" => vec![synthetic_condition_error("Failed", "Failed", "")],
        _ => Vec::new(),
    }
}

impl PodAnalyzer {
    async fn analyze_pod_containers(&self, obj: &Arc<Object>, pod: &Pod) -> Vec<ObjectStatus> {
        let mut ret = Vec::new();

        let container_statuses = pod
            .status
            .as_ref()
            .and_then(|s| s.container_statuses.as_ref());
        for cs in container_statuses.into_iter().flatten() {
            if let Some(status) = self.analyze_container(obj, cs).await {
                ret.push(status);
            }
        }

        ret
    }

    /// Analyze one container's state, reported as a separate sub-object.
    async fn analyze_container(
        &self,
        obj: &Arc<Object>,
        cs: &ContainerStatus,
    ) -> Option<ObjectStatus> {
        let mut cond: Option<ConditionStatus> = None;

        if let Some(waiting) = cs.state.as_ref().and_then(|s| s.waiting.as_ref()) {
            let last_transition: Option<DateTime<Utc>> = cs
                .last_state
                .as_ref()
                .and_then(|s| s.terminated.as_ref())
                .and_then(|t| t.finished_at.as_ref())
                .map(|t| t.0);

            let progressing = match last_transition {
                Some(t) => Utc::now() - t <= progressing_timeout(),
                None => true,
            };

            let mut c =
                synthetic_condition_error("Waiting", waiting.reason.as_deref().unwrap_or(""), "");
            c.condition.last_transition_time = last_transition;
            c.status.progressing = progressing;
            cond = Some(c);
        }

        if let Some(running) = cs.state.as_ref().and_then(|s| s.running.as_ref()) {
            let mut c = synthetic_condition_ok("Running", "");
            c.condition.last_transition_time = running.started_at.as_ref().map(|t| t.0);
            cond = Some(c);
        }

        if !cs.ready {
            cond = Some(synthetic_condition_error("Ready", "NotReady", ""));
        }

        if let Some(terminated) = cs.state.as_ref().and_then(|s| s.terminated.as_ref()) {
            cond = Some(synthetic_condition_error(
                "Terminated",
                terminated.reason.as_deref().unwrap_or(""),
                "",
            ));
        }

        let mut cond = cond?;

        if cond.status.result > Verdict::Ok {
            self.expand_with_logs(obj, &cs.name, &mut cond).await;
        }

        let container_obj = Arc::new(Object::synthetic("Container", "", &cs.name, Value::Null));
        Some(aggregate_result(container_obj, Vec::new(), vec![cond]))
    }

    /// Load the container's logs and append them to the condition message.
    async fn expand_with_logs(&self, obj: &Arc<Object>, container: &str, cond: &mut ConditionStatus) {
        let logs = match self.load_container_logs(obj, container).await {
            Ok(logs) => logs,
            Err(err) => format!("Error loading logs: {err:#}\n"),
        };

        if logs.is_empty() {
            return;
        }

        if !cond.condition.message.is_empty() {
            cond.condition.message.push('\n');
        }
        cond.condition.message.push_str("Logs:\n");
        cond.condition.message.push_str(&logs);
    }

    async fn load_container_logs(&self, obj: &Arc<Object>, container: &str) -> anyhow::Result<String> {
        let logobjs = self.e.load(&Query::pod_log(obj.clone(), container)).await?;

        Ok(logobjs
            .first()
            .and_then(|o| o.str_at("/log"))
            .unwrap_or_default()
            .to_string())
    }
}

pub(super) fn register(reg: &mut AnalyzerRegistry) {
    reg.register(|e| Arc::new(PodAnalyzer::new(e)));
}
