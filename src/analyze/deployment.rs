// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Deployment analyzer: evaluates the owned ReplicaSets through the label
//! selector and refines the Deployment's own `Progressing` condition based
//! on their state.

use std::sync::Arc;

use async_trait::async_trait;

use super::replicaset::{ReplicaSetAnalyzer, gk_replicaset};
use super::{
    AnalyzerRegistry, ConditionAnalyzer, aggregate_result, analyze_object_conditions,
    condition_status_error, default_condition_analyzers,
};
use crate::eval::{Analyzer, Eval, Query};
use crate::status::{
    Condition, ConditionStatus, ConditionValue, GroupKind, Object, ObjectStatus, Verdict,
    get_condition_mut,
};

fn gk_deployment() -> GroupKind {
    GroupKind::new("apps", "Deployment")
}

pub struct DeploymentAnalyzer {
    e: Eval,
}

impl DeploymentAnalyzer {
    pub fn new(e: Eval) -> Self {
        Self { e }
    }
}

#[async_trait]
impl Analyzer for DeploymentAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == gk_deployment()
    }

    async fn analyze(&self, obj: &Arc<Object>) -> ObjectStatus {
        let mut sub_statuses = match self
            .e
            .eval_query(
                &Query::label_set_based(obj.clone(), gk_replicaset()),
                Some(Arc::new(ReplicaSetAnalyzer::new(self.e.clone()))),
            )
            .await
        {
            Ok(subs) => subs,
            Err(err) => return ObjectStatus::unknown_with_error(obj.clone(), &err),
        };

        let mut analyzers: Vec<Arc<dyn ConditionAnalyzer>> =
            vec![Arc::new(deployment_condition_analyzer)];
        analyzers.extend(default_condition_analyzers());

        let mut conditions = match analyze_object_conditions(obj, &analyzers) {
            Ok(conds) => conds,
            Err(err) => return ObjectStatus::unknown_with_error(obj.clone(), &err),
        };

        // ReplicaSets scaled down to zero are rollout leftovers.
        sub_statuses.retain(|s| s.object.i64_at("/spec/replicas") != Some(0));

        // More precise progress detection based on the ReplicaSets' state:
        // with every surviving ReplicaSet settled and healthy, the rollout
        // is done no matter what the Progressing condition claims.
        if let Some(progressing) = get_condition_mut(&mut conditions, "Progressing") {
            let all_done = !sub_statuses.is_empty()
                && sub_statuses
                    .iter()
                    .all(|s| s.status.result == Verdict::Ok && !s.status.progressing);
            if all_done {
                progressing.status.progressing = false;
                progressing.status.result = Verdict::Ok;
            }
        }

        aggregate_result(obj.clone(), sub_statuses, conditions)
    }
}

fn deployment_condition_analyzer(cond: &Condition) -> Option<ConditionStatus> {
    if cond.type_ == "Progressing" && cond.reason == "ProgressDeadlineExceeded" {
        return Some(condition_status_error(cond.clone()));
    }

    if cond.type_ == "Available" && cond.status == ConditionValue::False {
        return Some(condition_status_error(cond.clone()));
    }

    None
}

pub(super) fn register(reg: &mut AnalyzerRegistry) {
    reg.register(|e| Arc::new(DeploymentAnalyzer::new(e)));
}
