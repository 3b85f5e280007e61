// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Node analyzer.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    AnalyzerRegistry, aggregate_result, analyze_object_conditions, default_condition_analyzers,
    synthetic_condition_error,
};
use crate::eval::{Analyzer, Eval};
use crate::status::{GroupKind, Object, ObjectStatus};

fn gk_node() -> GroupKind {
    GroupKind::core("Node")
}

pub struct NodeAnalyzer {
    _e: Eval,
}

#[async_trait]
impl Analyzer for NodeAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == gk_node()
    }

    async fn analyze(&self, obj: &Arc<Object>) -> ObjectStatus {
        let mut conditions = match analyze_object_conditions(obj, &default_condition_analyzers()) {
            Ok(conds) => conds,
            Err(err) => return ObjectStatus::unknown_with_error(obj.clone(), &err),
        };

        if obj.bool_at("/spec/unschedulable").unwrap_or(false) {
            conditions.push(synthetic_condition_error(
                "Unschedulable",
                "Unschedulable",
                "Node is marked as unschedulable",
            ));
        }

        aggregate_result(obj.clone(), Vec::new(), conditions)
    }
}

pub(super) fn register(reg: &mut AnalyzerRegistry) {
    reg.register(|e| Arc::new(NodeAnalyzer { _e: e }));
}
