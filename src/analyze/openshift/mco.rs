// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! MultiClusterObservability analyzer.

use std::sync::Arc;

use async_trait::async_trait;

use crate::analyze::{
    AnalyzerRegistry, aggregate_result, analyze_object_conditions, default_condition_analyzers,
    generic_owner_query,
};
use crate::eval::{Analyzer, Eval, Query};
use crate::status::{GroupKind, Object, ObjectStatus};

fn gk_mco() -> GroupKind {
    GroupKind::new(
        "observability.open-cluster-management.io",
        "MultiClusterObservability",
    )
}

/// The MCO object is cluster-scoped but its operands live here.
const MCO_NAMESPACE: &str = "open-cluster-management-observability";

pub struct McoAnalyzer {
    e: Eval,
}

#[async_trait]
impl Analyzer for McoAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == gk_mco()
    }

    async fn analyze(&self, obj: &Arc<Object>) -> ObjectStatus {
        let query = match generic_owner_query(&self.e, obj) {
            Ok(Query::Owner {
                object, matcher, ..
            }) => Query::owner_in_namespace(object, matcher, MCO_NAMESPACE),
            Ok(other) => other,
            Err(err) => return ObjectStatus::unknown_with_error(obj.clone(), &err),
        };

        let sub_statuses = match self.e.eval_query(&query, None).await {
            Ok(subs) => subs,
            Err(err) => return ObjectStatus::unknown_with_error(obj.clone(), &err),
        };

        let conditions = match analyze_object_conditions(obj, &default_condition_analyzers()) {
            Ok(conds) => conds,
            Err(err) => return ObjectStatus::unknown_with_error(obj.clone(), &err),
        };

        aggregate_result(obj.clone(), sub_statuses, conditions)
    }
}

pub(super) fn register(reg: &mut AnalyzerRegistry) {
    reg.register(|e| Arc::new(McoAnalyzer { e }));
}
