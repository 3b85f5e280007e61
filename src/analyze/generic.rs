// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! The catch-all analyzer: condition analysis plus owner-reference traversal.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;

use super::{
    ConditionAnalyzer, aggregate_result, analyze_object_conditions, condition_status_progressing,
    condition_status_unknown_with_error, default_condition_analyzers, synthetic_condition,
};
use crate::eval::{Analyzer, Eval, GroupKindMatcher, Query};
use crate::status::{ConditionStatus, Object, ObjectStatus};

/// Generic analyzer applicable to any object: evaluates the object's
/// conditions and recurses into sub-objects found via owner references.
pub struct GenericAnalyzer {
    e: Eval,
    condition_analyzers: Vec<Arc<dyn ConditionAnalyzer>>,
}

impl GenericAnalyzer {
    pub fn new(e: Eval) -> Self {
        Self {
            e,
            condition_analyzers: default_condition_analyzers(),
        }
    }
}

#[async_trait]
impl Analyzer for GenericAnalyzer {
    fn supports(&self, _obj: &Object) -> bool {
        true
    }

    async fn analyze(&self, obj: &Arc<Object>) -> ObjectStatus {
        let query = match generic_owner_query(&self.e, obj) {
            Ok(query) => query,
            Err(err) => return ObjectStatus::unknown_with_error(obj.clone(), &err),
        };
        let sub_statuses = match self.e.eval_query(&query, None).await {
            Ok(subs) => subs,
            Err(err) => return ObjectStatus::unknown_with_error(obj.clone(), &err),
        };

        if !obj.has_status() && sub_statuses.is_empty() {
            // Objects without a status block are considered OK by default.
            return ObjectStatus::ok(obj.clone(), sub_statuses);
        }

        let mut conditions = analyze_observed_generation(obj);

        match analyze_object_conditions(obj, &self.condition_analyzers) {
            Ok(conds) => conditions.extend(conds),
            Err(err) => {
                return ObjectStatus::unknown_with_error(
                    obj.clone(),
                    &err.context("error analyzing conditions"),
                );
            }
        }

        aggregate_result(obj.clone(), sub_statuses, conditions)
    }
}

/// Owner query covering every kind except the registered ignored ones.
pub fn generic_owner_query(e: &Eval, obj: &Arc<Object>) -> Result<Query> {
    let ignored = e.ignored_kinds().context("building owner query")?;
    Ok(Query::owner(
        obj.clone(),
        GroupKindMatcher::all_except(ignored.to_vec()),
    ))
}

/// Synthesize a condition when the controller has not caught up with the
/// latest change yet (`status.observedGeneration` behind
/// `metadata.generation`).
pub fn analyze_observed_generation(obj: &Object) -> Vec<ConditionStatus> {
    let Some(value) = obj.at("/status/observedGeneration") else {
        return Vec::new();
    };

    let Some(observed) = value.as_i64() else {
        return vec![condition_status_unknown_with_error(
            synthetic_condition("ObservedGeneration", false, "", ""),
            &anyhow!("status.observedGeneration is not an integer"),
        )];
    };

    if observed < obj.generation() {
        return vec![condition_status_progressing(synthetic_condition(
            "ObservedGeneration",
            false,
            "Outdated",
            &format!(
                "Observed generation {} is less than desired generation {}",
                observed,
                obj.generation()
            ),
        ))];
    }

    Vec::new()
}
