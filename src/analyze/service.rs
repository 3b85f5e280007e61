// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Service analyzer: aggregates the pods selected by the service.

use std::sync::Arc;

use async_trait::async_trait;

use super::pod::{PodAnalyzer, gk_pod};
use super::{AnalyzerRegistry, aggregate_result};
use crate::eval::{Analyzer, Eval, Query};
use crate::status::{GroupKind, Object, ObjectStatus};

fn gk_service() -> GroupKind {
    GroupKind::core("Service")
}

pub struct ServiceAnalyzer {
    e: Eval,
}

impl ServiceAnalyzer {
    pub fn new(e: Eval) -> Self {
        Self { e }
    }
}

#[async_trait]
impl Analyzer for ServiceAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == gk_service()
    }

    async fn analyze(&self, obj: &Arc<Object>) -> ObjectStatus {
        // Services use the flat equality selector form.
        let sub_statuses = match self
            .e
            .eval_query(
                &Query::label_equality(obj.clone(), gk_pod()),
                Some(Arc::new(PodAnalyzer::new(self.e.clone()))),
            )
            .await
        {
            Ok(subs) => subs,
            Err(err) => return ObjectStatus::unknown_with_error(obj.clone(), &err),
        };

        aggregate_result(obj.clone(), sub_statuses, Vec::new())
    }
}

pub(super) fn register(reg: &mut AnalyzerRegistry) {
    reg.register(|e| Arc::new(ServiceAnalyzer::new(e)));
}
