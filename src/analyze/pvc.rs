// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! PersistentVolumeClaim analyzer. PVCs publish no conditions in the happy
//! path, so the binding state is surfaced as a synthetic condition.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    AnalyzerRegistry, aggregate_result, synthetic_condition_ok, synthetic_condition_progressing,
};
use crate::eval::{Analyzer, Eval};
use crate::status::{GroupKind, Object, ObjectStatus};

fn gk_pvc() -> GroupKind {
    GroupKind::core("PersistentVolumeClaim")
}

pub struct PvcAnalyzer {
    _e: Eval,
}

#[async_trait]
impl Analyzer for PvcAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == gk_pvc()
    }

    async fn analyze(&self, obj: &Arc<Object>) -> ObjectStatus {
        let phase = obj.str_at("/status/phase").unwrap_or_default();

        let condition = if phase == "Bound" {
            synthetic_condition_ok("Bound", "PVC is bound.")
        } else {
            synthetic_condition_progressing("NotBound", phase, "PVC is not bound.")
        };

        aggregate_result(obj.clone(), Vec::new(), vec![condition])
    }
}

pub(super) fn register(reg: &mut AnalyzerRegistry) {
    reg.register(|e| Arc::new(PvcAnalyzer { _e: e }));
}
