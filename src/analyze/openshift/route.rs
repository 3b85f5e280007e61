// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! OpenShift Route analyzer: conditions live per ingress under
//! `status.ingress[].conditions` instead of the usual place.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::analyze::{
    AnalyzerRegistry, ConditionAnalyzer, GenericConditionAnalyzer, aggregate_result,
    analyze_raw_conditions, string_matchers,
};
use crate::eval::{Analyzer, Eval};
use crate::status::{GroupKind, Object, ObjectStatus};

fn gk_route() -> GroupKind {
    GroupKind::new("route.openshift.io", "Route")
}

pub struct RouteAnalyzer {
    _e: Eval,
}

#[async_trait]
impl Analyzer for RouteAnalyzer {
    fn supports(&self, obj: &Object) -> bool {
        obj.group_kind() == gk_route()
    }

    async fn analyze(&self, obj: &Arc<Object>) -> ObjectStatus {
        let mut conditions = Vec::new();

        let admitted = Arc::new(GenericConditionAnalyzer {
            conditions: string_matchers(&["Admitted"]),
            ..Default::default()
        }) as Arc<dyn ConditionAnalyzer>;

        let ingresses = match obj.at("/status/ingress") {
            Some(Value::Array(ingresses)) => ingresses.as_slice(),
            _ => &[],
        };

        for ingress in ingresses {
            let Some(Value::Array(data)) = ingress.pointer("/conditions") else {
                continue;
            };

            match analyze_raw_conditions(data, std::slice::from_ref(&admitted)) {
                Ok(analyzed) => conditions.extend(analyzed),
                Err(err) => return ObjectStatus::unknown_with_error(obj.clone(), &err),
            }
        }

        aggregate_result(obj.clone(), Vec::new(), conditions)
    }
}

pub(super) fn register(reg: &mut AnalyzerRegistry) {
    reg.register(|e| Arc::new(RouteAnalyzer { _e: e }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::default_registry;
    use crate::eval::{Evaluator, FakeLoader};
    use crate::status::Verdict;
    use serde_json::json;

    fn route(name: &str, uid: &str, admitted: &str) -> serde_json::Value {
        json!({
            "apiVersion": "route.openshift.io/v1",
            "kind": "Route",
            "metadata": {"name": name, "namespace": "default", "uid": uid},
            "status": {"ingress": [{
                "host": "example.test",
                "conditions": [{"type": "Admitted", "status": admitted}]
            }]}
        })
    }

    #[tokio::test]
    async fn test_admitted_route_is_ok() {
        let loader = FakeLoader::new();
        let objs = loader.register([route("r1", "u1", "True")]).unwrap();
        let obj = objs[0].clone();
        let e = Evaluator::new(default_registry().default_analyzers(), Box::new(loader));

        let st = e.eval(&obj).await;
        assert_eq!(st.status.result, Verdict::Ok);
        assert_eq!(st.conditions.len(), 1);
        assert_eq!(st.conditions[0].condition.type_, "Admitted");
    }

    #[tokio::test]
    async fn test_rejected_route_is_error() {
        let loader = FakeLoader::new();
        let objs = loader.register([route("r2", "u2", "False")]).unwrap();
        let obj = objs[0].clone();
        let e = Evaluator::new(default_registry().default_analyzers(), Box::new(loader));

        let st = e.eval(&obj).await;
        assert_eq!(st.status.result, Verdict::Error);
    }

    #[tokio::test]
    async fn test_route_without_ingress_is_unknown() {
        let loader = FakeLoader::new();
        let objs = loader
            .register([json!({
                "apiVersion": "route.openshift.io/v1",
                "kind": "Route",
                "metadata": {"name": "r3", "namespace": "default", "uid": "u3"},
                "status": {}
            })])
            .unwrap();
        let obj = objs[0].clone();
        let e = Evaluator::new(default_registry().default_analyzers(), Box::new(loader));

        let st = e.eval(&obj).await;
        assert_eq!(st.status.result, Verdict::Unknown);
    }
}
