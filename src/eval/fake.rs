// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! An in-memory [`Loader`] serving registered fixtures. Used in tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value;

use super::loader::Loader;
use super::matcher::GroupKindMatcher;
use super::query::{NAMESPACE_ALL, NAMESPACE_NONE};
use crate::status::{GroupKind, GroupResource, GroupVersionKind, Object};

/// Mocks the data to be loaded for the evaluator.
pub struct FakeLoader {
    state: Mutex<FakeState>,
    /// Replaces every timestamp in registered fixtures. Tests mostly assert
    /// on relative ages, so all times are pinned to now minus 24 hours to
    /// keep them stable.
    base_time: DateTime<Utc>,
    load_calls: Arc<Mutex<usize>>,
}

#[derive(Default)]
struct FakeState {
    objects: Vec<Arc<Object>>,
    pod_logs: HashMap<String, String>,
    resource_kinds: HashMap<GroupResource, GroupVersionKind>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            base_time: Utc::now() - Duration::hours(24),
            load_calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Register raw object payloads. Every RFC3339 timestamp string in the
    /// payloads is rewritten to the loader's base time.
    pub fn register(
        &self,
        objects: impl IntoIterator<Item = Value>,
    ) -> Result<Vec<Arc<Object>>> {
        let mut st = self.state.lock().unwrap();
        let mut ret = Vec::new();
        for mut data in objects {
            rewrite_times(&mut data, self.base_time);
            let obj = Arc::new(Object::from_json(data)?);
            if obj.uid().is_empty() {
                bail!("object {} has no UID provided", obj.full_name());
            }
            st.objects.push(obj.clone());
            ret.push(obj);
        }
        Ok(ret)
    }

    /// Register fixtures from a YAML document holding a Kubernetes-style
    /// `List` (or a bare sequence of objects).
    pub fn register_yaml(&self, yaml: &str) -> Result<Vec<Arc<Object>>> {
        let doc: Value = serde_yaml::from_str(yaml)?;
        let items = match &doc {
            Value::Array(items) => items.clone(),
            Value::Object(map) => match map.get("items") {
                Some(Value::Array(items)) => items.clone(),
                _ => bail!("expected a list of objects or an object with items"),
            },
            _ => bail!("expected a list of objects or an object with items"),
        };
        self.register(items)
    }

    pub fn register_pod_logs(&self, namespace: &str, pod: &str, container: &str, logs: &str) {
        self.state
            .lock()
            .unwrap()
            .pod_logs
            .insert(log_key(namespace, pod, container), logs.to_string());
    }

    /// Register a resource-to-kind mapping, for analyzers that resolve
    /// group resources (e.g. ClusterOperator related objects).
    pub fn register_resource_kind(&self, gr: GroupResource, gvk: GroupVersionKind) {
        self.state.lock().unwrap().resource_kinds.insert(gr, gvk);
    }

    /// Shared counter of `load` invocations, for asserting that each
    /// namespace is listed once per matcher.
    pub fn load_calls(&self) -> Arc<Mutex<usize>> {
        self.load_calls.clone()
    }
}

impl Default for FakeLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Loader for FakeLoader {
    async fn get(&self, obj: &Object) -> Result<Arc<Object>> {
        let st = self.state.lock().unwrap();
        st.objects
            .iter()
            .find(|o| o.uid() == obj.uid())
            .cloned()
            .ok_or_else(|| anyhow!("object {} not found", obj.full_name()))
    }

    async fn load(
        &self,
        ns: &str,
        matcher: &GroupKindMatcher,
        _exclude: &[GroupKind],
    ) -> Result<Vec<Arc<Object>>> {
        *self.load_calls.lock().unwrap() += 1;
        let st = self.state.lock().unwrap();
        Ok(st
            .objects
            .iter()
            .filter(|o| match ns {
                NAMESPACE_ALL => true,
                NAMESPACE_NONE => o.namespace().is_empty(),
                _ => o.namespace() == ns,
            })
            .filter(|o| matcher.matches(&o.group_kind()))
            .cloned()
            .collect())
    }

    async fn load_resource(
        &self,
        gr: &GroupResource,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<Arc<Object>>> {
        let st = self.state.lock().unwrap();
        // Matching by group, namespace and name is close enough for test
        // fixtures; the kind is not compared.
        Ok(st
            .objects
            .iter()
            .filter(|o| {
                o.gvk().group == gr.group
                    && o.namespace() == namespace
                    && (name.is_empty() || o.name() == name)
            })
            .cloned()
            .collect())
    }

    async fn load_resource_by_selector(
        &self,
        _gr: &GroupResource,
        _namespace: &str,
        _label_selector: &str,
    ) -> Result<Vec<Arc<Object>>> {
        Ok(Vec::new())
    }

    async fn load_pod_logs(
        &self,
        obj: &Object,
        container: &str,
        _tail_lines: i64,
    ) -> Result<Vec<u8>> {
        let st = self.state.lock().unwrap();
        let logs = st
            .pod_logs
            .get(&log_key(obj.namespace(), obj.name(), container))
            .cloned()
            .unwrap_or_default();
        Ok(logs.into_bytes())
    }

    fn resource_to_kind(&self, gr: &GroupResource) -> Option<GroupVersionKind> {
        let st = self.state.lock().unwrap();
        Some(st.resource_kinds.get(gr).cloned().unwrap_or_else(|| {
            // No mapping registered: echo the group back with an empty kind,
            // which never collides with real ignored kinds.
            GroupVersionKind::new(&gr.group, "", "")
        }))
    }
}

fn log_key(namespace: &str, pod: &str, container: &str) -> String {
    format!("{namespace}-{pod}-{container}")
}

/// Replace every string value parseable as RFC3339 with the given time.
fn rewrite_times(value: &mut Value, t: DateTime<Utc>) {
    match value {
        Value::String(s) => {
            if DateTime::parse_from_rfc3339(s).is_ok() {
                *s = t.to_rfc3339_opts(SecondsFormat::Secs, true);
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite_times(item, t);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                rewrite_times(item, t);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_requires_uid() {
        let loader = FakeLoader::new();
        let err = loader
            .register([json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": "p"}
            })])
            .unwrap_err();
        assert!(err.to_string().contains("no UID"));
    }

    #[test]
    fn test_register_rewrites_timestamps() {
        let loader = FakeLoader::new();
        let objs = loader
            .register([json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"name": "p", "uid": "u",
                             "creationTimestamp": "2021-01-01T00:00:00Z"},
                "status": {"conditions": [
                    {"type": "Ready", "status": "True",
                     "lastTransitionTime": "2021-06-01T12:30:00Z"}
                ]}
            })])
            .unwrap();
        let ts = objs[0].str_at("/metadata/creationTimestamp").unwrap();
        let parsed = DateTime::parse_from_rfc3339(ts).unwrap();
        let age = Utc::now() - parsed.with_timezone(&Utc);
        assert!(age > Duration::hours(23) && age < Duration::hours(25));
        // Non-timestamp strings stay untouched.
        assert_eq!(objs[0].str_at("/kind"), Some("Pod"));
    }

    #[tokio::test]
    async fn test_load_namespace_scoping() {
        let loader = FakeLoader::new();
        loader
            .register([
                json!({"apiVersion": "v1", "kind": "Pod",
                       "metadata": {"name": "p", "namespace": "ns", "uid": "u1"}}),
                json!({"apiVersion": "v1", "kind": "Node",
                       "metadata": {"name": "n", "uid": "u2"}}),
            ])
            .unwrap();

        let everything = GroupKindMatcher::all_except(vec![]);
        let all = loader.load(NAMESPACE_ALL, &everything, &[]).await.unwrap();
        assert_eq!(all.len(), 2);

        let cluster_only = loader.load(NAMESPACE_NONE, &everything, &[]).await.unwrap();
        assert_eq!(cluster_only.len(), 1);
        assert_eq!(cluster_only[0].name(), "n");

        let ns_only = loader.load("ns", &everything, &[]).await.unwrap();
        assert_eq!(ns_only.len(), 1);
        assert_eq!(ns_only[0].name(), "p");
    }

    #[test]
    fn test_register_yaml_list() {
        let loader = FakeLoader::new();
        let objs = loader
            .register_yaml(
                r#"
apiVersion: v1
kind: List
items:
  - apiVersion: v1
    kind: Pod
    metadata:
      name: p1
      namespace: default
      uid: uid-p1
"#,
            )
            .unwrap();
        assert_eq!(objs.len(), 1);
        assert_eq!(objs[0].name(), "p1");
    }
}
