// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Resource discovery: maps group resources to their served kinds.
//!
//! Discovers all listable resources (including CRDs) at runtime using the
//! Kubernetes discovery API.

use std::collections::HashMap;

use anyhow::Result;
use kube::Client;
use kube::discovery::{Discovery, Scope, verbs};
use tracing::debug;

use crate::eval::{GroupKindMatcher, NAMESPACE_ALL, NAMESPACE_NONE};
use crate::status::{GroupKind, GroupResource, GroupVersionKind};

/// A discovered resource: its kind, endpoint name and scope.
#[derive(Debug, Clone)]
pub struct ApiResourceInfo {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub namespaced: bool,
}

impl ApiResourceInfo {
    pub fn group_resource(&self) -> GroupResource {
        GroupResource::new(&self.group, &self.plural)
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(&self.group, &self.kind)
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::new(&self.group, &self.version, &self.kind)
    }

    pub(crate) fn to_api_resource(&self) -> kube::discovery::ApiResource {
        kube::discovery::ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.gvk().api_version(),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }
}

/// All listable resources served by a cluster, indexed by group resource.
#[derive(Debug, Clone, Default)]
pub struct ResourceMap {
    by_gr: HashMap<GroupResource, ApiResourceInfo>,
}

impl ResourceMap {
    /// Query the API server for all served resources with the `list` verb.
    pub async fn discover(client: &Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;

        let mut map = ResourceMap::default();
        for group in discovery.groups() {
            for (ar, caps) in group.recommended_resources() {
                debug!(group = %ar.group, version = %ar.version, api = %ar.plural,
                    namespaced = caps.scope == Scope::Namespaced, "discovered api");

                if !caps.supports_operation(verbs::LIST) {
                    debug!(api = %ar.plural, "api does not support list, skipping");
                    continue;
                }

                map.insert(ApiResourceInfo {
                    group: ar.group.clone(),
                    version: ar.version.clone(),
                    kind: ar.kind.clone(),
                    plural: ar.plural.clone(),
                    namespaced: caps.scope == Scope::Namespaced,
                });
            }
        }

        Ok(map)
    }

    pub fn insert(&mut self, info: ApiResourceInfo) {
        self.by_gr.insert(info.group_resource(), info);
    }

    pub fn get(&self, gr: &GroupResource) -> Option<&ApiResourceInfo> {
        self.by_gr.get(gr)
    }

    pub fn resource_to_kind(&self, gr: &GroupResource) -> Option<GroupVersionKind> {
        self.get(gr).map(ApiResourceInfo::gvk)
    }

    /// Find the resource info for a group kind.
    pub fn by_group_kind(&self, gk: &GroupKind) -> Option<&ApiResourceInfo> {
        self.by_gr.values().find(|info| info.group_kind() == *gk)
    }

    /// Resolve a kubectl-style type argument (`pods`, `pod`, `deployment`,
    /// `deployments.apps`) to a resource.
    pub fn resolve_type(&self, name: &str) -> Option<&ApiResourceInfo> {
        let lower = name.to_lowercase();
        let (type_part, group_part) = match lower.split_once('.') {
            Some((t, g)) => (t.to_string(), Some(g.to_string())),
            None => (lower, None),
        };

        self.by_gr.values().find(|info| {
            if let Some(group) = &group_part
                && info.group != *group
            {
                return false;
            }
            let kind = info.kind.to_lowercase();
            type_part == info.plural || type_part == kind || type_part == format!("{kind}s")
        })
    }

    /// Resources selected by a namespace token and a matcher, minus explicit
    /// exclusions. `NAMESPACE_ALL` covers every resource, `NAMESPACE_NONE`
    /// cluster-scoped ones, anything else namespaced ones.
    pub fn matching(
        &self,
        ns: &str,
        matcher: &GroupKindMatcher,
        exclude: &[GroupKind],
    ) -> Vec<ApiResourceInfo> {
        self.by_gr
            .values()
            .filter(|info| match ns {
                NAMESPACE_ALL => true,
                NAMESPACE_NONE => !info.namespaced,
                _ => info.namespaced,
            })
            .filter(|info| matcher.matches(&info.group_kind()))
            .filter(|info| !exclude.contains(&info.group_kind()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(group: &str, kind: &str, plural: &str, namespaced: bool) -> ApiResourceInfo {
        ApiResourceInfo {
            group: group.to_string(),
            version: "v1".to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
            namespaced,
        }
    }

    fn sample_map() -> ResourceMap {
        let mut map = ResourceMap::default();
        map.insert(info("", "Pod", "pods", true));
        map.insert(info("", "Node", "nodes", false));
        map.insert(info("apps", "Deployment", "deployments", true));
        map.insert(info("rbac.authorization.k8s.io", "ClusterRole", "clusterroles", false));
        map
    }

    #[test]
    fn test_resource_to_kind() {
        let map = sample_map();
        let gvk = map
            .resource_to_kind(&GroupResource::new("apps", "deployments"))
            .unwrap();
        assert_eq!(gvk.kind, "Deployment");
        assert_eq!(gvk.api_version(), "apps/v1");
        assert!(map.resource_to_kind(&GroupResource::new("", "widgets")).is_none());
    }

    #[test]
    fn test_resolve_type() {
        let map = sample_map();
        assert_eq!(map.resolve_type("pods").unwrap().kind, "Pod");
        assert_eq!(map.resolve_type("pod").unwrap().kind, "Pod");
        assert_eq!(map.resolve_type("Deployment").unwrap().kind, "Deployment");
        assert_eq!(map.resolve_type("deployments.apps").unwrap().kind, "Deployment");
        assert!(map.resolve_type("deployments.batch").is_none());
        assert!(map.resolve_type("widgets").is_none());
    }

    #[test]
    fn test_matching_namespace_scopes() {
        let map = sample_map();
        let everything = GroupKindMatcher::all_except(vec![]);

        let all = map.matching(NAMESPACE_ALL, &everything, &[]);
        assert_eq!(all.len(), 4);

        let cluster: Vec<String> = map
            .matching(NAMESPACE_NONE, &everything, &[])
            .iter()
            .map(|i| i.kind.clone())
            .collect();
        assert_eq!(cluster.len(), 2);
        assert!(cluster.contains(&"Node".to_string()));

        let namespaced = map.matching("default", &everything, &[]);
        assert_eq!(namespaced.len(), 2);
        assert!(namespaced.iter().all(|i| i.namespaced));
    }

    #[test]
    fn test_matching_honors_matcher_and_exclusions() {
        let map = sample_map();
        let matcher = GroupKindMatcher::all_except(vec![GroupKind::core("Pod")]);
        let selected = map.matching("default", &matcher, &[]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].kind, "Deployment");

        let excluded = map.matching(
            "default",
            &GroupKindMatcher::all_except(vec![]),
            &[GroupKind::new("apps", "Deployment")],
        );
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].kind, "Pod");
    }
}
