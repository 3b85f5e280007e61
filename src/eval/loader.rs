// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! The boundary between the evaluation engine and the cluster.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::matcher::GroupKindMatcher;
use crate::status::{GroupKind, GroupResource, GroupVersionKind, Object};

/// Abstract cluster accessor consumed by the evaluator.
///
/// Implementations must honor the special namespace tokens
/// [`NAMESPACE_ALL`](super::NAMESPACE_ALL) (all namespaces plus
/// cluster-scoped resources) and [`NAMESPACE_NONE`](super::NAMESPACE_NONE)
/// (cluster-scoped only) in `load`. All methods are expected to return
/// promptly when their future is dropped.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Fetch a fresh version of a single object.
    async fn get(&self, obj: &Object) -> Result<Arc<Object>>;

    /// Bulk-list all objects of the kinds selected by the matcher in the
    /// given namespace. `exclude` is an optimization hint listing kinds the
    /// caller already holds.
    async fn load(
        &self,
        ns: &str,
        matcher: &GroupKindMatcher,
        exclude: &[GroupKind],
    ) -> Result<Vec<Arc<Object>>>;

    /// Load a resource by group resource, namespace and name. An empty name
    /// lists all objects of the resource.
    async fn load_resource(
        &self,
        gr: &GroupResource,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<Arc<Object>>>;

    /// Load objects of a resource matching a label selector string.
    async fn load_resource_by_selector(
        &self,
        gr: &GroupResource,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Arc<Object>>>;

    /// Fetch the last `tail_lines` lines of a container's logs.
    async fn load_pod_logs(&self, obj: &Object, container: &str, tail_lines: i64)
    -> Result<Vec<u8>>;

    /// Translate a group resource to the corresponding group version kind.
    /// `None` when the cluster has no mapping for the resource.
    fn resource_to_kind(&self, gr: &GroupResource) -> Option<GroupVersionKind>;
}
