// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! The real cluster-backed [`Loader`].

mod client;
pub mod discovery;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::eval::{GroupKindMatcher, Loader};
use crate::status::{GroupKind, GroupResource, GroupVersionKind, Object};

pub use client::ClusterClient;
pub use discovery::{ApiResourceInfo, ResourceMap};

/// Loads objects from a live cluster through the dynamic API. Cheap to
/// clone; clones share the underlying client and discovery data.
#[derive(Clone)]
pub struct ClusterLoader {
    client: Arc<ClusterClient>,
}

impl ClusterLoader {
    /// Connect to the cluster selected by the environment (kubeconfig or
    /// in-cluster service account).
    pub async fn connect() -> Result<Self> {
        Ok(Self {
            client: Arc::new(ClusterClient::connect().await?),
        })
    }

    /// The discovered resources, for resolving command line type arguments.
    pub fn resources(&self) -> &ResourceMap {
        self.client.resources()
    }

    fn to_objects(values: Vec<Value>) -> Result<Vec<Arc<Object>>> {
        values
            .into_iter()
            .map(|value| Object::from_json(value).map(Arc::new))
            .collect()
    }

    fn resource_info(&self, gr: &GroupResource) -> Result<ApiResourceInfo> {
        self.client
            .resources()
            .get(gr)
            .cloned()
            .ok_or_else(|| anyhow!("no resource mapping for {gr}"))
    }
}

#[async_trait]
impl Loader for ClusterLoader {
    async fn get(&self, obj: &Object) -> Result<Arc<Object>> {
        let value = self.client.get(obj).await?;
        Ok(Arc::new(Object::from_json(value)?))
    }

    async fn load(
        &self,
        ns: &str,
        matcher: &GroupKindMatcher,
        exclude: &[GroupKind],
    ) -> Result<Vec<Arc<Object>>> {
        let targets = self.client.resources().matching(ns, matcher, exclude);
        let result = self.client.list_bulk(ns, &targets).await;

        let objects = Self::to_objects(result.objects)?;
        if let Some(err) = result.err {
            if objects.is_empty() {
                return Err(err);
            }
            // Keep what loaded; the missing kinds surface as Unknown
            // statuses downstream.
            warn!(namespace = %ns, error = format!("{err:#}"),
                "partial bulk list failure, continuing with partial results");
        }

        Ok(objects)
    }

    async fn load_resource(
        &self,
        gr: &GroupResource,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<Arc<Object>>> {
        let info = self.resource_info(gr)?;

        if !name.is_empty() {
            let value = self.client.get_resource(&info, namespace, name).await?;
            return Ok(vec![Arc::new(Object::from_json(value)?)]);
        }

        let values = self.client.list(&info, namespace).await?;
        Self::to_objects(values)
    }

    async fn load_resource_by_selector(
        &self,
        gr: &GroupResource,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Arc<Object>>> {
        let info = self.resource_info(gr)?;
        let values = self
            .client
            .list_with_selector(&info, namespace, label_selector)
            .await?;
        Self::to_objects(values)
    }

    async fn load_pod_logs(
        &self,
        obj: &Object,
        container: &str,
        tail_lines: i64,
    ) -> Result<Vec<u8>> {
        self.client
            .pod_logs(obj, container, tail_lines)
            .await
            .context("loading pod logs")
    }

    fn resource_to_kind(&self, gr: &GroupResource) -> Option<GroupVersionKind> {
        self.client.resources().resource_to_kind(gr)
    }
}
