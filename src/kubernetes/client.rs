// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Thin wrapper over the kube dynamic API: paginated lists, the parallel
//! bulk list fan-out, single gets and pod log fetches.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures::future::join_all;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DynamicObject, ListParams, LogParams};
use kube::{Client, Config};
use serde_json::Value;
use tracing::{debug, warn};

use super::discovery::{ApiResourceInfo, ResourceMap};
use crate::eval::{NAMESPACE_ALL, NAMESPACE_NONE};
use crate::status::Object;

/// Timeout for connecting to the K8s API.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for reading K8s API responses.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for list requests.
const LIST_PAGE_SIZE: u32 = 250;

/// Result of a bulk list: whatever was loaded, plus the first error when any
/// of the parallel lists failed.
pub(crate) struct BulkListResult {
    pub objects: Vec<Value>,
    pub err: Option<anyhow::Error>,
}

/// Client for a single cluster, with the discovered resource map attached.
pub struct ClusterClient {
    client: Client,
    resources: ResourceMap,
}

impl ClusterClient {
    /// Connect using the inferred configuration (kubeconfig or in-cluster)
    /// and discover the served resources.
    pub async fn connect() -> Result<Self> {
        let mut config = Config::infer()
            .await
            .context("failed to infer kube configuration")?;
        config.connect_timeout = Some(CONNECT_TIMEOUT);
        config.read_timeout = Some(READ_TIMEOUT);

        let client = Client::try_from(config).context("failed to create kube client")?;
        let resources = ResourceMap::discover(&client)
            .await
            .context("failed to query api discovery")?;

        Ok(Self { client, resources })
    }

    pub fn resources(&self) -> &ResourceMap {
        &self.resources
    }

    fn api_for(&self, info: &ApiResourceInfo, ns: &str) -> Api<DynamicObject> {
        let ar = info.to_api_resource();
        if info.namespaced && ns != NAMESPACE_ALL && ns != NAMESPACE_NONE {
            Api::namespaced_with(self.client.clone(), ns, &ar)
        } else {
            Api::all_with(self.client.clone(), &ar)
        }
    }

    /// List all objects of one resource, following pagination.
    pub(crate) async fn list(&self, info: &ApiResourceInfo, ns: &str) -> Result<Vec<Value>> {
        let api = self.api_for(info, ns);
        let mut out = Vec::new();
        let mut continue_token: Option<String> = None;

        loop {
            let mut params = ListParams::default().limit(LIST_PAGE_SIZE);
            params.continue_token = continue_token.clone();

            let page = api
                .list(&params)
                .await
                .with_context(|| format!("listing resources failed ({})", info.group_resource()))?;

            for item in page.items {
                out.push(dynamic_to_value(item, info)?);
            }

            continue_token = page.metadata.continue_.filter(|token| !token.is_empty());
            if continue_token.is_none() {
                break;
            }
        }

        Ok(out)
    }

    /// List several resources in parallel and merge the results. Failures
    /// are collapsed to the first observed error; partial results are kept.
    pub(crate) async fn list_bulk(&self, ns: &str, targets: &[ApiResourceInfo]) -> BulkListResult {
        if targets.is_empty() {
            return BulkListResult {
                objects: Vec::new(),
                err: None,
            };
        }

        debug!(count = targets.len(), namespace = %ns, "starting to query resources");

        let results = join_all(targets.iter().map(|info| self.list(info, ns))).await;

        let mut objects = Vec::new();
        let mut err = None;
        for result in results {
            match result {
                Ok(items) => objects.extend(items),
                Err(e) => {
                    if err.is_none() {
                        err = Some(e);
                    } else {
                        warn!(error = format!("{e:#}"), "additional bulk list failure");
                    }
                }
            }
        }

        debug!(objects = objects.len(), error = err.is_some(), "query results");
        BulkListResult { objects, err }
    }

    pub(crate) async fn list_with_selector(
        &self,
        info: &ApiResourceInfo,
        ns: &str,
        label_selector: &str,
    ) -> Result<Vec<Value>> {
        let api = self.api_for(info, ns);
        let params = ListParams::default().labels(label_selector);
        let list = api.list(&params).await.with_context(|| {
            format!(
                "listing resources with selector {} failed ({})",
                label_selector,
                info.group_resource()
            )
        })?;

        list.items
            .into_iter()
            .map(|item| dynamic_to_value(item, info))
            .collect()
    }

    pub(crate) async fn get(&self, obj: &Object) -> Result<Value> {
        let gk = obj.group_kind();
        let info = self
            .resources
            .by_group_kind(&gk)
            .ok_or_else(|| anyhow!("no resource mapping for {gk}"))?;

        let item = self
            .api_for(info, obj.namespace())
            .get(obj.name())
            .await
            .with_context(|| format!("getting {} failed", obj.full_name()))?;

        dynamic_to_value(item, info)
    }

    pub(crate) async fn get_resource(
        &self,
        info: &ApiResourceInfo,
        ns: &str,
        name: &str,
    ) -> Result<Value> {
        let item = self
            .api_for(info, ns)
            .get(name)
            .await
            .with_context(|| format!("getting {}/{} failed", info.group_resource(), name))?;

        dynamic_to_value(item, info)
    }

    pub(crate) async fn pod_logs(
        &self,
        obj: &Object,
        container: &str,
        tail_lines: i64,
    ) -> Result<Vec<u8>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), obj.namespace());
        let params = LogParams {
            container: Some(container.to_string()),
            follow: false,
            previous: false,
            tail_lines: Some(tail_lines),
            ..LogParams::default()
        };

        let logs = api
            .logs(obj.name(), &params)
            .await
            .with_context(|| format!("fetching logs of {}/{container} failed", obj.full_name()))?;

        Ok(logs.into_bytes())
    }
}

/// Serialize a dynamic object into a raw payload. The list API does not
/// include apiVersion and kind per item, so they are injected from the
/// resource info.
fn dynamic_to_value(item: DynamicObject, info: &ApiResourceInfo) -> Result<Value> {
    let mut value = serde_json::to_value(item).context("serializing object failed")?;
    if let Value::Object(map) = &mut value {
        map.insert(
            "apiVersion".to_string(),
            Value::String(info.gvk().api_version()),
        );
        map.insert("kind".to_string(), Value::String(info.kind.clone()));
    }
    Ok(value)
}
