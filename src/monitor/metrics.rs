// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Prometheus exposition of evaluated statuses.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::gauge;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use super::TargetsStatusUpdate;
use crate::status::{Status, Verdict};

/// Gauge exposed per evaluated object.
const HEALTH_METRIC: &str = "kube_health_status";

/// Install the Prometheus exporter, serving `/metrics` on the given address.
pub fn install_exporter(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install metrics exporter")?;

    info!(addr = %addr, "metrics exporter listening");
    Ok(())
}

/// Record one polling cycle's statuses as gauges labelled by object
/// identity, status and category.
pub fn record_update(update: &TargetsStatusUpdate) {
    for target in &update.statuses {
        for status in &target.statuses {
            // Progressing overrides the status label; the result label keeps
            // the underlying verdict.
            let status_label = if status.status.progressing {
                "progressing".to_string()
            } else {
                status.status.result.as_str().to_lowercase()
            };

            gauge!(
                HEALTH_METRIC,
                "kind" => status.object.gvk().kind.clone(),
                "name" => status.object.name().to_string(),
                "namespace" => status.object.namespace().to_string(),
                "status" => status_label,
                "result" => status.status.result.as_str().to_lowercase(),
                "category" => target.target.category.clone(),
            )
            .set(result_value(&status.status));
        }
    }
}

/// Numeric representation of a verdict for the gauge value.
fn result_value(status: &Status) -> f64 {
    match status.result {
        Verdict::Ok => 0.0,
        Verdict::Warning => 1.0,
        Verdict::Error => 2.0,
        Verdict::Unknown => -1.0,
    }
}
