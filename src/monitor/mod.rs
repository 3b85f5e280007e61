// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Continuous monitoring: polls configured targets and exposes their health
//! as Prometheus metrics.

mod metrics;
mod poll;

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::status::GroupKind;

pub use metrics::{install_exporter, record_update};
pub use poll::{MonitorPoller, TargetStatuses, TargetsStatusUpdate, dedup};

/// One monitored set of kinds, labelled with a category in the exported
/// metrics.
#[derive(Debug, Clone)]
pub struct Target {
    pub category: String,
    pub kinds: Vec<GroupKind>,
}

/// Monitor configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub targets: Vec<Target>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    targets: Vec<RawTarget>,
}

#[derive(Debug, Deserialize)]
struct RawTarget {
    category: String,
    /// Kinds as `Kind` or `Kind.group` strings.
    kinds: Vec<String>,
}

impl Config {
    /// Read a YAML config of the shape:
    ///
    /// ```yaml
    /// targets:
    ///   - category: workloads
    ///     kinds: [Deployment.apps, StatefulSet.apps]
    ///   - category: cluster
    ///     kinds: [Node]
    /// ```
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(content)?;

        let mut targets = Vec::with_capacity(raw.targets.len());
        for target in raw.targets {
            if target.kinds.is_empty() {
                bail!("target {} has no kinds", target.category);
            }
            targets.push(Target {
                category: target.category,
                kinds: target.kinds.iter().map(|k| parse_group_kind(k)).collect(),
            });
        }

        Ok(Config { targets })
    }
}

/// Parse `Kind` or `Kind.group` into a GroupKind.
fn parse_group_kind(s: &str) -> GroupKind {
    match s.split_once('.') {
        Some((kind, group)) => GroupKind::new(group, kind),
        None => GroupKind::core(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let cfg = Config::parse(
            r#"
targets:
  - category: workloads
    kinds: [Deployment.apps, StatefulSet.apps]
  - category: cluster
    kinds: [Node]
"#,
        )
        .unwrap();

        assert_eq!(cfg.targets.len(), 2);
        assert_eq!(cfg.targets[0].category, "workloads");
        assert_eq!(
            cfg.targets[0].kinds[0],
            GroupKind::new("apps", "Deployment")
        );
        assert_eq!(cfg.targets[1].kinds[0], GroupKind::core("Node"));
    }

    #[test]
    fn test_parse_config_rejects_empty_kinds() {
        let err = Config::parse("targets: [{category: empty, kinds: []}]").unwrap_err();
        assert!(err.to_string().contains("no kinds"));
    }

    #[test]
    fn test_parse_group_kind() {
        assert_eq!(parse_group_kind("Node"), GroupKind::core("Node"));
        assert_eq!(
            parse_group_kind("Route.route.openshift.io"),
            GroupKind::new("route.openshift.io", "Route")
        );
    }

    #[test]
    fn test_read_missing_file() {
        let err = Config::read(Path::new("/nonexistent/monitor.yaml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn test_read_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("monitor.yaml");
        std::fs::write(
            &path,
            "targets:\n  - category: cluster\n    kinds: [Node, ClusterOperator.config.openshift.io]\n",
        )
        .unwrap();

        let cfg = Config::read(&path).unwrap();
        assert_eq!(cfg.targets.len(), 1);
        assert_eq!(cfg.targets[0].category, "cluster");
        assert_eq!(
            cfg.targets[0].kinds[1],
            GroupKind::new("config.openshift.io", "ClusterOperator")
        );
    }
}
