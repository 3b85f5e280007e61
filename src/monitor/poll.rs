// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Periodic evaluation of the configured monitor targets.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Config, Target};
use crate::eval::{Evaluator, GroupKindMatcher, NAMESPACE_ALL, Query, StatusUpdate};
use crate::status::ObjectStatus;

/// Statuses evaluated for one configured target.
#[derive(Debug, Clone)]
pub struct TargetStatuses {
    pub target: Target,
    pub statuses: Vec<ObjectStatus>,
}

/// One polling cycle's results across all targets.
#[derive(Debug, Clone, Default)]
pub struct TargetsStatusUpdate {
    pub statuses: Vec<TargetStatuses>,
}

impl TargetsStatusUpdate {
    pub fn to_status_update(&self) -> StatusUpdate {
        StatusUpdate {
            statuses: self
                .statuses
                .iter()
                .flat_map(|target| target.statuses.iter().cloned())
                .collect(),
        }
    }
}

/// Polls the status of the configured targets at a regular interval.
pub struct MonitorPoller {
    interval: Duration,
    evaluator: Arc<Evaluator>,
    cfg: Config,
}

impl MonitorPoller {
    pub fn new(interval: Duration, evaluator: Arc<Evaluator>, cfg: Config) -> Self {
        Self {
            interval,
            evaluator,
            cfg,
        }
    }

    /// Start polling. The channel closes when the receiver is dropped.
    pub fn start(self) -> mpsc::Receiver<TargetsStatusUpdate> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            loop {
                let update = self.run().await;
                if tx.send(update).await.is_err() {
                    return;
                }
                tokio::time::sleep(self.interval).await;
            }
        });
        rx
    }

    async fn run(&self) -> TargetsStatusUpdate {
        // Clear the cache from the previous cycle.
        self.evaluator.reset().await;

        info!("reloading health data");
        let start = std::time::Instant::now();

        let mut statuses = Vec::with_capacity(self.cfg.targets.len());
        for target in &self.cfg.targets {
            let query = Query::kind(
                NAMESPACE_ALL,
                GroupKindMatcher {
                    included: target.kinds.clone(),
                    ..Default::default()
                },
            );
            match self.evaluator.eval_query(&query, None).await {
                Ok(target_statuses) => {
                    debug!(category = %target.category, objects = target_statuses.len(),
                        "evaluated target");
                    statuses.push(TargetStatuses {
                        target: target.clone(),
                        statuses: target_statuses,
                    });
                }
                Err(err) => {
                    warn!(category = %target.category, error = format!("{err:#}"),
                        "failed to evaluate target");
                }
            }
        }

        info!(duration = ?start.elapsed(), "health data reloaded");

        TargetsStatusUpdate { statuses }
    }
}

/// Drop top-level statuses for objects that already appear as a sub-object
/// of another status in the update, so overlapping targets (say Deployments
/// and ReplicaSets) do not double-report.
pub fn dedup(update: TargetsStatusUpdate) -> TargetsStatusUpdate {
    let mut seen: HashSet<String> = HashSet::new();
    for target in &update.statuses {
        for status in &target.statuses {
            for uid in sub_object_uids(status) {
                seen.insert(uid);
            }
        }
    }

    let statuses = update
        .statuses
        .into_iter()
        .map(|target| TargetStatuses {
            statuses: target
                .statuses
                .into_iter()
                .filter(|s| !seen.contains(s.object.uid()))
                .collect(),
            target: target.target,
        })
        .collect();

    TargetsStatusUpdate { statuses }
}

/// UIDs of all sub-objects in the status tree, the root excluded.
fn sub_object_uids(status: &ObjectStatus) -> Vec<String> {
    let mut uids = Vec::new();
    let mut level: Vec<&ObjectStatus> = status.sub_statuses.iter().collect();

    while !level.is_empty() {
        let mut next = Vec::new();
        for sub in level {
            uids.push(sub.object.uid().to_string());
            next.extend(sub.sub_statuses.iter());
        }
        level = next;
    }

    uids
}
