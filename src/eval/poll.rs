// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Periodic re-evaluation of a fixed set of objects.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::evaluator::Evaluator;
use crate::status::{Object, ObjectStatus};

/// A batch of evaluation results from one polling cycle.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub statuses: Vec<ObjectStatus>,
}

/// Polls the status of a set of objects at a regular interval.
///
/// Each cycle resets the evaluator first so the cycle observes a consistent
/// snapshot with no state leaking from the previous one.
pub struct StatusPoller {
    interval: Duration,
    evaluator: Arc<Evaluator>,
    objects: Vec<Arc<Object>>,
}

impl StatusPoller {
    pub fn new(interval: Duration, evaluator: Arc<Evaluator>, objects: Vec<Arc<Object>>) -> Self {
        Self {
            interval,
            evaluator,
            objects,
        }
    }

    /// Start polling. Updates arrive on the returned channel; the channel
    /// closes when the receiver is dropped and the poller task ends.
    pub fn start(self) -> mpsc::Receiver<StatusUpdate> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            // Initial run, then one run per tick.
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

    async fn run(&self) -> StatusUpdate {
        self.evaluator.reset().await;

        let mut statuses = Vec::with_capacity(self.objects.len());
        for obj in &self.objects {
            statuses.push(self.evaluator.eval(obj).await);
        }

        StatusUpdate { statuses }
    }
}
