// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! k8health evaluates the health of Kubernetes resources.
//!
//! The core is the [`eval::Evaluator`]: given object references or queries,
//! it loads the relevant objects through a [`eval::Loader`], dispatches them
//! to kind-specific [`eval::Analyzer`]s and returns a tree of
//! [`status::ObjectStatus`] values with per-condition reasoning and
//! recursive drill-down into related sub-resources.

pub mod analyze;
pub mod eval;
pub mod kubernetes;
pub mod monitor;
pub mod print;
pub mod status;

use std::sync::Arc;

use anyhow::{Context, Result};

use analyze::default_registry;
use eval::Evaluator;
use kubernetes::ClusterLoader;

/// Create an evaluator backed by the cluster selected by the environment
/// (kubeconfig or in-cluster config), with the default analyzer set. The
/// main entry point for using k8health as a library.
pub async fn new_health_evaluator() -> Result<Arc<Evaluator>> {
    let loader = ClusterLoader::connect()
        .await
        .context("can't create cluster loader")?;
    Ok(Evaluator::new(
        default_registry().default_analyzers(),
        Box::new(loader),
    ))
}
