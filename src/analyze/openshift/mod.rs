// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Analyzers for OpenShift and OLM resources. Registered through the same
//! explicit builder as the core analyzers.

mod clusteroperator;
mod mco;
mod olm;
mod route;

use super::AnalyzerRegistry;

pub use clusteroperator::ClusterOperatorAnalyzer;
pub use mco::McoAnalyzer;
pub use olm::{OlmCsvAnalyzer, OlmInstallPlanAnalyzer, OlmSubscriptionAnalyzer};
pub use route::RouteAnalyzer;

pub fn register(reg: &mut AnalyzerRegistry) {
    clusteroperator::register(reg);
    olm::register(reg);
    route::register(reg);
    mco::register(reg);
}
