// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! The evaluation engine: queries, the preload cache and analyzer dispatch.

mod evaluator;
mod fake;
mod loader;
mod matcher;
mod poll;
mod query;

pub use evaluator::{Analyzer, AnalyzerInit, AnalyzerSet, Eval, Evaluator};
pub use fake::FakeLoader;
pub use loader::Loader;
pub use matcher::GroupKindMatcher;
pub use poll::{StatusPoller, StatusUpdate};
pub use query::{
    LOG_API_VERSION, NAMESPACE_ALL, NAMESPACE_NONE, Query, Selector, SelectorOperator,
    SelectorRequirement, SetSelector,
};
