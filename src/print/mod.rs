// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Rendering of status trees for terminal and machine consumption.

mod kubectl;
mod tree;

pub use kubectl::{KubectlFormat, render_kubectl};
pub use tree::{PrintOptions, TreePrinter};
