// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "k8health")]
#[command(author, version, about = "Monitor Kubernetes resource health")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Resources to evaluate, as TYPE or TYPE/NAME (e.g. "pods",
    /// "deployment/web", "clusteroperators")
    pub resources: Vec<String>,

    /// Namespace to evaluate in
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Evaluate across all namespaces
    #[arg(short = 'A', long)]
    pub all_namespaces: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "tree-color", global = true)]
    pub output: OutputFormat,

    /// Show details for all objects, including those with OK status
    #[arg(short = 'H', long, global = true)]
    pub show_healthy: bool,

    /// For each object, show the API group it belongs to
    #[arg(short = 'G', long, global = true)]
    pub show_group: bool,

    /// Wait until resources finish progressing (regardless of the result)
    #[arg(short = 'W', long)]
    pub wait_progress: bool,

    /// Wait until the resources are ready (success only)
    #[arg(short = 'O', long)]
    pub wait_ok: bool,

    /// Keep re-evaluating forever
    #[arg(short = 'F', long)]
    pub wait_forever: bool,

    /// Re-evaluation interval in seconds when waiting
    #[arg(short, long, default_value_t = 2)]
    pub interval: u64,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Poll configured targets and expose their health via Prometheus
    Monitor {
        /// Path to the monitor configuration file
        #[arg(short, long)]
        config: std::path::PathBuf,

        /// Refresh interval in seconds
        #[arg(short, long, default_value_t = 30)]
        interval: u64,

        /// Host to bind the metrics server to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind the metrics server to
        #[arg(long, default_value_t = 8080)]
        port: u16,

        /// Print the status once and exit instead of serving metrics
        #[arg(long)]
        print_only: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    Tree,
    #[default]
    #[value(name = "tree-color")]
    TreeColor,
    Json,
    Yaml,
}
