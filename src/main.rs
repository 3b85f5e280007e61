// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use clap::Parser;

use cli::{Args, Command, OutputFormat};
use k8health::analyze::default_registry;
use k8health::eval::{Evaluator, Loader, NAMESPACE_ALL, StatusPoller};
use k8health::kubernetes::ClusterLoader;
use k8health::monitor;
use k8health::print::{KubectlFormat, PrintOptions, TreePrinter, render_kubectl};
use k8health::status::{Object, ObjectStatus, Verdict};

/// Exit code bit OR'd in when anything is still progressing.
const EXIT_PROGRESSING_BIT: i32 = 0b1000;

/// Exit code for evaluator failures.
const EXIT_FAILURE: i32 = 128;

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (aws-lc-rs)
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("k8health=debug")
            .init();
    }

    match run(&args).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            std::process::exit(EXIT_FAILURE);
        }
    }
}

async fn run(args: &Args) -> Result<i32> {
    match &args.command {
        Some(Command::Monitor {
            config,
            interval,
            host,
            port,
            print_only,
        }) => {
            run_monitor(args, config, *interval, host, *port, *print_only).await?;
            Ok(0)
        }
        None => run_health(args).await,
    }
}

async fn run_health(args: &Args) -> Result<i32> {
    if args.resources.is_empty() {
        bail!("no resources specified");
    }

    let loader = ClusterLoader::connect().await?;
    let objects = resolve_resources(args, &loader).await?;
    let evaluator = Evaluator::new(
        default_registry().default_analyzers(),
        Box::new(loader.clone()),
    );

    if !args.wait_progress && !args.wait_ok && !args.wait_forever {
        // Single evaluation pass.
        let mut statuses = Vec::with_capacity(objects.len());
        for obj in &objects {
            statuses.push(evaluator.eval(obj).await);
        }
        print_statuses(args, &statuses)?;
        return Ok(exit_code(&statuses));
    }

    let poller = StatusPoller::new(Duration::from_secs(args.interval), evaluator, objects);
    let mut rx = poller.start();

    while let Some(update) = rx.recv().await {
        print_statuses(args, &update.statuses)?;

        if args.wait_forever {
            continue;
        }

        // Unknown counts as still progressing: there is no verdict yet.
        let progressing = update
            .statuses
            .iter()
            .any(|s| s.status.progressing || s.status.result == Verdict::Unknown);

        if args.wait_progress && !progressing {
            return Ok(exit_code(&update.statuses));
        }

        if args.wait_ok
            && !progressing
            && update
                .statuses
                .iter()
                .all(|s| s.status.result == Verdict::Ok)
        {
            return Ok(exit_code(&update.statuses));
        }
    }

    bail!("status updates ended unexpectedly");
}

/// Resolve TYPE[/NAME] arguments into concrete objects via discovery.
async fn resolve_resources(args: &Args, loader: &ClusterLoader) -> Result<Vec<Arc<Object>>> {
    let namespace = if args.all_namespaces {
        NAMESPACE_ALL.to_string()
    } else {
        args.namespace.clone().unwrap_or_else(|| "default".to_string())
    };

    let mut objects = Vec::new();
    for spec in &args.resources {
        let (type_part, name) = spec.split_once('/').unwrap_or((spec.as_str(), ""));
        let info = loader
            .resources()
            .resolve_type(type_part)
            .ok_or_else(|| anyhow!("unknown resource type: {type_part}"))?
            .clone();

        let ns = if info.namespaced { namespace.as_str() } else { "" };
        let loaded = loader
            .load_resource(&info.group_resource(), ns, name)
            .await?;

        if loaded.is_empty() && !name.is_empty() {
            bail!("{}/{} not found", info.group_resource(), name);
        }
        objects.extend(loaded);
    }

    Ok(objects)
}

fn print_statuses(args: &Args, statuses: &[ObjectStatus]) -> Result<()> {
    match args.output {
        OutputFormat::Tree | OutputFormat::TreeColor => {
            let printer = TreePrinter::new(PrintOptions {
                show_ok: args.show_healthy,
                show_group: args.show_group,
                color: args.output == OutputFormat::TreeColor,
            });
            print!("{}", printer.render(statuses));
        }
        OutputFormat::Json => {
            println!("{}", render_kubectl(statuses, KubectlFormat::Json)?);
        }
        OutputFormat::Yaml => {
            println!("{}", render_kubectl(statuses, KubectlFormat::Yaml)?);
        }
    }
    Ok(())
}

/// 0 when everything is Ok, 1 on warnings, 2 on errors, 3 on unknowns, with
/// the progressing bit OR'd in while anything is still converging.
fn exit_code(statuses: &[ObjectStatus]) -> i32 {
    let mut code = 0;
    for status in statuses {
        code = match status.status.result {
            Verdict::Unknown => 3,
            Verdict::Error => code.max(2),
            Verdict::Warning => code.max(1),
            Verdict::Ok => code,
        };
    }

    if statuses.iter().any(|s| s.status.progressing) {
        code |= EXIT_PROGRESSING_BIT;
    }

    code
}

async fn run_monitor(
    args: &Args,
    config: &std::path::Path,
    interval: u64,
    host: &str,
    port: u16,
    print_only: bool,
) -> Result<()> {
    let cfg = monitor::Config::read(config)?;

    let loader = ClusterLoader::connect().await?;
    let evaluator = Evaluator::new(default_registry().default_analyzers(), Box::new(loader));

    let poller = monitor::MonitorPoller::new(Duration::from_secs(interval), evaluator, cfg);
    let mut rx = poller.start();

    if print_only {
        let update = rx
            .recv()
            .await
            .ok_or_else(|| anyhow!("no status update received"))?;
        let update = monitor::dedup(update);
        print_statuses(args, &update.to_status_update().statuses)?;
        return Ok(());
    }

    let addr = format!("{host}:{port}")
        .parse()
        .map_err(|err| anyhow!("invalid metrics address {host}:{port}: {err}"))?;
    monitor::install_exporter(addr)?;

    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Some(update) => monitor::record_update(&monitor::dedup(update)),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}
