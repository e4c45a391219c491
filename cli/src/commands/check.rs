// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! One-shot reconciliation
//!
//! Reconciles every enabled domain once and prints the results as JSON.
//! Exits non-zero when any domain is inconsistent, for use in scripts and CI.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use aegis_monitor_core::application::StateReconciler;
use aegis_monitor_core::domain::reconciliation::{DomainId, ReconciliationResult};
use aegis_monitor_core::infrastructure::event_bus::EventBus;

#[derive(Args)]
pub struct CheckArgs {
    /// Only reconcile this domain
    #[arg(long, value_name = "ID")]
    domain: Option<String>,

    /// Print compact single-line JSON
    #[arg(long)]
    compact: bool,
}

pub async fn execute(args: CheckArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = super::load_config(config_override)?;

    let reconciler = Arc::new(StateReconciler::new(
        config.spec.reconciler.clone(),
        EventBus::with_default_capacity(),
    ));
    super::register_domains(&reconciler, &config)?;

    let results = match args.domain {
        Some(id) => vec![reconciler
            .reconcile_domain(&DomainId::new(id))
            .await
            .context("Reconciliation failed")?],
        None => reconciler.reconcile_all().await,
    };

    let output = if args.compact {
        serde_json::to_string(&results)
    } else {
        serde_json::to_string_pretty(&results)
    }
    .context("Failed to serialize results")?;
    println!("{}", output);

    let inconsistent: Vec<&ReconciliationResult> =
        results.iter().filter(|r| !r.consistent).collect();
    if inconsistent.is_empty() {
        eprintln!("{}", format!("✓ {} domain(s) consistent", results.len()).green());
        return Ok(());
    }

    for result in &inconsistent {
        eprintln!(
            "{} {} ({} drift): {}",
            "✗".red(),
            result.domain_name.bold(),
            result.drift_count,
            result.suggested_action.as_deref().unwrap_or("review sources")
        );
    }
    std::process::exit(1);
}
