// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Long-running monitor
//!
//! Starts both engines on one event bus, prints every detected issue, and
//! feeds each reconciliation's drift count back into the baseline learner so
//! that unusual drift levels are flagged as anomalies too.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use aegis_monitor_core::application::{BaselineLearner, StateReconciler};
use aegis_monitor_core::domain::baseline::Severity;
use aegis_monitor_core::domain::events::IssueDetected;
use aegis_monitor_core::infrastructure::event_bus::{
    EventBus, EventBusError, EventReceiver, MonitorEvent,
};

pub async fn execute(config_override: Option<PathBuf>) -> Result<()> {
    let config = super::load_config(config_override)?;

    let event_bus = EventBus::with_default_capacity();
    let reconciler = Arc::new(StateReconciler::new(
        config.spec.reconciler.clone(),
        event_bus.clone(),
    ));
    let learner = Arc::new(BaselineLearner::new(
        config.spec.baseline.clone(),
        event_bus.clone(),
    ));
    super::register_domains(&reconciler, &config)?;

    // Subscribe before starting so the initial pass is observed
    let forwarder = tokio::spawn(forward_events(event_bus.subscribe(), Arc::clone(&learner)));

    info!(
        domains = config.spec.domains.len(),
        "Starting AEGIS monitor '{}'", config.metadata.name
    );
    learner.start();
    reconciler.start().await;

    println!(
        "{} Monitoring {} domain(s). Press Ctrl-C to stop.",
        "✓".green(),
        config.spec.domains.len()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    println!();
    println!("Shutting down...");
    reconciler.stop();
    learner.stop();
    forwarder.abort();

    let status = reconciler.status();
    println!(
        "Reconciliations recorded: {} ({} inconsistent in the last 5 minutes)",
        status.history_size, status.recent_inconsistencies
    );
    println!("Anomalies detected: {}", learner.status().anomaly_count);

    Ok(())
}

async fn forward_events(mut events: EventReceiver, learner: Arc<BaselineLearner>) {
    loop {
        match events.recv().await {
            Ok(MonitorEvent::Issue(issue)) => print_issue(&issue),
            Ok(MonitorEvent::Reconciliation(event)) => {
                let result = event.result();
                let metric = format!("reconciliation.{}.drift_count", result.domain_id);
                if let Err(e) = learner.record_metric(metric, result.drift_count as f64, None) {
                    warn!("Failed to record drift metric: {}", e);
                }
            }
            Ok(MonitorEvent::Baseline(_)) => {}
            Err(EventBusError::Lagged(n)) => {
                debug!("Issue printer skipped {} events", n);
            }
            Err(_) => break,
        }
    }
}

fn print_issue(issue: &IssueDetected) {
    let label = format!("[{}]", issue.severity.as_str().to_uppercase());
    let label = match issue.severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.normal(),
    };
    println!(
        "{} {} {} {}",
        issue.detected_at.format("%Y-%m-%dT%H:%M:%SZ").to_string().dimmed(),
        label,
        issue.issue_type.as_str().bold(),
        issue.description
    );
}
