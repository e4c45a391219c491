// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

use aegis_monitor_core::domain::monitor_config::{
    DomainConfig, MonitorConfig, SourceConfig, SourceEndpoint,
};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./aegis-monitor.yaml")]
        output: PathBuf,

        /// Include an example reconciliation domain
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = MonitorConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. AEGIS_MONITOR_CONFIG_PATH: {}",
            std::env::var("AEGIS_MONITOR_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./aegis-monitor.yaml");
        println!("  4. ~/.aegis/monitor.yaml");
        println!("  5. /etc/aegis/monitor.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    let reconciler = &config.spec.reconciler;
    println!("{}", "Reconciler:".bold());
    println!("  Max history: {}", reconciler.max_history);
    println!("  Drift threshold: {}", reconciler.drift_threshold);
    println!();

    let baseline = &config.spec.baseline;
    println!("{}", "Baseline Learner:".bold());
    for window in &baseline.windows {
        println!("  Window {} → {:?}", window.name, window.duration);
    }
    println!("  Min samples: {}", baseline.min_samples_for_baseline);
    println!("  Max data points: {}", baseline.max_data_points);
    println!("  Update interval: {:?}", baseline.update_interval);
    let thresholds = &baseline.anomaly_thresholds;
    println!(
        "  Anomaly thresholds (σ): low {} / medium {} / high {} / critical {}",
        thresholds.low, thresholds.medium, thresholds.high, thresholds.critical
    );
    println!();

    println!("{}", "Domains:".bold());
    if config.spec.domains.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for domain in &config.spec.domains {
        let state = if domain.enabled {
            "enabled".green()
        } else {
            "disabled".dimmed()
        };
        println!(
            "  {} ({}) every {:?} [{}]",
            domain.name.bold(),
            domain.id,
            domain.interval,
            state
        );
        println!("    Fields: {}", domain.fields.join(", "));
        for source in &domain.sources {
            let target = match &source.endpoint {
                SourceEndpoint::Http { url, .. } => url.clone(),
                SourceEndpoint::Static { .. } => "(static)".to_string(),
            };
            println!(
                "    - {} [{}] priority {} → {}",
                source.id, source.kind, source.priority, target
            );
        }
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = MonitorConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = sample_config(with_examples)
        .to_yaml_string()
        .context("Failed to render sample configuration")?;

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

fn sample_config(with_examples: bool) -> MonitorConfig {
    let mut config = MonitorConfig::default();
    if !with_examples {
        return config;
    }

    config.spec.domains.push(DomainConfig {
        id: "executions".to_string(),
        name: "Agent Executions".to_string(),
        fields: vec!["status".to_string(), "iterations.count".to_string()],
        interval: Duration::from_secs(30),
        enabled: true,
        sources: vec![
            SourceConfig {
                id: "orchestrator".to_string(),
                name: "Orchestrator API".to_string(),
                kind: "http".to_string(),
                priority: 10,
                endpoint: SourceEndpoint::Http {
                    url: "http://127.0.0.1:8000/v1/executions/summary".to_string(),
                    timeout: Duration::from_secs(10),
                    headers: Default::default(),
                },
            },
            SourceConfig {
                id: "expected".to_string(),
                name: "Expected State".to_string(),
                kind: "static".to_string(),
                priority: 1,
                endpoint: SourceEndpoint::Static {
                    snapshot: json!({"status": "running", "iterations": {"count": 0}})
                        .as_object()
                        .cloned()
                        .unwrap_or_default(),
                },
            },
        ],
    });
    config
}
