// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the AEGIS Monitor CLI

pub mod check;
pub mod config;
pub mod run;

pub use self::check::CheckArgs;
pub use self::config::ConfigCommand;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use aegis_monitor_core::application::StateReconciler;
use aegis_monitor_core::domain::monitor_config::MonitorConfig;
use aegis_monitor_core::infrastructure::sources::build_domain;

/// Load, override and validate the configuration shared by `run` and `check`.
pub(crate) fn load_config(config_override: Option<PathBuf>) -> Result<MonitorConfig> {
    let config =
        MonitorConfig::load_or_default(config_override).context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

/// Build and register every configured domain.
pub(crate) fn register_domains(
    reconciler: &Arc<StateReconciler>,
    config: &MonitorConfig,
) -> Result<()> {
    for domain_config in &config.spec.domains {
        let domain = build_domain(domain_config)
            .with_context(|| format!("Failed to build domain '{}'", domain_config.id))?;
        reconciler
            .register_domain(domain)
            .with_context(|| format!("Failed to register domain '{}'", domain_config.id))?;
    }
    Ok(())
}
