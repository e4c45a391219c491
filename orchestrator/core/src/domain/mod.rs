// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Value types, comparison rules and statistics shared by both engines.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Reconciliation and baseline models, events, configuration

pub mod baseline;
pub mod comparison;
pub mod events;
pub mod monitor_config;
pub mod reconciliation;
pub mod statistics;
