// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! AEGIS Monitor Core
//!
//! Continuous-monitoring engines: a state reconciler that detects drift
//! between redundant sources, and a baseline learner that flags metric
//! anomalies. Both publish onto one event bus.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Library entry point

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
