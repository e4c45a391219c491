// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Baseline Learning Domain
//!
//! Metric samples ([`MetricDataPoint`]) accumulate per metric name. For every
//! configured time window the learner periodically summarizes the samples that
//! fall inside the window into a [`MetricBaseline`]. New samples are scored
//! against the shortest window's baseline; large deviations become
//! [`BaselineAnomaly`] records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::statistics::Summary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDataPoint {
    pub timestamp: DateTime<Utc>,
    pub metric: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, String>>,
}

impl MetricDataPoint {
    pub fn new(metric: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            metric: metric.into(),
            value,
            tags: None,
        }
    }

    pub fn with_tags(mut self, tags: HashMap<String, String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricBaseline {
    pub metric: String,
    /// Name of the window this baseline summarizes (e.g. "5min").
    pub window: String,
    pub sample_count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub last_updated: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl MetricBaseline {
    pub fn from_summary(
        metric: impl Into<String>,
        window: impl Into<String>,
        summary: &Summary,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Self {
        Self {
            metric: metric.into(),
            window: window.into(),
            sample_count: summary.count,
            mean: summary.mean,
            std_dev: summary.std_dev,
            min: summary.min,
            max: summary.max,
            p50: summary.p50,
            p90: summary.p90,
            p95: summary.p95,
            p99: summary.p99,
            last_updated: window_end,
            window_start,
            window_end,
        }
    }

    /// Standard deviations `value` lies from the mean. `None` when stddev is zero.
    pub fn z_score(&self, value: f64) -> Option<f64> {
        if self.std_dev == 0.0 {
            return None;
        }
        Some((value - self.mean).abs() / self.std_dev)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationType {
    High,
    Low,
    Spike,
    Drop,
}

/// Severity shared by anomalies and issues. Ordered low → critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnomalyId(pub Uuid);

impl AnomalyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AnomalyId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineAnomaly {
    pub id: AnomalyId,
    pub timestamp: DateTime<Utc>,
    pub metric: String,
    pub value: f64,
    pub baseline: MetricBaseline,
    pub deviation_type: DeviationType,
    /// z-score of `value` against `baseline`.
    pub deviation_score: f64,
    pub severity: Severity,
}

/// Dump of learner state, used for bulk import/export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaselineDataExport {
    pub data_points: HashMap<String, Vec<MetricDataPoint>>,
    #[serde(default)]
    pub baselines: HashMap<String, HashMap<String, MetricBaseline>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineLearnerStatus {
    pub running: bool,
    pub tracked_metrics: usize,
    pub total_data_points: usize,
    pub baseline_count: usize,
    pub anomaly_count: usize,
    /// Anomalies detected during the last hour.
    pub recent_anomalies: usize,
}

#[derive(Debug, Error, PartialEq)]
pub enum BaselineError {
    #[error("Metric name cannot be empty")]
    EmptyMetricName,
    #[error("Metric '{metric}' received non-finite value {value}")]
    NonFiniteValue { metric: String, value: f64 },
}
