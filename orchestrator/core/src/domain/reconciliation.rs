// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # State Reconciliation Domain
//!
//! A [`ReconciliationDomain`] groups several [`StateSource`]s that each keep
//! their own view of the same piece of system state, plus the dot-path fields
//! that must agree across them. The reconciler compares every field across
//! every unordered pair of sources and records one [`FieldComparison`] per
//! (field, pair).
//!
//! Sources are opaque: all the reconciler knows is how to ask a
//! [`SnapshotProvider`] for the current key-value snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Key that replaces a snapshot when its fetch fails.
pub const SNAPSHOT_ERROR_KEY: &str = "_error";

pub type Snapshot = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainId(pub String);

impl DomainId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultId(pub Uuid);

impl ResultId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ResultId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Snapshot fetch failed: {0}")]
    FetchFailed(String),
    #[error("Source returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("Snapshot is not a JSON object")]
    NotAnObject,
}

/// Asynchronous snapshot provider behind a state source.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<Snapshot, SourceError>;
}

/// One independently-maintained view of system state.
#[derive(Clone)]
pub struct StateSource {
    pub id: SourceId,
    pub name: String,
    /// Free-form kind tag (e.g. "database", "cache", "agent").
    pub kind: String,
    /// Higher is more authoritative.
    pub priority: i32,
    pub provider: Arc<dyn SnapshotProvider>,
}

impl StateSource {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: impl Into<String>,
        priority: i32,
        provider: Arc<dyn SnapshotProvider>,
    ) -> Self {
        Self {
            id: SourceId::new(id),
            name: name.into(),
            kind: kind.into(),
            priority,
            provider,
        }
    }
}

impl fmt::Debug for StateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSource")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationDomain {
    pub id: DomainId,
    pub name: String,
    pub sources: Vec<StateSource>,
    /// Dot-paths compared across sources.
    pub fields: Vec<String>,
    pub interval: Duration,
    pub enabled: bool,
}

impl ReconciliationDomain {
    /// Highest-priority source; the first one wins a tie.
    pub fn source_of_truth(&self) -> Option<&StateSource> {
        let mut best: Option<&StateSource> = None;
        for source in &self.sources {
            match best {
                Some(current) if source.priority <= current.priority => {}
                _ => best = Some(source),
            }
        }
        best
    }

    /// Serializable view without the providers.
    pub fn summary(&self) -> DomainSummary {
        DomainSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            sources: self
                .sources
                .iter()
                .map(|s| SourceSummary {
                    id: s.id.clone(),
                    name: s.name.clone(),
                    kind: s.kind.clone(),
                    priority: s.priority,
                })
                .collect(),
            fields: self.fields.clone(),
            interval: self.interval,
            enabled: self.enabled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
    pub id: SourceId,
    pub name: String,
    pub kind: String,
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainSummary {
    pub id: DomainId,
    pub name: String,
    pub sources: Vec<SourceSummary>,
    pub fields: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    None,
    MissingA,
    MissingB,
    TypeMismatch,
    ValueMismatch,
}

impl DriftKind {
    pub fn is_drift(self) -> bool {
        self != DriftKind::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldComparison {
    pub field: String,
    pub source_a: SourceId,
    pub value_a: Option<Value>,
    pub source_b: SourceId,
    pub value_b: Option<Value>,
    pub matches: bool,
    pub drift: DriftKind,
}

impl FieldComparison {
    pub fn new(
        field: impl Into<String>,
        source_a: SourceId,
        value_a: Option<Value>,
        source_b: SourceId,
        value_b: Option<Value>,
        drift: DriftKind,
    ) -> Self {
        Self {
            field: field.into(),
            source_a,
            value_a,
            source_b,
            value_b,
            matches: !drift.is_drift(),
            drift,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub id: ResultId,
    pub timestamp: DateTime<Utc>,
    pub domain_id: DomainId,
    pub domain_name: String,
    pub sources: Vec<SourceId>,
    pub comparisons: Vec<FieldComparison>,
    pub drift_count: usize,
    pub consistent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    /// Set when the comparison cycle itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReconciliationResult {
    pub fn from_comparisons(
        domain: &ReconciliationDomain,
        comparisons: Vec<FieldComparison>,
    ) -> Self {
        let drift_count = comparisons.iter().filter(|c| c.drift.is_drift()).count();
        Self {
            id: ResultId::new(),
            timestamp: Utc::now(),
            domain_id: domain.id.clone(),
            domain_name: domain.name.clone(),
            sources: domain.sources.iter().map(|s| s.id.clone()).collect(),
            comparisons,
            drift_count,
            consistent: drift_count == 0,
            suggested_action: None,
            error: None,
        }
    }

    /// Result for a cycle that failed after the domain was resolved.
    /// Counts as a single drift so that `consistent == (drift_count == 0)`.
    pub fn failed(domain: &ReconciliationDomain, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            id: ResultId::new(),
            timestamp: Utc::now(),
            domain_id: domain.id.clone(),
            domain_name: domain.name.clone(),
            sources: domain.sources.iter().map(|s| s.id.clone()).collect(),
            comparisons: Vec::new(),
            drift_count: 1,
            consistent: false,
            suggested_action: Some(error.clone()),
            error: Some(error),
        }
    }

    /// Most frequent drift kind; ties go to the kind seen first.
    pub fn dominant_drift(&self) -> Option<DriftKind> {
        let mut tally: Vec<(DriftKind, usize)> = Vec::new();
        for comparison in self.comparisons.iter().filter(|c| c.drift.is_drift()) {
            match tally.iter_mut().find(|(kind, _)| *kind == comparison.drift) {
                Some((_, count)) => *count += 1,
                None => tally.push((comparison.drift, 1)),
            }
        }

        let mut best: Option<(DriftKind, usize)> = None;
        for (kind, count) in tally {
            match best {
                Some((_, best_count)) if count <= best_count => {}
                _ => best = Some((kind, count)),
            }
        }
        best.map(|(kind, _)| kind)
    }
}

/// Phrase a corrective suggestion around the domain's source of truth.
pub fn suggest_action(drift: DriftKind, source_of_truth: Option<&StateSource>) -> Option<String> {
    let truth = source_of_truth
        .map(|s| format!("'{}' ({})", s.name, s.id))
        .unwrap_or_else(|| "the highest-priority source".to_string());

    match drift {
        DriftKind::None => None,
        DriftKind::ValueMismatch => Some(format!(
            "Sync diverging values from source of truth {}",
            truth
        )),
        DriftKind::MissingA | DriftKind::MissingB => Some(format!(
            "Propagate missing fields from source of truth {}",
            truth
        )),
        DriftKind::TypeMismatch => Some(
            "Manual review required: sources disagree on field types".to_string(),
        ),
    }
}

/// Read-only view of reconciler health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerStatus {
    pub running: bool,
    pub domain_count: usize,
    pub history_size: usize,
    pub recent_inconsistencies: usize,
}
