// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # State Reconciler
//!
//! Polls every registered [`ReconciliationDomain`] on its own interval,
//! compares the same fields across all of the domain's sources, and publishes
//! the outcome on the [`EventBus`].
//!
//! ## Cycle
//! 1. Resolve the domain (unknown id → [`ReconcilerError::DomainNotFound`], the
//!    only error returned to callers).
//! 2. Fetch all snapshots concurrently. A failed fetch becomes
//!    `{"_error": "<message>"}` and the cycle continues.
//! 3. Compare every field across every unordered source pair.
//! 4. Derive drift count, consistency, and a suggestion phrased around the
//!    domain's source of truth.
//! 5. Record in the bounded history and publish success/drift, plus an issue
//!    when the drift count reaches `drift_threshold`.
//!
//! A failure in steps 2–4 still produces a recorded and published result,
//! marked inconsistent with the error text as its suggested action.
//!
//! ## Scheduling
//! Each domain runs on its own spawned task. The task awaits its cycle before
//! waiting for the next tick, so a domain never overlaps itself. `stop()`
//! cancels future ticks only.

use chrono::{Duration as ChronoDuration, Utc};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::baseline::Severity;
use crate::domain::comparison::{classify_drift, resolve_path, FieldPathError};
use crate::domain::events::{IssueDetected, ReconciliationEvent};
use crate::domain::monitor_config::ReconcilerConfig;
use crate::domain::reconciliation::{
    suggest_action, DomainId, DomainSummary, FieldComparison, ReconciliationDomain,
    ReconciliationResult, ReconcilerStatus, Snapshot, SNAPSHOT_ERROR_KEY,
};
use crate::infrastructure::event_bus::EventBus;

/// Lookback used by `status()` to count recent inconsistent results.
const RECENT_WINDOW_MINUTES: i64 = 5;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Reconciliation domain not found: {0}")]
    DomainNotFound(DomainId),

    #[error("Invalid field in domain {domain}: {source}")]
    InvalidFieldPath {
        domain: DomainId,
        #[source]
        source: FieldPathError,
    },

    #[error("Reconciliation domain {0} must have a non-zero interval")]
    InvalidInterval(DomainId),
}

pub struct StateReconciler {
    config: ReconcilerConfig,
    event_bus: EventBus,
    domains: RwLock<HashMap<DomainId, ReconciliationDomain>>,
    timers: Mutex<HashMap<DomainId, CancellationToken>>,
    history: Mutex<VecDeque<ReconciliationResult>>,
    running: AtomicBool,
}

impl StateReconciler {
    pub fn new(config: ReconcilerConfig, event_bus: EventBus) -> Self {
        Self {
            config,
            event_bus,
            domains: RwLock::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Store or replace a domain. While running, an enabled domain gets its
    /// timer immediately; its first cycle runs one `interval` later.
    pub fn register_domain(
        self: &Arc<Self>,
        domain: ReconciliationDomain,
    ) -> Result<(), ReconcilerError> {
        if domain.interval.is_zero() {
            warn!(domain_id = %domain.id, "Rejecting domain with a zero interval");
            return Err(ReconcilerError::InvalidInterval(domain.id));
        }
        let id = domain.id.clone();
        let enabled = domain.enabled;
        info!(
            domain_id = %id,
            sources = domain.sources.len(),
            fields = domain.fields.len(),
            "Registering reconciliation domain"
        );
        self.domains.write().insert(id.clone(), domain);

        if self.is_running() {
            if enabled {
                self.schedule_domain(&id);
            } else {
                self.cancel_timer(&id);
            }
        }
        Ok(())
    }

    /// Cancel the domain's timer and forget it. History is kept.
    pub fn unregister_domain(&self, id: &DomainId) -> bool {
        self.cancel_timer(id);
        let removed = self.domains.write().remove(id).is_some();
        if removed {
            info!(domain_id = %id, "Unregistered reconciliation domain");
        }
        removed
    }

    /// Reconcile every enabled domain once, then poll each on its own interval.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Starting state reconciler");

        let enabled: Vec<DomainId> = self
            .domains
            .read()
            .values()
            .filter(|d| d.enabled)
            .map(|d| d.id.clone())
            .collect();

        for id in &enabled {
            if let Err(e) = self.reconcile_domain(id).await {
                warn!(domain_id = %id, "Initial reconciliation failed: {}", e);
            }
        }

        // stop() may have run while the initial pass was in flight
        if !self.is_running() {
            return;
        }
        for id in &enabled {
            self.schedule_domain(id);
        }
    }

    /// Cancel every timer. In-flight cycles run to completion.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let timers: Vec<CancellationToken> = self.timers.lock().drain().map(|(_, t)| t).collect();
        for token in timers {
            token.cancel();
        }
        info!("Stopped state reconciler");
    }

    fn cancel_timer(&self, id: &DomainId) {
        if let Some(token) = self.timers.lock().remove(id) {
            token.cancel();
        }
    }

    fn schedule_domain(self: &Arc<Self>, id: &DomainId) {
        let period = match self.domains.read().get(id) {
            Some(domain) => domain.interval,
            None => return,
        };

        let token = CancellationToken::new();
        if let Some(previous) = self.timers.lock().insert(id.clone(), token.clone()) {
            previous.cancel();
        }

        // Weak so that dropping the reconciler ends its timers
        let reconciler = Arc::downgrade(self);
        let id = id.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the initial pass already ran.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(reconciler) = reconciler.upgrade() else {
                            debug!(domain_id = %id, "Reconciler dropped, ending timer");
                            break;
                        };
                        debug!(domain_id = %id, "Running scheduled reconciliation");
                        if let Err(e) = reconciler.reconcile_domain(&id).await {
                            warn!(domain_id = %id, "Scheduled reconciliation failed: {}", e);
                        }
                    }
                    _ = token.cancelled() => {
                        debug!(domain_id = %id, "Reconciliation timer cancelled");
                        break;
                    }
                }
            }
        });
    }

    /// Run one reconciliation cycle for `id`.
    pub async fn reconcile_domain(
        &self,
        id: &DomainId,
    ) -> Result<ReconciliationResult, ReconcilerError> {
        let domain = self
            .domains
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ReconcilerError::DomainNotFound(id.clone()))?;

        let result = match self.compare_sources(&domain).await {
            Ok(comparisons) => {
                let mut result = ReconciliationResult::from_comparisons(&domain, comparisons);
                if !result.consistent {
                    result.suggested_action = result
                        .dominant_drift()
                        .and_then(|kind| suggest_action(kind, domain.source_of_truth()));
                }
                result
            }
            Err(e) => {
                warn!(domain_id = %domain.id, "Reconciliation cycle failed: {}", e);
                ReconciliationResult::failed(&domain, e.to_string())
            }
        };

        self.record(result.clone());
        self.publish(&result);
        Ok(result)
    }

    async fn compare_sources(
        &self,
        domain: &ReconciliationDomain,
    ) -> Result<Vec<FieldComparison>, ReconcilerError> {
        let snapshots = self.fetch_snapshots(domain).await;

        let source_count = domain.sources.len();
        let pair_count = source_count * source_count.saturating_sub(1) / 2;
        let mut comparisons = Vec::with_capacity(domain.fields.len() * pair_count);

        for field in &domain.fields {
            let values = snapshots
                .iter()
                .map(|snapshot| resolve_path(snapshot, field))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| ReconcilerError::InvalidFieldPath {
                    domain: domain.id.clone(),
                    source,
                })?;

            for i in 0..source_count {
                for j in (i + 1)..source_count {
                    let drift = classify_drift(values[i], values[j]);
                    comparisons.push(FieldComparison::new(
                        field.clone(),
                        domain.sources[i].id.clone(),
                        values[i].cloned(),
                        domain.sources[j].id.clone(),
                        values[j].cloned(),
                        drift,
                    ));
                }
            }
        }

        Ok(comparisons)
    }

    async fn fetch_snapshots(&self, domain: &ReconciliationDomain) -> Vec<Snapshot> {
        let fetches = domain.sources.iter().map(|source| async move {
            match source.provider.fetch_snapshot().await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(
                        domain_id = %domain.id,
                        source_id = %source.id,
                        "Source snapshot fetch failed: {}",
                        e
                    );
                    metrics::counter!(
                        "aegis_monitor_source_failures_total",
                        "domain" => domain.id.to_string(),
                        "source" => source.id.to_string()
                    )
                    .increment(1);
                    let mut marker = Snapshot::new();
                    marker.insert(SNAPSHOT_ERROR_KEY.to_string(), Value::String(e.to_string()));
                    marker
                }
            }
        });
        join_all(fetches).await
    }

    fn record(&self, result: ReconciliationResult) {
        let mut history = self.history.lock();
        history.push_back(result);
        while history.len() > self.config.max_history {
            history.pop_front();
        }
    }

    fn publish(&self, result: &ReconciliationResult) {
        let outcome = if result.consistent { "consistent" } else { "drift" };
        metrics::counter!(
            "aegis_monitor_reconciliations_total",
            "domain" => result.domain_id.to_string(),
            "outcome" => outcome
        )
        .increment(1);

        if result.consistent {
            debug!(domain_id = %result.domain_id, "Domain is consistent");
            self.event_bus
                .publish_reconciliation_event(ReconciliationEvent::Succeeded {
                    result: result.clone(),
                });
            return;
        }

        warn!(
            domain_id = %result.domain_id,
            drift_count = result.drift_count,
            suggested_action = result.suggested_action.as_deref().unwrap_or(""),
            "State drift detected"
        );
        self.event_bus
            .publish_reconciliation_event(ReconciliationEvent::DriftDetected {
                result: result.clone(),
            });

        let threshold = self.config.drift_threshold;
        if result.drift_count >= threshold {
            let severity = if result.drift_count >= threshold * 2 {
                Severity::High
            } else {
                Severity::Medium
            };
            self.event_bus
                .publish_issue(IssueDetected::state_drift(severity, result.clone()));
        }
    }

    /// Reconcile every enabled domain in turn. Failures are logged and skipped.
    pub async fn reconcile_all(&self) -> Vec<ReconciliationResult> {
        let ids: Vec<DomainId> = self
            .domains
            .read()
            .values()
            .filter(|d| d.enabled)
            .map(|d| d.id.clone())
            .collect();

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            match self.reconcile_domain(&id).await {
                Ok(result) => results.push(result),
                Err(e) => warn!(domain_id = %id, "Reconciliation failed: {}", e),
            }
        }
        results
    }

    /// History, oldest first, optionally limited to one domain.
    pub fn results(&self, domain_id: Option<&DomainId>) -> Vec<ReconciliationResult> {
        self.history
            .lock()
            .iter()
            .filter(|r| domain_id.map_or(true, |id| &r.domain_id == id))
            .cloned()
            .collect()
    }

    /// Newest result per domain.
    pub fn latest_results(&self) -> HashMap<DomainId, ReconciliationResult> {
        let mut latest = HashMap::new();
        for result in self.history.lock().iter().rev() {
            latest
                .entry(result.domain_id.clone())
                .or_insert_with(|| result.clone());
        }
        latest
    }

    pub fn domains(&self) -> Vec<DomainSummary> {
        let mut domains: Vec<DomainSummary> =
            self.domains.read().values().map(|d| d.summary()).collect();
        domains.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        domains
    }

    pub fn status(&self) -> ReconcilerStatus {
        let cutoff = Utc::now() - ChronoDuration::minutes(RECENT_WINDOW_MINUTES);
        let history = self.history.lock();
        ReconcilerStatus {
            running: self.is_running(),
            domain_count: self.domains.read().len(),
            history_size: history.len(),
            recent_inconsistencies: history
                .iter()
                .filter(|r| !r.consistent && r.timestamp >= cutoff)
                .count(),
        }
    }
}

impl Drop for StateReconciler {
    fn drop(&mut self) {
        for token in self.timers.get_mut().values() {
            token.cancel();
        }
    }
}
