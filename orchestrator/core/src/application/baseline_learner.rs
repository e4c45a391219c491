// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Baseline Learner
//!
//! Keeps a bounded time series per metric, periodically summarizes each series
//! over every configured window into a [`MetricBaseline`], and scores each new
//! sample against the shortest window's baseline as it arrives.
//!
//! Recording never waits on the recompute timer: detection uses whatever
//! baseline was computed last, so a freshly created metric produces no
//! anomalies until the first sweep with enough samples.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::baseline::{
    AnomalyId, BaselineAnomaly, BaselineDataExport, BaselineError, BaselineLearnerStatus,
    DeviationType, MetricBaseline, MetricDataPoint, Severity,
};
use crate::domain::events::{BaselineEvent, IssueDetected};
use crate::domain::monitor_config::{BaselineLearnerConfig, BaselineWindow};
use crate::domain::statistics::Summary;
use crate::infrastructure::event_bus::EventBus;

const MAX_ANOMALY_HISTORY: usize = 1000;

/// Points inspected when deciding whether a deviation was abrupt.
const ABRUPTNESS_LOOKBACK: usize = 5;

/// Fewer recent points than this always counts as abrupt.
const ABRUPTNESS_MIN_POINTS: usize = 3;

/// Floor for the recompute period; a zero period is raised to this.
const MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

pub struct BaselineLearner {
    config: BaselineLearnerConfig,
    event_bus: EventBus,
    series: RwLock<HashMap<String, VecDeque<MetricDataPoint>>>,
    /// metric -> window name -> baseline
    baselines: RwLock<HashMap<String, HashMap<String, MetricBaseline>>>,
    anomalies: Mutex<VecDeque<BaselineAnomaly>>,
    timer: Mutex<Option<CancellationToken>>,
    running: AtomicBool,
}

impl BaselineLearner {
    pub fn new(config: BaselineLearnerConfig, event_bus: EventBus) -> Self {
        Self {
            config,
            event_bus,
            series: RwLock::new(HashMap::new()),
            baselines: RwLock::new(HashMap::new()),
            anomalies: Mutex::new(VecDeque::new()),
            timer: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &BaselineLearnerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Recompute immediately, then every `update_interval`.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            interval_secs = self.config.update_interval.as_secs(),
            windows = self.config.windows.len(),
            "Starting baseline learner"
        );

        self.update_baselines();

        let token = CancellationToken::new();
        if let Some(previous) = self.timer.lock().replace(token.clone()) {
            previous.cancel();
        }

        let mut period = self.config.update_interval;
        if period.is_zero() {
            warn!(
                "Baseline update interval is zero, using {:?}",
                MIN_UPDATE_INTERVAL
            );
            period = MIN_UPDATE_INTERVAL;
        }

        // Weak so that dropping the learner ends its timer
        let learner = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(learner) = learner.upgrade() else {
                            debug!("Baseline learner dropped, ending timer");
                            break;
                        };
                        learner.update_baselines();
                    }
                    _ = token.cancelled() => {
                        debug!("Baseline recompute timer cancelled");
                        break;
                    }
                }
            }
        });
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(token) = self.timer.lock().take() {
            token.cancel();
        }
        info!("Stopped baseline learner");
    }

    /// Record one sample stamped now.
    pub fn record_metric(
        &self,
        metric: impl Into<String>,
        value: f64,
        tags: Option<HashMap<String, String>>,
    ) -> Result<Option<BaselineAnomaly>, BaselineError> {
        let mut point = MetricDataPoint::new(metric, value);
        point.tags = tags;
        self.record_point(point)
    }

    /// Record a batch; each item is handled exactly like `record_metric`.
    pub fn record_metrics<I>(&self, points: I) -> Vec<Result<Option<BaselineAnomaly>, BaselineError>>
    where
        I: IntoIterator<Item = MetricDataPoint>,
    {
        points.into_iter().map(|p| self.record_point(p)).collect()
    }

    /// Record a sample with its own timestamp.
    pub fn record_point(
        &self,
        point: MetricDataPoint,
    ) -> Result<Option<BaselineAnomaly>, BaselineError> {
        if point.metric.is_empty() {
            return Err(BaselineError::EmptyMetricName);
        }
        if !point.value.is_finite() {
            return Err(BaselineError::NonFiniteValue {
                metric: point.metric,
                value: point.value,
            });
        }

        let recent: Vec<f64> = {
            let mut series = self.series.write();
            let points = series.entry(point.metric.clone()).or_default();
            points.push_back(point.clone());
            while points.len() > self.config.max_data_points {
                points.pop_front();
            }
            points
                .iter()
                .rev()
                .take(ABRUPTNESS_LOOKBACK)
                .map(|p| p.value)
                .collect()
        };
        metrics::counter!("aegis_monitor_metric_points_total").increment(1);

        let anomaly = self.detect_anomaly(&point, &recent);

        self.event_bus
            .publish_baseline_event(BaselineEvent::MetricRecorded { point });

        Ok(anomaly)
    }

    /// `recent` holds the newest points first, the current one included.
    fn detect_anomaly(&self, point: &MetricDataPoint, recent: &[f64]) -> Option<BaselineAnomaly> {
        let window = self.config.shortest_window()?;
        let baseline = self
            .baselines
            .read()
            .get(&point.metric)
            .and_then(|windows| windows.get(&window.name))
            .cloned()?;

        let z_score = baseline.z_score(point.value)?;
        let severity = self.config.anomaly_thresholds.classify(z_score)?;

        let rising = point.value > baseline.mean;
        let abrupt = match recent.get(1) {
            Some(previous) if recent.len() >= ABRUPTNESS_MIN_POINTS => {
                (point.value - previous).abs() > 2.0 * baseline.std_dev
            }
            _ => true,
        };
        let deviation_type = match (abrupt, rising) {
            (true, true) => DeviationType::Spike,
            (true, false) => DeviationType::Drop,
            (false, true) => DeviationType::High,
            (false, false) => DeviationType::Low,
        };

        let anomaly = BaselineAnomaly {
            id: AnomalyId::new(),
            timestamp: point.timestamp,
            metric: point.metric.clone(),
            value: point.value,
            baseline,
            deviation_type,
            deviation_score: z_score,
            severity,
        };

        warn!(
            metric = %anomaly.metric,
            value = anomaly.value,
            z_score = anomaly.deviation_score,
            severity = %anomaly.severity,
            "Baseline anomaly detected"
        );
        metrics::counter!("aegis_monitor_anomalies_total", "severity" => severity.as_str())
            .increment(1);

        {
            let mut anomalies = self.anomalies.lock();
            anomalies.push_back(anomaly.clone());
            while anomalies.len() > MAX_ANOMALY_HISTORY {
                anomalies.pop_front();
            }
        }

        self.event_bus
            .publish_baseline_event(BaselineEvent::AnomalyDetected {
                anomaly: anomaly.clone(),
            });
        if severity >= Severity::High {
            self.event_bus
                .publish_issue(IssueDetected::baseline_anomaly(anomaly.clone()));
        }

        Some(anomaly)
    }

    /// Recompute every (metric, window) baseline from the samples inside the
    /// window ending now. Returns how many baselines were replaced.
    pub fn update_baselines(&self) -> usize {
        self.update_baselines_at(Utc::now())
    }

    /// Same sweep as [`update_baselines`](Self::update_baselines), with windows
    /// ending at `now`.
    pub fn update_baselines_at(&self, now: DateTime<Utc>) -> usize {
        let series: Vec<(String, Vec<MetricDataPoint>)> = self
            .series
            .read()
            .iter()
            .map(|(metric, points)| (metric.clone(), points.iter().cloned().collect()))
            .collect();

        let mut computed = Vec::new();
        for (metric, points) in &series {
            for window in &self.config.windows {
                if let Some(baseline) = self.compute_baseline(metric, points, window, now) {
                    computed.push(baseline);
                }
            }
        }

        let updated = computed.len();
        let snapshot = {
            let mut baselines = self.baselines.write();
            for baseline in computed {
                baselines
                    .entry(baseline.metric.clone())
                    .or_default()
                    .insert(baseline.window.clone(), baseline);
            }
            baselines.clone()
        };

        debug!(
            metrics = series.len(),
            updated = updated,
            "Baseline recompute finished"
        );
        self.event_bus
            .publish_baseline_event(BaselineEvent::BaselinesUpdated {
                baselines: snapshot,
                updated_at: now,
            });
        updated
    }

    fn compute_baseline(
        &self,
        metric: &str,
        points: &[MetricDataPoint],
        window: &BaselineWindow,
        now: DateTime<Utc>,
    ) -> Option<MetricBaseline> {
        let window_start = ChronoDuration::from_std(window.duration)
            .ok()
            .and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let values: Vec<f64> = points
            .iter()
            .filter(|p| p.timestamp >= window_start && p.timestamp <= now)
            .map(|p| p.value)
            .collect();

        if values.len() < self.config.min_samples_for_baseline {
            return None;
        }

        let summary = Summary::from_values(&values)?;
        Some(MetricBaseline::from_summary(
            metric,
            &window.name,
            &summary,
            window_start,
            now,
        ))
    }

    /// Baseline for one window, defaulting to the shortest.
    pub fn baseline(&self, metric: &str, window: Option<&str>) -> Option<MetricBaseline> {
        let window = match window {
            Some(name) => name.to_string(),
            None => self.config.shortest_window()?.name.clone(),
        };
        self.baselines
            .read()
            .get(metric)
            .and_then(|windows| windows.get(&window))
            .cloned()
    }

    pub fn metric_baselines(&self, metric: &str) -> HashMap<String, MetricBaseline> {
        self.baselines
            .read()
            .get(metric)
            .cloned()
            .unwrap_or_default()
    }

    pub fn all_baselines(&self) -> HashMap<String, HashMap<String, MetricBaseline>> {
        self.baselines.read().clone()
    }

    /// Anomaly history, oldest first.
    pub fn anomalies(&self, metric: Option<&str>, severity: Option<Severity>) -> Vec<BaselineAnomaly> {
        self.anomalies
            .lock()
            .iter()
            .filter(|a| metric.map_or(true, |m| a.metric == m))
            .filter(|a| severity.map_or(true, |s| a.severity == s))
            .cloned()
            .collect()
    }

    pub fn recent_anomalies(&self, window: Duration) -> Vec<BaselineAnomaly> {
        let cutoff = ChronoDuration::from_std(window)
            .ok()
            .and_then(|d| Utc::now().checked_sub_signed(d))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.anomalies
            .lock()
            .iter()
            .filter(|a| a.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub fn tracked_metrics(&self) -> Vec<String> {
        let mut metrics: Vec<String> = self.series.read().keys().cloned().collect();
        metrics.sort();
        metrics
    }

    /// The most recent `limit` points (all when `None`), oldest first.
    pub fn data_points(&self, metric: &str, limit: Option<usize>) -> Vec<MetricDataPoint> {
        let series = self.series.read();
        let Some(points) = series.get(metric) else {
            return Vec::new();
        };
        let skip = limit.map_or(0, |n| points.len().saturating_sub(n));
        points.iter().skip(skip).cloned().collect()
    }

    pub fn status(&self) -> BaselineLearnerStatus {
        let (tracked_metrics, total_data_points) = {
            let series = self.series.read();
            (series.len(), series.values().map(VecDeque::len).sum())
        };
        let baseline_count = self.baselines.read().values().map(HashMap::len).sum();
        let anomaly_count = self.anomalies.lock().len();

        BaselineLearnerStatus {
            running: self.is_running(),
            tracked_metrics,
            total_data_points,
            baseline_count,
            anomaly_count,
            recent_anomalies: self.recent_anomalies(Duration::from_secs(3600)).len(),
        }
    }

    /// Merge an export into the store, then recompute. Points are appended per
    /// metric, re-sorted by timestamp and trimmed to the cap; imported
    /// baselines replace existing ones for the same (metric, window).
    pub fn import_data(&self, data: BaselineDataExport) -> usize {
        let mut imported = 0;
        {
            let mut series = self.series.write();
            for (metric, points) in data.data_points {
                if metric.is_empty() {
                    warn!("Skipping imported series with an empty metric name");
                    continue;
                }
                let entry = series.entry(metric.clone()).or_default();
                for point in points {
                    if !point.value.is_finite() {
                        warn!(metric = %metric, "Skipping imported non-finite value");
                        continue;
                    }
                    entry.push_back(MetricDataPoint {
                        metric: metric.clone(),
                        ..point
                    });
                    imported += 1;
                }
                entry.make_contiguous().sort_by_key(|p| p.timestamp);
                while entry.len() > self.config.max_data_points {
                    entry.pop_front();
                }
            }
        }
        {
            let mut baselines = self.baselines.write();
            for (metric, windows) in data.baselines {
                baselines.entry(metric).or_default().extend(windows);
            }
        }

        info!(points = imported, "Imported baseline data");
        self.update_baselines();
        imported
    }

    pub fn export_data(&self) -> BaselineDataExport {
        BaselineDataExport {
            data_points: self
                .series
                .read()
                .iter()
                .map(|(metric, points)| (metric.clone(), points.iter().cloned().collect()))
                .collect(),
            baselines: self.baselines.read().clone(),
        }
    }

    /// Forget one metric's samples, baselines and anomalies.
    pub fn clear_metric(&self, metric: &str) -> bool {
        let had_series = self.series.write().remove(metric).is_some();
        let had_baselines = self.baselines.write().remove(metric).is_some();
        self.anomalies.lock().retain(|a| a.metric != metric);
        had_series || had_baselines
    }

    pub fn clear_all(&self) {
        self.series.write().clear();
        self.baselines.write().clear();
        self.anomalies.lock().clear();
        info!("Cleared all baseline data");
    }
}

impl Drop for BaselineLearner {
    fn drop(&mut self) {
        if let Some(token) = self.timer.get_mut().take() {
            token.cancel();
        }
    }
}
