// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Monitor Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing:
// - Reconciler tuning (history cap, drift threshold)
// - Baseline learner tuning (windows, sample minimum, σ-thresholds, caps)
// - Declarative reconciliation domains and their sources

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::baseline::Severity;
use crate::domain::comparison::parse_path;

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "MonitorConfig";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Results retained in memory; oldest evicted first.
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Drift count at which an issue is raised (2× escalates to high).
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            drift_threshold: default_drift_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineWindow {
    pub name: String,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl BaselineWindow {
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
        }
    }
}

/// Minimum z-score for each severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            low: 2.0,
            medium: 3.0,
            high: 4.0,
            critical: 5.0,
        }
    }
}

impl AnomalyThresholds {
    /// Severity for a z-score, testing highest first. A score equal to a
    /// threshold classifies at that threshold's severity.
    pub fn classify(&self, z_score: f64) -> Option<Severity> {
        if z_score >= self.critical {
            Some(Severity::Critical)
        } else if z_score >= self.high {
            Some(Severity::High)
        } else if z_score >= self.medium {
            Some(Severity::Medium)
        } else if z_score >= self.low {
            Some(Severity::Low)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineLearnerConfig {
    #[serde(default = "default_windows")]
    pub windows: Vec<BaselineWindow>,

    #[serde(default = "default_min_samples")]
    pub min_samples_for_baseline: usize,

    #[serde(default)]
    pub anomaly_thresholds: AnomalyThresholds,

    /// Per-metric sample cap; oldest evicted first.
    #[serde(default = "default_max_data_points")]
    pub max_data_points: usize,

    /// Baseline recompute period.
    #[serde(default = "default_update_interval", with = "humantime_serde")]
    pub update_interval: Duration,
}

impl Default for BaselineLearnerConfig {
    fn default() -> Self {
        Self {
            windows: default_windows(),
            min_samples_for_baseline: default_min_samples(),
            anomaly_thresholds: AnomalyThresholds::default(),
            max_data_points: default_max_data_points(),
            update_interval: default_update_interval(),
        }
    }
}

impl BaselineLearnerConfig {
    /// Window used for anomaly detection. The first one wins a tie.
    pub fn shortest_window(&self) -> Option<&BaselineWindow> {
        let mut shortest: Option<&BaselineWindow> = None;
        for window in &self.windows {
            match shortest {
                Some(current) if window.duration >= current.duration => {}
                _ => shortest = Some(window),
            }
        }
        shortest
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.windows.is_empty() {
            return Err(invalid("baseline.windows must contain at least one window"));
        }
        let mut names = HashSet::new();
        for window in &self.windows {
            if window.name.is_empty() {
                return Err(invalid("baseline window name cannot be empty"));
            }
            if window.duration.is_zero() {
                return Err(invalid(format!(
                    "baseline window '{}' must have a non-zero duration",
                    window.name
                )));
            }
            if !names.insert(window.name.as_str()) {
                return Err(invalid(format!("duplicate baseline window '{}'", window.name)));
            }
        }
        if self.min_samples_for_baseline == 0 {
            return Err(invalid("baseline.min_samples_for_baseline must be at least 1"));
        }
        if self.max_data_points == 0 {
            return Err(invalid("baseline.max_data_points must be at least 1"));
        }
        if self.update_interval.is_zero() {
            return Err(invalid("baseline.update_interval must be non-zero"));
        }
        let t = &self.anomaly_thresholds;
        if !(t.low > 0.0 && t.low < t.medium && t.medium < t.high && t.high < t.critical) {
            return Err(invalid(
                "baseline.anomaly_thresholds must satisfy 0 < low < medium < high < critical",
            ));
        }
        Ok(())
    }
}

impl ReconcilerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_history == 0 {
            return Err(invalid("reconciler.max_history must be at least 1"));
        }
        if self.drift_threshold == 0 {
            return Err(invalid("reconciler.drift_threshold must be at least 1"));
        }
        Ok(())
    }
}

/// How a configured source obtains its snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceEndpoint {
    /// GET a JSON object from `url`.
    Http {
        url: String,
        #[serde(default = "default_http_timeout", with = "humantime_serde")]
        timeout: Duration,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
    /// Fixed inline snapshot.
    Static {
        #[serde(default)]
        snapshot: Map<String, Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    #[serde(default = "default_source_kind")]
    pub kind: String,
    #[serde(default)]
    pub priority: i32,
    pub endpoint: SourceEndpoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainConfig {
    pub id: String,
    pub name: String,
    pub fields: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub sources: Vec<SourceConfig>,
}

impl DomainConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(invalid("domain id cannot be empty"));
        }
        if self.sources.len() < 2 {
            return Err(invalid(format!(
                "domain '{}' needs at least two sources to reconcile",
                self.id
            )));
        }
        if self.fields.is_empty() {
            return Err(invalid(format!("domain '{}' has no fields to compare", self.id)));
        }
        for field in &self.fields {
            parse_path(field)
                .map_err(|e| invalid(format!("domain '{}': {}", self.id, e)))?;
        }
        if self.interval.is_zero() {
            return Err(invalid(format!("domain '{}' must have a non-zero interval", self.id)));
        }
        let mut source_ids = HashSet::new();
        for source in &self.sources {
            if source.id.is_empty() {
                return Err(invalid(format!("domain '{}' has a source with an empty id", self.id)));
            }
            if !source_ids.insert(source.id.as_str()) {
                return Err(invalid(format!(
                    "domain '{}' has duplicate source '{}'",
                    self.id, source.id
                )));
            }
            if let SourceEndpoint::Http { url, .. } = &source.endpoint {
                if url.is_empty() {
                    return Err(invalid(format!("source '{}' has an empty url", source.id)));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfigSpec {
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub baseline: BaselineLearnerConfig,
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
}

/// Top-level monitor configuration manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: ManifestMetadata,
    #[serde(default)]
    pub spec: MonitorConfigSpec,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "aegis-monitor".to_string(),
                version: None,
            },
            spec: MonitorConfigSpec::default(),
        }
    }
}

impl MonitorConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Env var -> working directory -> user home -> system.
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("AEGIS_MONITOR_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./aegis-monitor.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".aegis").join("monitor.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/aegis/monitor.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    pub fn load_or_default(cli_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        if let Some(path) = cli_path {
            tracing::info!("Loading monitor configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(path) => {
                tracing::info!("Loading monitor configuration from discovered path: {:?}", path);
                Self::from_yaml_file(path)?
            }
            None => {
                tracing::warn!("No monitor configuration found in standard locations. Using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(threshold) = env_parse::<usize>("AEGIS_MONITOR_DRIFT_THRESHOLD") {
            self.spec.reconciler.drift_threshold = threshold;
        }
        if let Some(max_history) = env_parse::<usize>("AEGIS_MONITOR_MAX_HISTORY") {
            self.spec.reconciler.max_history = max_history;
        }
        if let Ok(raw) = std::env::var("AEGIS_MONITOR_UPDATE_INTERVAL") {
            match humantime_serde::re::humantime::parse_duration(&raw) {
                Ok(interval) => self.spec.baseline.update_interval = interval,
                Err(e) => tracing::warn!("Ignoring AEGIS_MONITOR_UPDATE_INTERVAL={}: {}", raw, e),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version != API_VERSION {
            return Err(invalid(format!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version, API_VERSION
            )));
        }
        if self.kind != KIND {
            return Err(invalid(format!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND)));
        }
        if self.metadata.name.is_empty() {
            return Err(invalid("metadata.name cannot be empty"));
        }

        self.spec.reconciler.validate()?;
        self.spec.baseline.validate()?;

        let mut domain_ids = HashSet::new();
        for domain in &self.spec.domains {
            domain.validate()?;
            if !domain_ids.insert(domain.id.as_str()) {
                return Err(invalid(format!("duplicate domain '{}'", domain.id)));
            }
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {}={}", key, raw);
            None
        }
    }
}

fn default_max_history() -> usize {
    500
}

fn default_drift_threshold() -> usize {
    3
}

fn default_windows() -> Vec<BaselineWindow> {
    vec![
        BaselineWindow::new("5min", Duration::from_secs(5 * 60)),
        BaselineWindow::new("1hour", Duration::from_secs(60 * 60)),
        BaselineWindow::new("1day", Duration::from_secs(24 * 60 * 60)),
    ]
}

fn default_min_samples() -> usize {
    10
}

fn default_max_data_points() -> usize {
    10_000
}

fn default_update_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_source_kind() -> String {
    "generic".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
apiVersion: 100monkeys.ai/v1
kind: MonitorConfig
metadata:
  name: staging-monitor
spec:
  reconciler:
    drift_threshold: 2
  baseline:
    windows:
      - name: 1min
        duration: 1m
      - name: 10min
        duration: 10m
    update_interval: 30s
  domains:
    - id: agent-registry
      name: Agent Registry
      fields: [status, spec.runtime.version]
      interval: 15s
      sources:
        - id: db
          name: Database
          kind: postgres
          priority: 10
          endpoint:
            type: http
            url: http://localhost:8000/api/agents/snapshot
        - id: cache
          name: Cache
          priority: 1
          endpoint:
            type: static
            snapshot:
              status: running
"#;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.spec.reconciler.max_history, 500);
        assert_eq!(config.spec.reconciler.drift_threshold, 3);
        assert_eq!(config.spec.baseline.windows.len(), 3);
        assert_eq!(config.spec.baseline.min_samples_for_baseline, 10);
        assert_eq!(config.spec.baseline.max_data_points, 10_000);
        assert_eq!(config.spec.baseline.update_interval, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_sample_manifest() {
        let config = MonitorConfig::from_yaml_str(SAMPLE).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.spec.reconciler.drift_threshold, 2);
        assert_eq!(config.spec.reconciler.max_history, 500);
        assert_eq!(config.spec.baseline.update_interval, Duration::from_secs(30));
        assert_eq!(config.spec.baseline.min_samples_for_baseline, 10);

        let domain = &config.spec.domains[0];
        assert_eq!(domain.interval, Duration::from_secs(15));
        assert!(domain.enabled);
        assert_eq!(domain.sources[1].kind, "generic");
        match &domain.sources[0].endpoint {
            SourceEndpoint::Http { url, timeout, .. } => {
                assert!(url.ends_with("/snapshot"));
                assert_eq!(*timeout, Duration::from_secs(10));
            }
            other => panic!("unexpected endpoint {:?}", other),
        }
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = MonitorConfig::from_yaml_str(SAMPLE).unwrap();
        let yaml = config.to_yaml_string().unwrap();
        assert_eq!(MonitorConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = MonitorConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.metadata.name, "staging-monitor");
        assert!(matches!(
            MonitorConfig::from_yaml_file(dir.path().join("missing.yaml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_validation() {
        let mut config = MonitorConfig::from_yaml_str(SAMPLE).unwrap();
        config.spec.baseline.anomaly_thresholds.high = 6.0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::from_yaml_str(SAMPLE).unwrap();
        config.spec.domains[0].sources.pop();
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::from_yaml_str(SAMPLE).unwrap();
        config.spec.domains[0].fields.push("spec..runtime".to_string());
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::from_yaml_str(SAMPLE).unwrap();
        let duplicate = config.spec.domains[0].clone();
        config.spec.domains.push(duplicate);
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.kind = "NodeConfig".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_boundaries() {
        let t = AnomalyThresholds::default();
        assert_eq!(t.classify(1.99), None);
        assert_eq!(t.classify(2.0), Some(Severity::Low));
        assert_eq!(t.classify(3.0), Some(Severity::Medium));
        assert_eq!(t.classify(4.0), Some(Severity::High));
        assert_eq!(t.classify(5.0), Some(Severity::Critical));
        assert_eq!(t.classify(400.0), Some(Severity::Critical));
    }

    #[test]
    fn test_shortest_window() {
        let mut config = BaselineLearnerConfig::default();
        assert_eq!(config.shortest_window().unwrap().name, "5min");

        config.windows = vec![
            BaselineWindow::new("day", Duration::from_secs(86_400)),
            BaselineWindow::new("a", Duration::from_secs(60)),
            BaselineWindow::new("b", Duration::from_secs(60)),
        ];
        assert_eq!(config.shortest_window().unwrap().name, "a");
    }
}
