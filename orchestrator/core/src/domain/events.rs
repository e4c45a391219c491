// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::baseline::{BaselineAnomaly, MetricBaseline, MetricDataPoint, Severity};
use crate::domain::reconciliation::ReconciliationResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReconciliationEvent {
    Succeeded {
        result: ReconciliationResult,
    },
    DriftDetected {
        result: ReconciliationResult,
    },
}

impl ReconciliationEvent {
    pub fn result(&self) -> &ReconciliationResult {
        match self {
            ReconciliationEvent::Succeeded { result } => result,
            ReconciliationEvent::DriftDetected { result } => result,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BaselineEvent {
    MetricRecorded {
        point: MetricDataPoint,
    },
    BaselinesUpdated {
        /// metric -> window name -> baseline
        baselines: HashMap<String, HashMap<String, MetricBaseline>>,
        updated_at: DateTime<Utc>,
    },
    AnomalyDetected {
        anomaly: BaselineAnomaly,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    StateDrift,
    BaselineAnomaly,
}

impl IssueType {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueType::StateDrift => "state_drift",
            IssueType::BaselineAnomaly => "baseline_anomaly",
        }
    }
}

/// Full record behind an issue, for drill-down by the consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueEvidence {
    Reconciliation(Box<ReconciliationResult>),
    Anomaly(Box<BaselineAnomaly>),
}

/// Severity-tagged notification for the external escalation component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueDetected {
    pub issue_type: IssueType,
    pub severity: Severity,
    pub description: String,
    pub evidence: IssueEvidence,
    pub detected_at: DateTime<Utc>,
}

impl IssueDetected {
    pub fn state_drift(severity: Severity, result: ReconciliationResult) -> Self {
        Self {
            issue_type: IssueType::StateDrift,
            severity,
            description: format!(
                "State drift detected in domain '{}': {} field comparison(s) disagree",
                result.domain_name, result.drift_count
            ),
            evidence: IssueEvidence::Reconciliation(Box::new(result)),
            detected_at: Utc::now(),
        }
    }

    pub fn baseline_anomaly(anomaly: BaselineAnomaly) -> Self {
        Self {
            issue_type: IssueType::BaselineAnomaly,
            severity: anomaly.severity,
            description: format!(
                "Metric '{}' deviated from its {} baseline: value {} is {:.2}σ from mean {:.2}",
                anomaly.metric,
                anomaly.baseline.window,
                anomaly.value,
                anomaly.deviation_score,
                anomaly.baseline.mean
            ),
            evidence: IssueEvidence::Anomaly(Box::new(anomaly)),
            detected_at: Utc::now(),
        }
    }
}
