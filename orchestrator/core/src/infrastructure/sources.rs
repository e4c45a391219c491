// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Snapshot Provider Adapters
//!
//! Concrete [`SnapshotProvider`]s for the reconciler, plus the mapping from a
//! declarative [`DomainConfig`] to a live [`ReconciliationDomain`].
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Adapts HTTP endpoints, inline snapshots and in-process
//!   closures to the domain's `SnapshotProvider` port

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::monitor_config::{ConfigError, DomainConfig, SourceConfig, SourceEndpoint};
use crate::domain::reconciliation::{
    DomainId, ReconciliationDomain, Snapshot, SnapshotProvider, SourceError, StateSource,
};

/// Returns a fixed snapshot that can be swapped at runtime.
#[derive(Default)]
pub struct StaticSnapshotProvider {
    snapshot: RwLock<Snapshot>,
}

impl StaticSnapshotProvider {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
        }
    }

    /// Build from a JSON value; anything other than an object yields an empty snapshot.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::new(map),
            _ => Self::default(),
        }
    }

    pub fn replace(&self, snapshot: Snapshot) {
        *self.snapshot.write() = snapshot;
    }
}

#[async_trait]
impl SnapshotProvider for StaticSnapshotProvider {
    async fn fetch_snapshot(&self) -> Result<Snapshot, SourceError> {
        Ok(self.snapshot.read().clone())
    }
}

type SnapshotFn = dyn Fn() -> BoxFuture<'static, Result<Snapshot, SourceError>> + Send + Sync;

/// Wraps an async closure, for exposing in-process state as a source.
pub struct FnSnapshotProvider {
    fetch: Box<SnapshotFn>,
}

impl FnSnapshotProvider {
    pub fn new<F>(fetch: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Snapshot, SourceError>> + Send + Sync + 'static,
    {
        Self {
            fetch: Box::new(fetch),
        }
    }
}

#[async_trait]
impl SnapshotProvider for FnSnapshotProvider {
    async fn fetch_snapshot(&self) -> Result<Snapshot, SourceError> {
        (self.fetch)().await
    }
}

/// GETs a JSON object from an HTTP endpoint.
pub struct HttpSnapshotProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpSnapshotProvider {
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        headers: &std::collections::HashMap<String, String>,
    ) -> Result<Self, SourceError> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SourceError::FetchFailed(format!("invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SourceError::FetchFailed(format!("invalid header value: {}", e)))?;
            header_map.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(header_map)
            .build()
            .map_err(|e| SourceError::FetchFailed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SnapshotProvider for HttpSnapshotProvider {
    async fn fetch_snapshot(&self) -> Result<Snapshot, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SourceError::FetchFailed(format!("GET {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::FetchFailed(format!("invalid JSON from {}: {}", self.url, e)))?;

        match body {
            Value::Object(map) => Ok(map),
            _ => Err(SourceError::NotAnObject),
        }
    }
}

fn build_source(config: &SourceConfig) -> Result<StateSource, ConfigError> {
    let provider: Arc<dyn SnapshotProvider> = match &config.endpoint {
        SourceEndpoint::Http {
            url,
            timeout,
            headers,
        } => Arc::new(
            HttpSnapshotProvider::new(url.clone(), *timeout, headers)
                .map_err(|e| ConfigError::Invalid(format!("source '{}': {}", config.id, e)))?,
        ),
        SourceEndpoint::Static { snapshot } => {
            Arc::new(StaticSnapshotProvider::new(snapshot.clone()))
        }
    };

    Ok(StateSource::new(
        config.id.clone(),
        config.name.clone(),
        config.kind.clone(),
        config.priority,
        provider,
    ))
}

/// Turn a validated domain definition into a registrable domain.
pub fn build_domain(config: &DomainConfig) -> Result<ReconciliationDomain, ConfigError> {
    let sources = config
        .sources
        .iter()
        .map(build_source)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ReconciliationDomain {
        id: DomainId::new(config.id.clone()),
        name: config.name.clone(),
        sources,
        fields: config.fields.clone(),
        interval: config.interval,
        enabled: config.enabled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use serde_json::json;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_static_provider_replace() {
        let provider = StaticSnapshotProvider::from_value(json!({"status": "done"}));
        let snap = provider.fetch_snapshot().await.unwrap();
        assert_eq!(snap.get("status"), Some(&json!("done")));

        let mut next = Snapshot::new();
        next.insert("status".to_string(), json!("pending"));
        provider.replace(next);
        let snap = provider.fetch_snapshot().await.unwrap();
        assert_eq!(snap.get("status"), Some(&json!("pending")));
    }

    #[tokio::test]
    async fn test_fn_provider() {
        let provider = FnSnapshotProvider::new(|| {
            async { Err(SourceError::FetchFailed("offline".to_string())) }.boxed()
        });
        let err = provider.fetch_snapshot().await.unwrap_err();
        assert_eq!(err.to_string(), "Snapshot fetch failed: offline");
    }

    #[test]
    fn test_build_domain_from_config() {
        let config = DomainConfig {
            id: "agents".to_string(),
            name: "Agents".to_string(),
            fields: vec!["status".to_string()],
            interval: Duration::from_secs(5),
            enabled: true,
            sources: vec![
                SourceConfig {
                    id: "db".to_string(),
                    name: "Database".to_string(),
                    kind: "postgres".to_string(),
                    priority: 10,
                    endpoint: SourceEndpoint::Http {
                        url: "http://127.0.0.1:9/snapshot".to_string(),
                        timeout: Duration::from_secs(1),
                        headers: HashMap::from([("x-api-key".to_string(), "k".to_string())]),
                    },
                },
                SourceConfig {
                    id: "cache".to_string(),
                    name: "Cache".to_string(),
                    kind: "redis".to_string(),
                    priority: 1,
                    endpoint: SourceEndpoint::Static {
                        snapshot: Snapshot::new(),
                    },
                },
            ],
        };

        let domain = build_domain(&config).unwrap();
        assert_eq!(domain.id, DomainId::new("agents"));
        assert_eq!(domain.sources.len(), 2);
        assert_eq!(domain.source_of_truth().unwrap().name, "Database");
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let headers = HashMap::from([("bad header".to_string(), "v".to_string())]);
        assert!(HttpSnapshotProvider::new("http://localhost", Duration::from_secs(1), &headers).is_err());
    }
}
