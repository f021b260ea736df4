use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::RemoteConfig;
use crate::db::models::{Coordinates, Report, WorkflowStatus};
use crate::reports::{IncidentType, Severity};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote rejected document ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Remote client misconfigured: {0}")]
    Config(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Network(format!("request timed out: {}", err))
        } else {
            RemoteError::Network(err.to_string())
        }
    }
}

/// The document the remote side stores for a report.
///
/// Carries only domain fields; the local `syncState` flag never leaves the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteReport {
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    pub severity: Severity,
    pub notes: Option<String>,
    pub image: Option<String>,
    pub status: WorkflowStatus,
    pub reporter_username: String,
    pub coordinates: Option<Coordinates>,
    pub created_at: DateTime<Utc>,
    pub created_at_display: String,
}

impl From<&Report> for RemoteReport {
    fn from(report: &Report) -> Self {
        Self {
            incident_type: report.incident_type,
            severity: report.severity,
            notes: report.notes.clone(),
            image: report.image.clone(),
            status: report.status,
            reporter_username: report.reporter_username.clone(),
            coordinates: report.coordinates,
            created_at: report.created_at,
            created_at_display: report.created_at_display.clone(),
        }
    }
}

/// Remote document store. Upserts are idempotent by `(collection, id)`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        document: &RemoteReport,
    ) -> Result<(), RemoteError>;

    /// Whether the remote answers at all. Used by the connectivity probe.
    async fn is_reachable(&self) -> bool {
        true
    }
}

/// Type alias for Arc-wrapped remote store (for AppState)
pub type DynRemoteStore = Arc<dyn RemoteStore>;

/// REST binding: `PUT {base_url}/{collection}/{id}` with the JSON document.
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRemoteStore {
    /// Returns `None` when no remote URL is configured.
    pub fn from_config(config: &RemoteConfig) -> Result<Option<Self>, RemoteError> {
        let Some(ref url) = config.url else {
            return Ok(None);
        };

        let base_url = url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(RemoteError::Config(format!("invalid remote url: {}", url)));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Some(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        }))
    }

    pub fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, id)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        document: &RemoteReport,
    ) -> Result<(), RemoteError> {
        let mut request = self
            .client
            .put(self.document_url(collection, id))
            .json(document);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn is_reachable(&self) -> bool {
        match self.client.get(&self.base_url).send().await {
            Ok(response) => !response.status().is_server_error(),
            Err(e) => {
                tracing::debug!("Remote probe failed: {}", e);
                false
            }
        }
    }
}
