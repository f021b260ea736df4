use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::reports::{IncidentType, Severity};

/// A registered local user. Immutable after registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub username: String,
    pub email: String,
    /// bcrypt hash of the 8-digit PIN; never serialized to clients.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub credential: String,
    pub joined_at: DateTime<Utc>,
}

impl Identity {
    /// Copy safe to hand to the presentation layer.
    pub fn public(&self) -> Identity {
        Identity {
            credential: String::new(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Approved,
    Resolved,
}

/// Local-only delivery flag. Moves from `PendingSync` to `Synced`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    PendingSync,
    Synced,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingSync => "pending_sync",
            Self::Synced => "synced",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: i64,
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    pub severity: Severity,
    pub notes: Option<String>,
    pub image: Option<String>,
    pub status: WorkflowStatus,
    pub sync_state: SyncState,
    pub reporter_username: String,
    pub coordinates: Option<Coordinates>,
    pub created_at: DateTime<Utc>,
    pub created_at_display: String,
}

impl Report {
    pub fn is_pending_sync(&self) -> bool {
        self.sync_state == SyncState::PendingSync
    }

    /// The only mutation the core performs on a stored report.
    pub fn mark_synced(mut self) -> Self {
        self.sync_state = SyncState::Synced;
        self
    }
}
