//! Measurement session models.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Collecting,
    Completed,
    AutoStopped,
    ForceStopped,
    /// Closed at startup after being left open by a previous process.
    Recovered,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Collecting => "Collecting",
            SessionStatus::Completed => "Completed",
            SessionStatus::AutoStopped => "AutoStopped",
            SessionStatus::ForceStopped => "ForceStopped",
            SessionStatus::Recovered => "Recovered",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Collecting" => Some(SessionStatus::Collecting),
            "Completed" => Some(SessionStatus::Completed),
            "AutoStopped" => Some(SessionStatus::AutoStopped),
            "ForceStopped" => Some(SessionStatus::ForceStopped),
            "Recovered" => Some(SessionStatus::Recovered),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: u64,
    pub total_measurements: u64,
    pub status: SessionStatus,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Row returned by `list_sessions`: the session plus the file it lives in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_measurements: u64,
    pub status: SessionStatus,
    pub path: PathBuf,
}

impl SessionSummary {
    pub fn new(session: Session, path: PathBuf) -> Self {
        Self {
            id: session.id,
            start_time: session.start_time,
            end_time: session.end_time,
            total_measurements: session.total_measurements,
            status: session.status,
            path,
        }
    }
}
