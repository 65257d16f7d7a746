use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CollectionStatus {
    #[default]
    Idle,
    Collecting,
}

/// In-memory view of the open session, if any.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub status: CollectionStatus,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub budget_ms: u64,
    pub measurement_count: u64,
    pub path: Option<PathBuf>,
    #[serde(skip)]
    pub running_anchor: Option<Instant>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_collecting(&self) -> bool {
        self.status == CollectionStatus::Collecting
    }

    pub fn elapsed_ms(&self) -> u64 {
        match (self.status, self.running_anchor) {
            (CollectionStatus::Collecting, Some(anchor)) => anchor.elapsed().as_millis() as u64,
            _ => 0,
        }
    }

    pub fn remaining_ms(&self) -> u64 {
        match self.status {
            CollectionStatus::Idle => 0,
            CollectionStatus::Collecting => self.budget_ms.saturating_sub(self.elapsed_ms()),
        }
    }

    pub fn begin(
        &mut self,
        session_id: String,
        budget_ms: u64,
        started_at: DateTime<Utc>,
        path: PathBuf,
        now: Instant,
    ) {
        *self = Self {
            status: CollectionStatus::Collecting,
            session_id: Some(session_id),
            started_at: Some(started_at),
            budget_ms,
            measurement_count: 0,
            path: Some(path),
            running_anchor: Some(now),
        };
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// What `session_status()` reports to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub collecting: bool,
    pub session_id: Option<String>,
    pub elapsed_seconds: u64,
    pub remaining_seconds: u64,
    pub measurement_count: u64,
    pub path: Option<PathBuf>,
}

impl From<&SessionState> for SessionSnapshot {
    fn from(state: &SessionState) -> Self {
        Self {
            collecting: state.is_collecting(),
            session_id: state.session_id.clone(),
            elapsed_seconds: state.elapsed_ms() / 1000,
            remaining_seconds: state.remaining_ms().div_ceil(1000),
            measurement_count: state.measurement_count,
            path: state.path.clone(),
        }
    }
}
