//! Outbound surface of the collector.
//!
//! Thin wrappers over the store and the session manager, shaped for a UI or
//! a remote caller. Errors stay typed so callers can tell a session misuse
//! from a storage failure.

use std::{collections::BTreeMap, path::Path, path::PathBuf, time::Duration};

use chrono::{DateTime, Utc};

use crate::{
    db::{Measurement, Session, SessionSummary, TagValue},
    error::{SessionError, StorageError},
    instrument::ConnectionState,
    metrics::SessionStatistics,
    session::SessionSnapshot,
    store::{LatestMeasurements, StoreStatus},
    AppState,
};

pub async fn fetch_latest(state: &AppState, tag_name: &str) -> Result<Option<TagValue>, StorageError> {
    state.store.get_latest(tag_name).await
}

/// Values stored in the last `duration_secs`. Without a tag name every tag
/// is returned.
pub async fn fetch_recent(
    state: &AppState,
    tag_name: Option<&str>,
    duration_secs: u64,
) -> Result<Vec<TagValue>, StorageError> {
    state
        .store
        .get_recent(tag_name, Duration::from_secs(duration_secs))
        .await
}

pub async fn fetch_history(
    state: &AppState,
    duration_secs: u64,
) -> Result<BTreeMap<String, Vec<(DateTime<Utc>, f64)>>, StorageError> {
    state.store.history(Duration::from_secs(duration_secs)).await
}

pub async fn latest_measurements(state: &AppState) -> Result<LatestMeasurements, StorageError> {
    state.store.latest_measurements().await
}

pub async fn store_status(state: &AppState) -> Result<StoreStatus, StorageError> {
    state.store.status().await
}

/// Format a raw value with the tag's precision and units.
pub fn format_tag_value(state: &AppState, tag_name: &str, raw: &str, include_units: bool) -> String {
    state.store.registry().format_value(tag_name, raw, include_units)
}

/// Start a session. `None` uses the configured default duration.
pub async fn start_session(
    state: &AppState,
    duration_minutes: Option<u32>,
) -> Result<PathBuf, SessionError> {
    let minutes = duration_minutes.unwrap_or(state.config.session.default_duration_minutes);
    state.sessions.start(minutes).await
}

pub async fn stop_session(state: &AppState) -> Result<PathBuf, SessionError> {
    state.sessions.stop().await
}

pub async fn session_status(state: &AppState) -> SessionSnapshot {
    state.sessions.status().await
}

pub async fn list_sessions(state: &AppState) -> Result<Vec<SessionSummary>, SessionError> {
    state.sessions.list_sessions().await
}

pub async fn get_session(state: &AppState, session_id: &str) -> Result<Session, SessionError> {
    state.sessions.find_session(session_id).await
}

pub async fn session_measurements(
    state: &AppState,
    session_id: &str,
) -> Result<Vec<Measurement>, SessionError> {
    state.sessions.session_measurements(session_id).await
}

pub async fn session_statistics(
    state: &AppState,
    session_id: &str,
) -> Result<SessionStatistics, SessionError> {
    state.sessions.session_statistics(session_id).await
}

pub async fn export_session_json(
    state: &AppState,
    session_id: &str,
    destination: &Path,
) -> Result<PathBuf, SessionError> {
    state
        .sessions
        .export_session_json(session_id, destination)
        .await
}

pub async fn export_session_csv(
    state: &AppState,
    session_id: &str,
    destination: &Path,
) -> Result<PathBuf, SessionError> {
    state
        .sessions
        .export_session_csv(session_id, destination)
        .await
}

pub fn connection_state(state: &AppState) -> ConnectionState {
    *state.connection.borrow()
}
