use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Context;
use chrono::{DateTime, Local, NaiveDate, SubsecRound, Utc};
use log::{error, info, warn};
use serde::Serialize;
use tokio::{sync::Mutex, task::JoinHandle, time};
use uuid::Uuid;

use crate::db::{
    helpers::format_timestamp, Database, Measurement, Schema, Session, SessionStatus,
    SessionSummary,
};
use crate::error::{SessionError, SessionStateError, StorageError};
use crate::metrics::SessionStatistics;

use super::{SessionSnapshot, SessionState};

const FILE_PREFIX: &str = "measurements_";
const FILE_EXTENSION: &str = "sqlite";

/// File holding every session started on `date`.
pub fn session_file_name(date: NaiveDate) -> String {
    format!("{FILE_PREFIX}{}.{FILE_EXTENSION}", date.format("%Y-%m-%d"))
}

struct Inner {
    state: SessionState,
    store: Option<Database>,
}

#[derive(Serialize)]
struct SessionExport<'a> {
    session: &'a Session,
    measurements: &'a [Measurement],
}

const CSV_HEADER: [&str; 8] = [
    "DateTime",
    "O2_CONC",
    "CO_CONC",
    "AI_SAMPLE_TEMP",
    "AI_PUMP_FLOW",
    "FUME_LIMIT_MG_M3",
    "PERCENT_TO_LIMIT",
    "AIR_QUALITY",
];

/// One CSV line per measurement, in `CSV_HEADER` order.
#[derive(Serialize)]
struct CsvRow<'a> {
    date_time: String,
    o2_concentration: f64,
    co_concentration: f64,
    sample_temp: Option<f64>,
    sample_flow: Option<f64>,
    fume_limit_mg_m3: Option<f64>,
    percentage_to_limit: Option<f64>,
    air_quality: &'a str,
}

impl<'a> From<&'a Measurement> for CsvRow<'a> {
    fn from(m: &'a Measurement) -> Self {
        Self {
            date_time: format_timestamp(&m.timestamp),
            o2_concentration: m.o2_concentration,
            co_concentration: m.co_concentration,
            sample_temp: m.sample_temp,
            sample_flow: m.sample_flow,
            fume_limit_mg_m3: m.fume_limit_mg_m3,
            percentage_to_limit: m.percentage_to_limit,
            air_quality: m.air_quality_status.as_str(),
        }
    }
}

/// Owns the single-session state machine.
///
/// At most one session is open at a time. The inner lock is held across
/// the database write of every transition, so a measurement can never land
/// in a session that is being closed.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Mutex<Inner>>,
    auto_stop: Arc<Mutex<Option<JoinHandle<()>>>>,
    sessions_dir: Arc<PathBuf>,
    /// Open handles per session file, reused across queries.
    files: Arc<Mutex<HashMap<PathBuf, Database>>>,
}

impl SessionManager {
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::new(),
                store: None,
            })),
            auto_stop: Arc::new(Mutex::new(None)),
            sessions_dir: Arc::new(sessions_dir.into()),
            files: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn sessions_dir(&self) -> &Path {
        self.sessions_dir.as_path()
    }

    pub async fn is_collecting(&self) -> bool {
        self.inner.lock().await.state.is_collecting()
    }

    pub async fn status(&self) -> SessionSnapshot {
        SessionSnapshot::from(&self.inner.lock().await.state)
    }

    pub async fn start(&self, duration_minutes: u32) -> Result<PathBuf, SessionError> {
        self.start_with_budget(Duration::from_secs(u64::from(duration_minutes) * 60))
            .await
    }

    /// Open a session in today's file and arm its auto-stop deadline.
    pub async fn start_with_budget(&self, budget: Duration) -> Result<PathBuf, SessionError> {
        let (session_id, path) = {
            let mut inner = self.inner.lock().await;
            if inner.state.is_collecting() {
                return Err(SessionStateError::AlreadyCollecting.into());
            }

            let path = self
                .sessions_dir
                .join(session_file_name(Local::now().date_naive()));
            let db = self.open_file(&path).await?;

            let session_id = Uuid::new_v4().to_string();
            let started_at = Utc::now().trunc_subsecs(3);
            let session = Session {
                id: session_id.clone(),
                start_time: started_at,
                end_time: None,
                duration_seconds: budget.as_secs(),
                total_measurements: 0,
                status: SessionStatus::Collecting,
            };
            db.insert_session(&session).await?;

            inner.state.begin(
                session_id.clone(),
                budget.as_millis() as u64,
                started_at,
                path.clone(),
                Instant::now(),
            );
            inner.store = Some(db);
            (session_id, path)
        };

        info!(
            "Started measurement session {session_id} ({}s) in {}",
            budget.as_secs(),
            path.display()
        );
        self.arm_auto_stop(session_id, budget).await;
        Ok(path)
    }

    async fn arm_auto_stop(&self, session_id: String, budget: Duration) {
        let mut slot = self.auto_stop.lock().await;
        if let Some(handle) = slot.take() {
            handle.abort();
        }

        let manager = self.clone();
        *slot = Some(tokio::spawn(async move {
            time::sleep(budget).await;
            match manager.auto_stop(&session_id).await {
                Ok(Some(path)) => info!(
                    "Session {session_id} reached its duration, saved to {}",
                    path.display()
                ),
                Ok(None) => {}
                Err(err) => error!("Failed to auto-stop session {session_id}: {err}"),
            }
        }));
    }

    async fn cancel_auto_stop(&self) {
        if let Some(handle) = self.auto_stop.lock().await.take() {
            handle.abort();
        }
    }

    /// Append one sample to the open session with its derived fume metrics.
    ///
    /// CO and O2 must be finite. Non-finite temperature or flow is stored
    /// as missing.
    pub async fn add_measurement(
        &self,
        co_ppm: f64,
        o2_pct: f64,
        sample_temp: Option<f64>,
        sample_flow: Option<f64>,
    ) -> Result<Measurement, SessionError> {
        let mut inner = self.inner.lock().await;
        let (Some(session_id), Some(db)) = (inner.state.session_id.clone(), inner.store.clone())
        else {
            return Err(SessionStateError::NotCollecting.into());
        };
        if !co_ppm.is_finite() || !o2_pct.is_finite() {
            return Err(SessionError::NonFiniteReading {
                co: co_ppm,
                o2: o2_pct,
            });
        }

        let finite = |value: Option<f64>| value.filter(|v| v.is_finite());
        let timestamp = Utc::now().trunc_subsecs(3);
        let mut measurement = Measurement::new(
            session_id,
            timestamp,
            co_ppm,
            o2_pct,
            finite(sample_temp),
            finite(sample_flow),
        );
        let id = db.insert_measurement(&measurement).await?;
        measurement.id = Some(id);
        inner.state.measurement_count += 1;

        Ok(measurement)
    }

    /// Close the open session and return the file it lives in.
    pub async fn stop(&self) -> Result<PathBuf, SessionError> {
        self.cancel_auto_stop().await;
        self.finish(SessionStatus::Completed, None)
            .await?
            .ok_or_else(|| SessionStateError::NotCollecting.into())
    }

    /// Deadline-driven stop. A no-op if `session_id` is no longer open.
    async fn auto_stop(&self, session_id: &str) -> Result<Option<PathBuf>, SessionError> {
        self.finish(SessionStatus::AutoStopped, Some(session_id)).await
    }

    /// Shutdown path: closes the open session at "now", if there is one.
    pub async fn force_stop(&self) -> Result<Option<PathBuf>, SessionError> {
        self.cancel_auto_stop().await;
        let closed = self.finish(SessionStatus::ForceStopped, None).await?;
        if let Some(path) = &closed {
            warn!("Force-stopped open session, saved to {}", path.display());
        }
        Ok(closed)
    }

    /// The state always returns to idle, even when the final write fails.
    /// A session left open that way is closed by the next startup recovery.
    async fn finish(
        &self,
        status: SessionStatus,
        expected_id: Option<&str>,
    ) -> Result<Option<PathBuf>, SessionError> {
        let mut inner = self.inner.lock().await;
        if !inner.state.is_collecting() {
            return Ok(None);
        }

        let Some(session_id) = inner.state.session_id.clone() else {
            inner.state.clear();
            return Ok(None);
        };
        if expected_id.is_some_and(|expected| expected != session_id) {
            return Ok(None);
        }

        let count = inner.state.measurement_count;
        let path = inner.state.path.clone();
        let db = inner.store.take();
        inner.state.clear();

        if let Some(db) = db {
            db.close_session(&session_id, Utc::now(), count, status)
                .await?;
        }

        info!(
            "Session {session_id} closed as {} with {count} measurements",
            status.as_str()
        );
        Ok(path)
    }

    /// Close every session a previous process left open. The end time is
    /// the session's own last measurement, or its start time when it has
    /// none. Returns the number of sessions fixed.
    pub async fn recover_incomplete_sessions(&self) -> Result<usize, SessionError> {
        let current = self.inner.lock().await.state.session_id.clone();
        let mut fixed = 0;

        for path in self.session_files()? {
            let db = self.open_file(&path).await?;
            let open = db.get_open_sessions().await?;

            for session in open {
                if current.as_deref() == Some(session.id.as_str()) {
                    continue;
                }

                let end_time = recovered_end_time(&db, &session).await?;
                let count = db.count_measurements(&session.id).await?;
                db.close_session(&session.id, end_time, count, SessionStatus::Recovered)
                    .await?;

                warn!(
                    "Recovered incomplete session {} in {} (end {end_time}, {count} measurements)",
                    session.id,
                    path.display()
                );
                fixed += 1;
            }
        }

        Ok(fixed)
    }

    /// Cached handle for a session file. Opening spawns the file's worker
    /// thread and runs migrations, so it happens off the async runtime and
    /// only once per file.
    async fn open_file(&self, path: &Path) -> Result<Database, StorageError> {
        let mut files = self.files.lock().await;
        if let Some(db) = files.get(path) {
            return Ok(db.clone());
        }

        let owned = path.to_path_buf();
        let db = tokio::task::spawn_blocking(move || Database::open(owned, Schema::Session))
            .await
            .context("session file worker failed to join")??;
        files.insert(path.to_path_buf(), db.clone());
        Ok(db)
    }

    /// Session files on disk, oldest date first.
    fn session_files(&self) -> Result<Vec<PathBuf>, StorageError> {
        if !self.sessions_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(self.sessions_dir.as_path()).with_context(|| {
            format!(
                "failed to read sessions directory {}",
                self.sessions_dir.display()
            )
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.context("failed to read sessions directory entry")?.path();
            let is_session_file = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| {
                    name.starts_with(FILE_PREFIX) && name.ends_with(&format!(".{FILE_EXTENSION}"))
                });
            if is_session_file {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, SessionError> {
        let mut summaries = Vec::new();
        for path in self.session_files()? {
            let db = self.open_file(&path).await?;
            let sessions = db.list_sessions().await?;
            summaries.extend(
                sessions
                    .into_iter()
                    .map(|session| SessionSummary::new(session, path.clone())),
            );
        }
        summaries.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(summaries)
    }

    async fn locate(&self, session_id: &str) -> Result<(Database, Session), SessionError> {
        for path in self.session_files()? {
            let db = self.open_file(&path).await?;
            if let Some(session) = db.get_session(session_id).await? {
                return Ok((db, session));
            }
        }
        Err(SessionStateError::UnknownSession.into())
    }

    pub async fn find_session(&self, session_id: &str) -> Result<Session, SessionError> {
        Ok(self.locate(session_id).await?.1)
    }

    pub async fn session_measurements(
        &self,
        session_id: &str,
    ) -> Result<Vec<Measurement>, SessionError> {
        let (db, _) = self.locate(session_id).await?;
        Ok(db.get_measurements_for_session(session_id).await?)
    }

    pub async fn session_statistics(
        &self,
        session_id: &str,
    ) -> Result<SessionStatistics, SessionError> {
        let measurements = self.session_measurements(session_id).await?;
        Ok(SessionStatistics::from_measurements(&measurements))
    }

    /// Write the session record and its measurements as pretty JSON.
    pub async fn export_session_json(
        &self,
        session_id: &str,
        destination: &Path,
    ) -> Result<PathBuf, SessionError> {
        let (db, session) = self.locate(session_id).await?;
        let measurements = db.get_measurements_for_session(session_id).await?;

        let export = SessionExport {
            session: &session,
            measurements: &measurements,
        };
        let json = serde_json::to_string_pretty(&export)
            .context("failed to serialize session export")?;
        fs::write(destination, json)
            .with_context(|| format!("failed to write export to {}", destination.display()))?;

        Ok(destination.to_path_buf())
    }

    /// Write the session's measurements as CSV, one row per sample in
    /// time order. The header is written even for an empty session.
    pub async fn export_session_csv(
        &self,
        session_id: &str,
        destination: &Path,
    ) -> Result<PathBuf, SessionError> {
        let measurements = self.session_measurements(session_id).await?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(destination)
            .with_context(|| format!("failed to create {}", destination.display()))?;
        writer
            .write_record(CSV_HEADER)
            .context("failed to write CSV header")?;
        for measurement in &measurements {
            writer
                .serialize(CsvRow::from(measurement))
                .context("failed to write CSV row")?;
        }
        writer
            .flush()
            .with_context(|| format!("failed to flush {}", destination.display()))?;

        info!(
            "Exported {} measurements of session {session_id} to {}",
            measurements.len(),
            destination.display()
        );
        Ok(destination.to_path_buf())
    }
}

async fn recovered_end_time(
    db: &Database,
    session: &Session,
) -> Result<DateTime<Utc>, StorageError> {
    Ok(db
        .last_measurement_time(&session.id)
        .await?
        .unwrap_or(session.start_time))
}
