//! Cooperative multi-cadence polling loop.
//!
//! One loop, four independent due-times. On every tick the sweeps are
//! evaluated in a fixed priority order and each due sweep runs to
//! completion before the next is considered, so a slow or retrying fetch
//! delays everything behind it in the same tick. A failed sweep still
//! counts as fired; it is retried no sooner than its own interval.

use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::AnalyserConfig;
use crate::error::{SessionStateError, TransportError};
use crate::instrument::{
    ConnectionEvent, ConnectionStateTracker, InstrumentSource, StatusLog, TagReadings,
};
use crate::session::SessionManager;
use crate::store::TimeSeriesStore;
use crate::tags::{CO_TAG, O2_TAG, PUMP_FLOW_TAG, SAMPLE_TEMP_TAG};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SweepKind {
    AllValues,
    Concentration,
    StatusWarnings,
    ConnectionCheck,
}

impl SweepKind {
    /// Evaluation order within one tick.
    pub const PRIORITY: [SweepKind; 4] = [
        SweepKind::AllValues,
        SweepKind::Concentration,
        SweepKind::StatusWarnings,
        SweepKind::ConnectionCheck,
    ];

    fn index(self) -> usize {
        match self {
            SweepKind::AllValues => 0,
            SweepKind::Concentration => 1,
            SweepKind::StatusWarnings => 2,
            SweepKind::ConnectionCheck => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SweepKind::AllValues => "all_values",
            SweepKind::Concentration => "concentration",
            SweepKind::StatusWarnings => "status_warnings",
            SweepKind::ConnectionCheck => "connection_check",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepIntervals {
    pub all_values: Duration,
    pub concentration: Duration,
    pub status_warnings: Duration,
    pub connection_check: Duration,
    /// Sleep between loop iterations.
    pub tick: Duration,
}

impl Default for SweepIntervals {
    fn default() -> Self {
        Self {
            all_values: Duration::from_secs(300),
            concentration: Duration::from_millis(1500),
            status_warnings: Duration::from_secs(30),
            connection_check: Duration::from_secs(300),
            tick: Duration::from_millis(100),
        }
    }
}

impl SweepIntervals {
    pub fn interval(&self, kind: SweepKind) -> Duration {
        match kind {
            SweepKind::AllValues => self.all_values,
            SweepKind::Concentration => self.concentration,
            SweepKind::StatusWarnings => self.status_warnings,
            SweepKind::ConnectionCheck => self.connection_check,
        }
    }
}

pub struct PollingScheduler {
    source: Arc<dyn InstrumentSource>,
    store: TimeSeriesStore,
    sessions: SessionManager,
    tracker: ConnectionStateTracker,
    status_log: Option<StatusLog>,
    intervals: SweepIntervals,
    last_fired: [Instant; 4],
    concentration_tags: HashSet<String>,
    status_tags: HashSet<String>,
}

impl PollingScheduler {
    /// All due-times start at construction, so nothing fires until its
    /// first interval has elapsed.
    pub fn new(
        source: Arc<dyn InstrumentSource>,
        store: TimeSeriesStore,
        sessions: SessionManager,
        tracker: ConnectionStateTracker,
        config: &AnalyserConfig,
    ) -> Self {
        Self {
            source,
            store,
            sessions,
            tracker,
            status_log: None,
            intervals: config.sweep_intervals(),
            last_fired: [Instant::now(); 4],
            concentration_tags: config.concentration_filter(),
            status_tags: config.status_filter(),
        }
    }

    pub fn with_status_log(mut self, status_log: StatusLog) -> Self {
        self.status_log = Some(status_log);
        self
    }

    pub fn intervals(&self) -> SweepIntervals {
        self.intervals
    }

    pub fn tracker(&self) -> &ConnectionStateTracker {
        &self.tracker
    }

    /// Run every sweep that is due at `now`, in priority order. Returns the
    /// sweeps that fired.
    pub async fn tick(&mut self, now: Instant) -> Vec<SweepKind> {
        let mut fired = Vec::new();

        for kind in SweepKind::PRIORITY {
            let last = self.last_fired[kind.index()];
            if now.saturating_duration_since(last) < self.intervals.interval(kind) {
                continue;
            }

            self.run_sweep(kind).await;
            self.last_fired[kind.index()] = now;
            fired.push(kind);
        }

        fired
    }

    async fn run_sweep(&mut self, kind: SweepKind) {
        if kind == SweepKind::ConnectionCheck {
            self.check_connection().await;
            return;
        }

        let readings = match self.fetch().await {
            Ok(readings) => readings,
            Err(err) => {
                log_error!("{} sweep failed: {err}", kind.as_str());
                return;
            }
        };

        let filter = match kind {
            SweepKind::Concentration => Some(&self.concentration_tags),
            SweepKind::StatusWarnings => Some(&self.status_tags),
            SweepKind::AllValues | SweepKind::ConnectionCheck => None,
        };

        match self.store.append_batch(&readings, Utc::now(), filter).await {
            Ok(outcome) => log_info!(
                "{} sweep stored {} values ({} unknown, {} filtered)",
                kind.as_str(),
                outcome.stored,
                outcome.unknown,
                outcome.filtered
            ),
            Err(err) => log_error!("{} sweep lost its sample: {err}", kind.as_str()),
        }

        if kind == SweepKind::Concentration {
            self.feed_session(&readings).await;
        }
    }

    /// Re-test connectivity. Returns whether the instrument answered.
    pub async fn check_connection(&mut self) -> bool {
        match self.fetch().await {
            Ok(_) => true,
            Err(err) => {
                log_warn!("Connection check against {} failed: {err}", self.source.describe());
                false
            }
        }
    }

    /// One blocking fetch on the blocking pool. Every outcome feeds the
    /// connection tracker.
    async fn fetch(&mut self) -> Result<TagReadings, TransportError> {
        let source = Arc::clone(&self.source);
        let result = match tokio::task::spawn_blocking(move || source.fetch()).await {
            Ok(result) => result,
            Err(err) => Err(TransportError::Worker(err.to_string())),
        };

        let event = match &result {
            Ok(_) => self.tracker.record_success(),
            Err(err) => self.tracker.record_failure(err.to_string()),
        };
        if let Some(event) = event {
            self.publish(event);
        }

        result
    }

    fn publish(&self, event: ConnectionEvent) {
        match &event {
            ConnectionEvent::Connected => {
                log_info!("Instrument {} connected", self.source.describe())
            }
            ConnectionEvent::Disconnected { detail } => {
                log_warn!("Instrument {} disconnected: {detail}", self.source.describe())
            }
        }
        if let Some(status_log) = &self.status_log {
            status_log.append(&event.status_line());
        }
    }

    async fn feed_session(&self, readings: &TagReadings) {
        if !self.sessions.is_collecting().await {
            return;
        }

        let number = |tag: &str| {
            readings
                .get(tag)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };
        let (Some(co), Some(o2)) = (number(CO_TAG), number(O2_TAG)) else {
            log_warn!("Concentration sweep missing CO or O2; no session measurement");
            return;
        };

        match self
            .sessions
            .add_measurement(co, o2, number(SAMPLE_TEMP_TAG), number(PUMP_FLOW_TAG))
            .await
        {
            Ok(_) => {}
            // The session closed between the check and the write.
            Err(err) if err.is_state(SessionStateError::NotCollecting) => {}
            Err(err) => log_error!("Failed to record session measurement: {err}"),
        }
    }
}

/// Drive the scheduler until `cancel_token` fires. Cancellation is observed
/// between ticks; an in-flight fetch always completes first.
pub async fn polling_loop(mut scheduler: PollingScheduler, cancel_token: CancellationToken) {
    log_info!("Polling loop started");
    scheduler.check_connection().await;

    let tick = scheduler.intervals.tick;
    loop {
        if cancel_token.is_cancelled() {
            break;
        }

        scheduler.tick(Instant::now()).await;

        tokio::select! {
            _ = tokio::time::sleep(tick) => {}
            _ = cancel_token.cancelled() => break,
        }
    }

    log_info!("Polling loop shutting down");
}
