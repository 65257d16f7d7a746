pub mod collector;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod instrument;
pub mod metrics;
pub mod session;
pub mod store;
pub mod tags;
mod utils;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::sync::watch;

use collector::{CollectorController, PollingScheduler};
use config::AnalyserConfig;
use db::{Database, Schema};
use instrument::{
    ConnectionState, ConnectionStateTracker, InstrumentClient, InstrumentSource,
    SimulatedInstrument, StatusLog,
};
use session::SessionManager;
use store::TimeSeriesStore;
use tags::{TagRegistry, REQUIRED_TAGS};

/// Handles shared by every outbound command.
pub struct AppState {
    pub(crate) store: TimeSeriesStore,
    pub(crate) sessions: SessionManager,
    pub(crate) connection: watch::Receiver<ConnectionState>,
    pub(crate) config: AnalyserConfig,
    pub(crate) status_log: StatusLog,
}

impl AppState {
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn store(&self) -> &TimeSeriesStore {
        &self.store
    }

    pub fn config(&self) -> &AnalyserConfig {
        &self.config
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub simulate: bool,
    pub import_taglist: bool,
    pub fix_sessions: bool,
    pub start_session: Option<u32>,
}

/// Open the stores, pick the instrument source and wire the scheduler.
///
/// Incomplete sessions left by a previous run are closed before the
/// scheduler exists, so no new measurement can race with recovery.
pub async fn bootstrap(
    config: AnalyserConfig,
    data_dir: &Path,
    import_taglist: bool,
) -> Result<(AppState, PollingScheduler)> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let db_path = config.resolve(data_dir, &config.database.path);
    let database = Database::open(db_path, Schema::TimeSeries)?;

    let source: Arc<dyn InstrumentSource> = if config.instrument.simulation_mode {
        info!("Simulation mode enabled; no instrument will be contacted");
        database
            .upsert_tags(SimulatedInstrument::tag_definitions())
            .await?;
        Arc::new(SimulatedInstrument::new())
    } else {
        let client = Arc::new(InstrumentClient::from_config(&config));
        if import_taglist {
            import_tag_catalog(&database, Arc::clone(&client)).await?;
        }
        client
    };
    info!("Collecting from {}", source.describe());

    let registry = TagRegistry::load(&database).await?;
    if registry.is_empty() {
        warn!("Tag registry is empty; every value will be dropped until tags are imported");
    }
    let missing = registry.missing_required(REQUIRED_TAGS);
    if !missing.is_empty() {
        warn!("Required tags missing from registry: {}", missing.join(", "));
    }

    let sessions = SessionManager::new(config.resolve(data_dir, &config.session.directory));
    let recovered = sessions.recover_incomplete_sessions().await?;
    if recovered > 0 {
        warn!("Recovered {recovered} incomplete session(s) from a previous run");
    }

    let tracker = ConnectionStateTracker::new();
    let connection = tracker.subscribe();
    let store = TimeSeriesStore::new(database, Arc::new(registry));
    let status_log = StatusLog::new(config.resolve(data_dir, &config.status_file));
    let scheduler = PollingScheduler::new(source, store.clone(), sessions.clone(), tracker, &config)
        .with_status_log(status_log.clone());

    let state = AppState {
        store,
        sessions,
        connection,
        config,
        status_log,
    };
    Ok((state, scheduler))
}

async fn import_tag_catalog(database: &Database, client: Arc<InstrumentClient>) -> Result<()> {
    let fetched = tokio::task::spawn_blocking(move || client.fetch_taglist())
        .await
        .context("tag list worker failed to join")?;

    match fetched {
        Ok(definitions) => {
            let inserted = database.upsert_tags(definitions).await?;
            info!("Imported {inserted} new tag(s) from the instrument");
        }
        Err(err) => warn!("Tag list import failed: {err}"),
    }
    Ok(())
}

/// Close every session left open in the session directory.
pub async fn fix_incomplete_sessions(config: &AnalyserConfig, data_dir: &Path) -> Result<usize> {
    let sessions = SessionManager::new(config.resolve(data_dir, &config.session.directory));
    Ok(sessions.recover_incomplete_sessions().await?)
}

pub async fn run(options: RunOptions) -> Result<()> {
    // RUST_LOG overrides the default filter
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("CO/O2 collector starting up...");

    let mut config = AnalyserConfig::load(&options.config_path)?;
    if options.simulate {
        config.instrument.simulation_mode = true;
    }

    if options.fix_sessions {
        let fixed = fix_incomplete_sessions(&config, &options.data_dir).await?;
        info!("Fixed {fixed} incomplete session(s)");
        return Ok(());
    }

    let (state, scheduler) = bootstrap(config, &options.data_dir, options.import_taglist).await?;

    let mut controller = CollectorController::new();
    controller.start(scheduler)?;

    if let Some(minutes) = options.start_session {
        match commands::start_session(&state, Some(minutes)).await {
            Ok(path) => info!("Session recording to {}", path.display()),
            Err(err) => warn!("Could not start session: {err}"),
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    shutdown(&state, &mut controller).await
}

/// Stop polling, close any open session and record the stop in the
/// status log.
pub async fn shutdown(state: &AppState, controller: &mut CollectorController) -> Result<()> {
    controller.stop().await?;
    if let Some(path) = state.sessions.force_stop().await? {
        info!("Closed active session in {}", path.display());
    }
    state.status_log.append("STOPPED by user");
    Ok(())
}
