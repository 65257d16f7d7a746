use std::{fs, time::Instant};

use co_o2_collector_lib::{
    bootstrap,
    collector::CollectorController,
    commands,
    config::AnalyserConfig,
    db::SessionStatus,
    error::SessionStateError,
    fix_incomplete_sessions,
    instrument::ConnectionState,
    shutdown,
    tags::{CO_TAG, O2_TAG},
};
use tempfile::TempDir;

fn simulated_config() -> AnalyserConfig {
    let mut config = AnalyserConfig::default();
    config.instrument.simulation_mode = true;
    // Every sweep is due on every tick.
    let intervals = &mut config.data_collection.intervals;
    intervals.all_values_interval = 0.0;
    intervals.concentration_interval = 0.0;
    intervals.status_check_interval = 0.0;
    intervals.connection_check_interval = 0.0;
    config
}

#[tokio::test]
async fn simulated_sweeps_fill_the_store_and_the_session() {
    let dir = TempDir::new().unwrap();
    let (state, mut scheduler) = bootstrap(simulated_config(), dir.path(), false)
        .await
        .unwrap();

    assert_eq!(commands::connection_state(&state), ConnectionState::Disconnected);

    let fired = scheduler.tick(Instant::now()).await;
    assert_eq!(fired.len(), 4);
    assert_eq!(commands::connection_state(&state), ConnectionState::Connected);

    let latest = commands::latest_measurements(&state).await.unwrap();
    assert!(latest.co.is_some());
    assert!(latest.o2.is_some());
    assert!(latest.sample_temp.is_some());

    let co = commands::fetch_latest(&state, CO_TAG).await.unwrap().unwrap();
    assert_eq!(co.tag_name, CO_TAG);
    let recent = commands::fetch_recent(&state, Some(O2_TAG), 60).await.unwrap();
    assert!(!recent.is_empty());
    assert!(recent.iter().all(|value| value.tag_name == O2_TAG));

    let status = commands::store_status(&state).await.unwrap();
    assert!(status.total_records > 0);
    assert!(status.total_tags >= 4);

    let session_path = commands::start_session(&state, Some(5)).await.unwrap();
    assert!(session_path.starts_with(dir.path().join("sessions")));

    scheduler.tick(Instant::now()).await;
    scheduler.tick(Instant::now()).await;

    let snapshot = commands::session_status(&state).await;
    assert!(snapshot.collecting);
    assert_eq!(snapshot.measurement_count, 2);
    let session_id = snapshot.session_id.clone().unwrap();

    assert_eq!(commands::stop_session(&state).await.unwrap(), session_path);
    let err = commands::stop_session(&state).await.unwrap_err();
    assert!(err.is_state(SessionStateError::NotCollecting));

    let sessions = commands::list_sessions(&state).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, session_id);
    assert_eq!(sessions[0].total_measurements, 2);
    assert_eq!(sessions[0].status, SessionStatus::Completed);
    assert!(sessions[0].end_time.is_some());

    let measurements = commands::session_measurements(&state, &session_id)
        .await
        .unwrap();
    assert_eq!(measurements.len(), 2);
    let stats = commands::session_statistics(&state, &session_id)
        .await
        .unwrap();
    assert_eq!(stats.measurement_count, 2);
    assert_eq!(stats.co.unwrap().count, 2);

    let export = dir.path().join("export.json");
    commands::export_session_json(&state, &session_id, &export)
        .await
        .unwrap();
    let exported: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&export).unwrap()).unwrap();
    assert_eq!(exported["measurements"].as_array().unwrap().len(), 2);

    let csv_path = dir.path().join("export.csv");
    commands::export_session_csv(&state, &session_id, &csv_path)
        .await
        .unwrap();
    let csv_text = fs::read_to_string(&csv_path).unwrap();
    assert!(csv_text.starts_with("DateTime,O2_CONC,CO_CONC,"));
    assert_eq!(csv_text.lines().count(), 3);

    let status_lines = fs::read_to_string(dir.path().join("analyser_status.txt")).unwrap();
    assert_eq!(status_lines.lines().count(), 1);
    assert!(status_lines.trim_end().ends_with(" - CONNECTED"));
}

#[tokio::test]
async fn restart_recovers_a_session_left_open() {
    let dir = TempDir::new().unwrap();
    let config = simulated_config();

    let session_id = {
        let (state, mut scheduler) = bootstrap(config.clone(), dir.path(), false)
            .await
            .unwrap();
        commands::start_session(&state, None).await.unwrap();
        scheduler.tick(Instant::now()).await;
        commands::session_status(&state).await.session_id.unwrap()
        // Dropped without stopping, as if the process died.
    };

    let (state, _scheduler) = bootstrap(config.clone(), dir.path(), false)
        .await
        .unwrap();
    let session = commands::get_session(&state, &session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Recovered);
    assert_eq!(session.total_measurements, 1);
    assert!(session.end_time.is_some());

    assert_eq!(fix_incomplete_sessions(&config, dir.path()).await.unwrap(), 0);
}

#[tokio::test]
async fn default_duration_comes_from_config() {
    let dir = TempDir::new().unwrap();
    let mut config = simulated_config();
    config.session.default_duration_minutes = 3;
    let (state, _scheduler) = bootstrap(config, dir.path(), false).await.unwrap();

    commands::start_session(&state, None).await.unwrap();
    let snapshot = commands::session_status(&state).await;
    assert!(snapshot.remaining_seconds > 170 && snapshot.remaining_seconds <= 180);

    let err = commands::start_session(&state, Some(1)).await.unwrap_err();
    assert!(err.is_state(SessionStateError::AlreadyCollecting));
    state.sessions().force_stop().await.unwrap();
}

#[tokio::test]
async fn unknown_session_queries_are_rejected() {
    let dir = TempDir::new().unwrap();
    let (state, _scheduler) = bootstrap(simulated_config(), dir.path(), false)
        .await
        .unwrap();

    let err = commands::session_statistics(&state, "missing").await.unwrap_err();
    assert!(err.is_state(SessionStateError::UnknownSession));
    assert_eq!(commands::format_tag_value(&state, CO_TAG, "12.345", true), "12.3 ppm");
    assert_eq!(commands::format_tag_value(&state, "NOT_A_TAG", "abc", true), "abc");
}

#[tokio::test]
async fn shutdown_closes_the_session_and_logs_the_stop() {
    let dir = TempDir::new().unwrap();
    let (state, scheduler) = bootstrap(simulated_config(), dir.path(), false)
        .await
        .unwrap();

    let mut controller = CollectorController::new();
    controller.start(scheduler).unwrap();
    commands::start_session(&state, Some(5)).await.unwrap();
    let session_id = commands::session_status(&state).await.session_id.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    shutdown(&state, &mut controller).await.unwrap();
    assert!(!controller.is_running());
    assert!(!commands::session_status(&state).await.collecting);

    let session = commands::get_session(&state, &session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::ForceStopped);
    assert!(session.end_time.is_some());

    let status_lines = fs::read_to_string(dir.path().join("analyser_status.txt")).unwrap();
    let lines: Vec<_> = status_lines.lines().collect();
    assert!(lines.first().unwrap().ends_with(" - CONNECTED"));
    assert!(lines.last().unwrap().ends_with(" - STOPPED by user"));
}
