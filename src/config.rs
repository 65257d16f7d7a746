use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::collector::SweepIntervals;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Tag names per group. Each sweep stores the groups it is configured for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagGroups {
    pub concentration_tags: Vec<String>,
    pub instrument_status: Vec<String>,
    pub flow_tags: Vec<String>,
    pub temperature: Vec<String>,
    pub warning_tags: Vec<String>,
    pub order_tags: Vec<String>,
}

impl Default for TagGroups {
    fn default() -> Self {
        Self {
            concentration_tags: strings(&["CO_CONC", "O2_CONC"]),
            instrument_status: strings(&["INSTRUMENT_TIME", "NETWORK_IP_ADDRESS", "OS_VERSION"]),
            flow_tags: strings(&[
                "AI_PUMP_FLOW",
                "PUMP_CONTROL_MODULE_STATE",
                "AI_SAMPLE_TEMP",
                "AI_SAMPLE_PRESSURE",
                "AI_ATMOSPHERIC_PRESSURE",
            ]),
            temperature: strings(&[
                "AI_SAMPLE_TEMP",
                "AI_DETECTOR_TEMP",
                "AI_BOX_TEMP",
                "AI_BENCH_TEMP",
                "AI_O2_HEATER_TEMP",
            ]),
            warning_tags: strings(&[
                "BOX_TEMP_WARN",
                "BENCH_TEMP_WARN",
                "WHEEL_TEMP_WARN",
                "LOW_MEMORY_WARNING",
                "SYS_INVALID_CONC_WARNING",
                "SF_O2_SENSOR_WARN_MALFUNCTION",
            ]),
            order_tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentSettings {
    pub ip_address: String,
    pub port: u16,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub simulation_mode: bool,
    pub tags: TagGroups,
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            ip_address: "192.168.1.100".into(),
            port: 8180,
            timeout_secs: 30,
            retry_attempts: 3,
            simulation_mode: false,
            tags: TagGroups::default(),
        }
    }
}

/// Sweep cadences in seconds, plus the loop tick in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalSettings {
    pub all_values_interval: f64,
    pub concentration_interval: f64,
    pub status_check_interval: f64,
    pub connection_check_interval: f64,
    pub tick_ms: u64,
}

impl Default for IntervalSettings {
    fn default() -> Self {
        Self {
            all_values_interval: 300.0,
            concentration_interval: 1.5,
            status_check_interval: 30.0,
            connection_check_interval: 300.0,
            tick_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataCollectionSettings {
    pub intervals: IntervalSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub default_duration_minutes: u32,
    /// Relative paths resolve against the data directory.
    pub directory: PathBuf,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_duration_minutes: 10,
            directory: PathBuf::from("sessions"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data_store.sqlite"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserConfig {
    pub instrument: InstrumentSettings,
    pub data_collection: DataCollectionSettings,
    pub session: SessionSettings,
    pub database: DatabaseSettings,
    pub status_file: PathBuf,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            instrument: InstrumentSettings::default(),
            data_collection: DataCollectionSettings::default(),
            session: SessionSettings::default(),
            database: DatabaseSettings::default(),
            status_file: PathBuf::from("analyser_status.txt"),
        }
    }
}

impl AnalyserConfig {
    /// Read a config file. A missing file yields defaults; a malformed one
    /// is reported and also yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        match serde_json::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(err) => {
                warn!(
                    "Ignoring malformed config {}: {err}; using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    pub fn base_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.instrument.ip_address, self.instrument.port
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.instrument.timeout_secs)
    }

    pub fn concentration_filter(&self) -> HashSet<String> {
        self.instrument.tags.concentration_tags.iter().cloned().collect()
    }

    /// Union of the status, warning, flow and temperature groups.
    pub fn status_filter(&self) -> HashSet<String> {
        let tags = &self.instrument.tags;
        tags.instrument_status
            .iter()
            .chain(&tags.warning_tags)
            .chain(&tags.flow_tags)
            .chain(&tags.temperature)
            .cloned()
            .collect()
    }

    pub fn sweep_intervals(&self) -> SweepIntervals {
        let intervals = &self.data_collection.intervals;
        // Out-of-range cadences saturate so such a sweep never comes due.
        let secs =
            |value: f64| Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX);
        SweepIntervals {
            all_values: secs(intervals.all_values_interval),
            concentration: secs(intervals.concentration_interval),
            status_warnings: secs(intervals.status_check_interval),
            connection_check: secs(intervals.connection_check_interval),
            tick: Duration::from_millis(intervals.tick_ms.max(1)),
        }
    }

    pub fn resolve(&self, data_dir: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            data_dir.join(path)
        }
    }
}
