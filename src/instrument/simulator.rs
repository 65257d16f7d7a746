//! Stand-in instrument for running the pipeline without hardware.
//!
//! Cycles through three operating modes, 30 s each, starting in clean air.

use std::{
    ops::RangeInclusive,
    time::{Duration, Instant},
};

use rand::Rng;

use super::{InstrumentSource, TagReadings};
use crate::db::TagDefinition;
use crate::error::TransportError;
use crate::tags::{CO_TAG, O2_TAG, PUMP_FLOW_TAG, SAMPLE_TEMP_TAG};

const MODE_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    CleanAir,
    IndustrialExhaust,
    ExtremeFumes,
}

struct ModeProfile {
    co_ppm: RangeInclusive<f64>,
    o2_pct: RangeInclusive<f64>,
    temp_c: RangeInclusive<f64>,
    status: &'static str,
}

impl OperatingMode {
    pub fn at(elapsed: Duration) -> Self {
        match (elapsed.as_secs() / MODE_PERIOD.as_secs()) % 3 {
            0 => OperatingMode::CleanAir,
            1 => OperatingMode::IndustrialExhaust,
            _ => OperatingMode::ExtremeFumes,
        }
    }

    fn profile(&self) -> ModeProfile {
        match self {
            OperatingMode::CleanAir => ModeProfile {
                co_ppm: 27.0..=28.0,
                o2_pct: 20.8..=21.0,
                temp_c: 20.0..=25.0,
                status: "OK",
            },
            OperatingMode::IndustrialExhaust => ModeProfile {
                co_ppm: 290.0..=350.0,
                o2_pct: 7.8..=8.0,
                temp_c: 35.0..=45.0,
                status: "WARNING - High CO",
            },
            OperatingMode::ExtremeFumes => ModeProfile {
                co_ppm: 795.0..=905.0,
                o2_pct: 4.8..=5.2,
                temp_c: 50.0..=60.0,
                status: "CRITICAL - Extreme CO",
            },
        }
    }
}

pub struct SimulatedInstrument {
    started: Instant,
}

impl SimulatedInstrument {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn mode(&self) -> OperatingMode {
        OperatingMode::at(self.started.elapsed())
    }

    /// Catalog entries for every tag the simulator emits.
    pub fn tag_definitions() -> Vec<TagDefinition> {
        vec![
            TagDefinition::new(CO_TAG, "concentration_tags", "ppm")
                .with_precision(1)
                .with_range(0.0, 1000.0),
            TagDefinition::new(O2_TAG, "concentration_tags", "%")
                .with_precision(2)
                .with_range(0.0, 25.0),
            TagDefinition::new(SAMPLE_TEMP_TAG, "temperature", "°C")
                .with_precision(1)
                .with_range(-10.0, 70.0),
            TagDefinition::new(PUMP_FLOW_TAG, "flow_tags", "l/min")
                .with_precision(2)
                .with_range(0.0, 5.0),
            TagDefinition::new("INSTRUMENT_TIME", "instrument_status", ""),
            TagDefinition::new("OS_VERSION", "instrument_status", ""),
            TagDefinition::new("STATUS", "instrument_status", ""),
            TagDefinition::new("SYS_INVALID_CONC_WARNING", "warning_tags", ""),
        ]
    }

    pub fn readings_for(mode: OperatingMode) -> TagReadings {
        let profile = mode.profile();
        let mut rng = rand::thread_rng();

        let co = (rng.gen_range(profile.co_ppm) + rng.gen_range(-0.1..=0.1)).clamp(0.0, 1000.0);
        let o2 = (rng.gen_range(profile.o2_pct) + rng.gen_range(-0.01..=0.01)).clamp(3.0, 25.0);
        let temp = (rng.gen_range(profile.temp_c) + rng.gen_range(-0.1..=0.1)).clamp(-10.0, 70.0);
        let flow = rng.gen_range(1.0..=1.2);

        let mut readings = TagReadings::new();
        readings.insert(CO_TAG.into(), format!("{co:.2}"));
        readings.insert(O2_TAG.into(), format!("{o2:.2}"));
        readings.insert(SAMPLE_TEMP_TAG.into(), format!("{temp:.2}"));
        readings.insert(PUMP_FLOW_TAG.into(), format!("{flow:.2}"));
        readings.insert(
            "INSTRUMENT_TIME".into(),
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        readings.insert("OS_VERSION".into(), "simulated".into());
        readings.insert(
            "SYS_INVALID_CONC_WARNING".into(),
            (mode == OperatingMode::ExtremeFumes).to_string(),
        );
        readings.insert("STATUS".into(), profile.status.into());
        readings
    }
}

impl Default for SimulatedInstrument {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentSource for SimulatedInstrument {
    fn fetch(&self) -> Result<TagReadings, TransportError> {
        Ok(Self::readings_for(self.mode()))
    }

    fn describe(&self) -> String {
        "simulated instrument".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{AirQuality, FumeMetrics};

    #[test]
    fn modes_cycle_every_thirty_seconds() {
        assert_eq!(OperatingMode::at(Duration::ZERO), OperatingMode::CleanAir);
        assert_eq!(
            OperatingMode::at(Duration::from_secs(31)),
            OperatingMode::IndustrialExhaust
        );
        assert_eq!(
            OperatingMode::at(Duration::from_secs(65)),
            OperatingMode::ExtremeFumes
        );
        assert_eq!(OperatingMode::at(Duration::from_secs(90)), OperatingMode::CleanAir);
    }

    #[test]
    fn readings_land_in_the_expected_air_quality_branch() {
        let expectations = [
            (OperatingMode::CleanAir, AirQuality::FreshAir),
            (OperatingMode::IndustrialExhaust, AirQuality::IndustrialExhaust),
            (OperatingMode::ExtremeFumes, AirQuality::IndustrialExhaust),
        ];

        for (mode, quality) in expectations {
            let readings = SimulatedInstrument::readings_for(mode);
            let co: f64 = readings[CO_TAG].parse().unwrap();
            let o2: f64 = readings[O2_TAG].parse().unwrap();
            assert_eq!(FumeMetrics::compute(co, o2).air_quality, quality, "{mode:?}");
        }
    }

    #[test]
    fn every_emitted_core_tag_has_a_definition() {
        let names: Vec<_> = SimulatedInstrument::tag_definitions()
            .into_iter()
            .map(|def| def.name)
            .collect();
        for tag in [CO_TAG, O2_TAG, SAMPLE_TEMP_TAG, PUMP_FLOW_TAG] {
            assert!(names.iter().any(|name| name == tag));
        }
    }
}
