//! O2-corrected CO fume limit.
//!
//! Fresh-air samples (`O2 >= 18 %`, `CO <= 50 ppm`) convert CO straight to
//! mg/m³. Exhaust samples (`O2 < 18 %`) are normalised to the 13 % reference
//! oxygen level and compared against the 500 mg/m³ regulatory ceiling.
//! Everything else, including samples too close to ambient oxygen for the
//! correction to be meaningful, is classified `Invalid` with no derived
//! values.

use serde::{Deserialize, Serialize};

const FRESH_AIR_MIN_O2_PCT: f64 = 18.0;
const FRESH_AIR_MAX_CO_PPM: f64 = 50.0;
const PPM_TO_MG_M3: f64 = 1.25;
const REFERENCE_O2_PCT: f64 = 13.0;
const AMBIENT_O2_PCT: f64 = 21.0;
const CO_LIMIT_MG_M3: f64 = 500.0;
/// Smallest `21 - O2` accepted as a divisor.
const MIN_O2_HEADROOM_PCT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AirQuality {
    #[serde(rename = "Fresh Air")]
    FreshAir,
    #[serde(rename = "Industrial Exhaust")]
    IndustrialExhaust,
    #[serde(rename = "Invalid O2")]
    Invalid,
}

impl AirQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            AirQuality::FreshAir => "Fresh Air",
            AirQuality::IndustrialExhaust => "Industrial Exhaust",
            AirQuality::Invalid => "Invalid O2",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Fresh Air" => Some(AirQuality::FreshAir),
            "Industrial Exhaust" => Some(AirQuality::IndustrialExhaust),
            "Invalid O2" => Some(AirQuality::Invalid),
            _ => None,
        }
    }
}

/// How close an exhaust sample is to the regulatory ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitLevel {
    Low,
    Medium,
    ExceedsLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FumeMetrics {
    pub fume_limit_mg_m3: Option<f64>,
    pub percentage_to_limit: Option<f64>,
    pub air_quality: AirQuality,
}

impl FumeMetrics {
    pub fn compute(co_ppm: f64, o2_pct: f64) -> Self {
        if !co_ppm.is_finite() || !o2_pct.is_finite() {
            return Self::invalid();
        }

        if o2_pct >= FRESH_AIR_MIN_O2_PCT && co_ppm <= FRESH_AIR_MAX_CO_PPM {
            return Self {
                fume_limit_mg_m3: Some(co_ppm * PPM_TO_MG_M3),
                percentage_to_limit: None,
                air_quality: AirQuality::FreshAir,
            };
        }

        if o2_pct < FRESH_AIR_MIN_O2_PCT {
            let headroom = AMBIENT_O2_PCT - o2_pct;
            if headroom < MIN_O2_HEADROOM_PCT {
                return Self::invalid();
            }

            let fume_limit =
                co_ppm * PPM_TO_MG_M3 * ((AMBIENT_O2_PCT - REFERENCE_O2_PCT) / headroom);
            if !fume_limit.is_finite() {
                return Self::invalid();
            }

            return Self {
                fume_limit_mg_m3: Some(fume_limit),
                percentage_to_limit: Some(fume_limit / CO_LIMIT_MG_M3 * 100.0),
                air_quality: AirQuality::IndustrialExhaust,
            };
        }

        Self::invalid()
    }

    fn invalid() -> Self {
        Self {
            fume_limit_mg_m3: None,
            percentage_to_limit: None,
            air_quality: AirQuality::Invalid,
        }
    }

    /// Band for the percentage of the limit; `None` outside the exhaust
    /// branch.
    pub fn level(&self) -> Option<LimitLevel> {
        let pct = self.percentage_to_limit?;
        Some(if pct < 50.0 {
            LimitLevel::Low
        } else if pct <= 100.0 {
            LimitLevel::Medium
        } else {
            LimitLevel::ExceedsLimit
        })
    }
}
