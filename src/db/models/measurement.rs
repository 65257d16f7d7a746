//! Session-scoped measurement rows.
//!
//! Every row carries the id of the session that produced it, so sessions
//! sharing one calendar-day file never mix their samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::{AirQuality, FumeMetrics};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub id: Option<i64>,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub co_concentration: f64,
    pub o2_concentration: f64,
    pub sample_temp: Option<f64>,
    pub sample_flow: Option<f64>,
    pub fume_limit_mg_m3: Option<f64>,
    pub percentage_to_limit: Option<f64>,
    pub air_quality_status: AirQuality,
}

impl Measurement {
    pub fn new(
        session_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        co_ppm: f64,
        o2_pct: f64,
        sample_temp: Option<f64>,
        sample_flow: Option<f64>,
    ) -> Self {
        let metrics = FumeMetrics::compute(co_ppm, o2_pct);
        Self {
            id: None,
            session_id: session_id.into(),
            timestamp,
            co_concentration: co_ppm,
            o2_concentration: o2_pct,
            sample_temp,
            sample_flow,
            fume_limit_mg_m3: metrics.fume_limit_mg_m3,
            percentage_to_limit: metrics.percentage_to_limit,
            air_quality_status: metrics.air_quality,
        }
    }
}
