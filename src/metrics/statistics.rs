use serde::{Deserialize, Serialize};

use crate::db::Measurement;

/// Summary of one numeric series. `std` is the sample standard deviation
/// and is zero for fewer than two values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

impl NumericStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / count as f64;
        let std = if count > 1 {
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / (count - 1) as f64;
            variance.sqrt()
        } else {
            0.0
        };

        Some(Self {
            count,
            min,
            max,
            mean,
            std,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatistics {
    pub measurement_count: usize,
    pub co: Option<NumericStats>,
    pub o2: Option<NumericStats>,
    pub sample_temp: Option<NumericStats>,
    pub sample_flow: Option<NumericStats>,
}

impl SessionStatistics {
    pub fn from_measurements(measurements: &[Measurement]) -> Self {
        let co: Vec<f64> = measurements.iter().map(|m| m.co_concentration).collect();
        let o2: Vec<f64> = measurements.iter().map(|m| m.o2_concentration).collect();
        let temp: Vec<f64> = measurements.iter().filter_map(|m| m.sample_temp).collect();
        let flow: Vec<f64> = measurements.iter().filter_map(|m| m.sample_flow).collect();

        Self {
            measurement_count: measurements.len(),
            co: NumericStats::from_values(&co),
            o2: NumericStats::from_values(&o2),
            sample_temp: NumericStats::from_values(&temp),
            sample_flow: NumericStats::from_values(&flow),
        }
    }
}
