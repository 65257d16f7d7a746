mod fume;
mod statistics;

pub use fume::{AirQuality, FumeMetrics, LimitLevel};
pub use statistics::{NumericStats, SessionStatistics};
