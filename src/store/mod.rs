mod time_series;

pub use time_series::{BatchOutcome, LatestMeasurements, StoreStatus, TimeSeriesStore};
