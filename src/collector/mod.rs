mod controller;
mod scheduler;

pub use controller::CollectorController;
pub use scheduler::{polling_loop, PollingScheduler, SweepIntervals, SweepKind};
