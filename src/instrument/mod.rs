//! Instrument access: the HTTP client, the simulated instrument used when
//! no hardware is attached, and the connection state derived from fetches.

mod client;
mod connection;
mod simulator;
mod status_log;

use std::collections::BTreeMap;

use crate::error::TransportError;

pub use client::{parse_taglist, parse_value_list, InstrumentClient};
pub use connection::{ConnectionEvent, ConnectionState, ConnectionStateTracker};
pub use simulator::{OperatingMode, SimulatedInstrument};
pub use status_log::StatusLog;

/// Tag name to raw value, as returned by one value-list request.
pub type TagReadings = BTreeMap<String, String>;

/// A blocking source of tag values. Implementations must be callable from
/// a `spawn_blocking` worker.
pub trait InstrumentSource: Send + Sync {
    fn fetch(&self) -> Result<TagReadings, TransportError>;

    fn describe(&self) -> String;
}
