mod connection;
pub(crate) mod helpers;
pub mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use migrations::Schema;
pub use models::{Measurement, Session, SessionStatus, SessionSummary, Tag, TagDefinition, TagValue};
pub use repositories::tag_values::TagValueSummary;
