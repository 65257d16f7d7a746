pub mod measurement;
pub mod session;
pub mod tag;
pub mod tag_value;

pub use measurement::Measurement;
pub use session::{Session, SessionStatus, SessionSummary};
pub use tag::{Tag, TagDefinition};
pub use tag_value::{TagValue, QUALITY_GOOD};
