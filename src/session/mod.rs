mod manager;
mod state;

pub use manager::{session_file_name, SessionManager};
pub use state::{CollectionStatus, SessionSnapshot, SessionState};
