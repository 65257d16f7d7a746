use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Local;
use log::error;

/// Append-only text log of connection transitions, one
/// `YYYY-MM-DD HH:MM:SS - message` line per event.
#[derive(Debug, Clone)]
pub struct StatusLog {
    path: PathBuf,
}

impl StatusLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write failures are logged and otherwise ignored.
    pub fn append(&self, message: &str) {
        let line = format!("{} - {message}\n", Local::now().format("%Y-%m-%d %H:%M:%S"));
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));

        if let Err(err) = result {
            error!("Failed to write status to {}: {err}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn appends_timestamped_lines() {
        let dir = TempDir::new().unwrap();
        let log = StatusLog::new(dir.path().join("analyser_status.txt"));
        log.append("CONNECTED");
        log.append("Connection failed: refused");

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - CONNECTED"));
        assert_eq!(lines[0].len(), "2024-01-01 00:00:00 - CONNECTED".len());
        assert!(lines[1].ends_with(" - Connection failed: refused"));
    }

    #[test]
    fn unwritable_path_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let log = StatusLog::new(dir.path().join("missing").join("status.txt"));
        log.append("CONNECTED");
        assert!(!log.path().exists());
    }
}
