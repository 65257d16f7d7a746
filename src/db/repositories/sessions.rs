use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{
        format_timestamp, parse_datetime, parse_optional_datetime, parse_status, to_i64, to_u64,
    },
    models::{Session, SessionStatus},
};

fn row_to_session(row: &Row) -> Result<Session> {
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;
    let duration_seconds: i64 = row.get("duration_seconds")?;
    let total_measurements: i64 = row.get("total_measurements")?;
    let status: String = row.get("status")?;

    Ok(Session {
        id: row.get("id")?,
        start_time: parse_datetime(&start_time, "start_time")?,
        end_time: parse_optional_datetime(end_time, "end_time")?,
        duration_seconds: to_u64(duration_seconds, "duration_seconds")?,
        total_measurements: to_u64(total_measurements, "total_measurements")?,
        status: parse_status(&status)?,
    })
}

impl Database {
    pub async fn insert_session(&self, session: &Session) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, start_time, end_time, duration_seconds, total_measurements, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    format_timestamp(&record.start_time),
                    record.end_time.as_ref().map(format_timestamp),
                    to_i64(record.duration_seconds)?,
                    to_i64(record.total_measurements)?,
                    record.status.as_str(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Close a session. Returns `false` when no row matched the id.
    pub async fn close_session(
        &self,
        session_id: &str,
        end_time: DateTime<Utc>,
        total_measurements: u64,
        status: SessionStatus,
    ) -> Result<bool> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let updated = conn.execute(
                "UPDATE sessions
                 SET end_time = ?1,
                     total_measurements = ?2,
                     status = ?3
                 WHERE id = ?4",
                params![
                    format_timestamp(&end_time),
                    to_i64(total_measurements)?,
                    status.as_str(),
                    session_id,
                ],
            )?;
            Ok(updated > 0)
        })
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, start_time, end_time, duration_seconds, total_measurements, status
                 FROM sessions
                 WHERE id = ?1",
            )?;

            let mut rows = stmt.query(params![session_id])?;
            let session = match rows.next()? {
                Some(row) => Some(row_to_session(row)?),
                None => None,
            };
            Ok(session)
        })
        .await
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.query_sessions("SELECT id, start_time, end_time, duration_seconds, total_measurements, status
             FROM sessions
             ORDER BY start_time DESC")
            .await
    }

    /// Sessions without an end time. After a clean shutdown there are none.
    pub async fn get_open_sessions(&self) -> Result<Vec<Session>> {
        self.query_sessions("SELECT id, start_time, end_time, duration_seconds, total_measurements, status
             FROM sessions
             WHERE end_time IS NULL
             ORDER BY start_time ASC")
            .await
    }

    async fn query_sessions(&self, sql: &'static str) -> Result<Vec<Session>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    pub async fn last_measurement_time(&self, session_id: &str) -> Result<Option<DateTime<Utc>>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let latest: Option<String> = conn
                .query_row(
                    "SELECT MAX(timestamp) FROM measurements WHERE session_id = ?1",
                    params![session_id],
                    |row| row.get(0),
                )
                .optional()?
                .flatten();
            parse_optional_datetime(latest, "timestamp")
        })
        .await
    }

    pub async fn count_measurements(&self, session_id: &str) -> Result<u64> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM measurements WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )?;
            to_u64(count, "measurement count")
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Schema;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn open_session(id: &str, start: DateTime<Utc>) -> Session {
        Session {
            id: id.to_string(),
            start_time: start,
            end_time: None,
            duration_seconds: 600,
            total_measurements: 0,
            status: SessionStatus::Collecting,
        }
    }

    #[tokio::test]
    async fn close_session_moves_it_out_of_the_open_set() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("day.sqlite"), Schema::Session).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();

        db.insert_session(&open_session("a", start)).await.unwrap();
        db.insert_session(&open_session("b", start + chrono::Duration::minutes(20)))
            .await
            .unwrap();
        assert_eq!(db.get_open_sessions().await.unwrap().len(), 2);

        let end = start + chrono::Duration::minutes(10);
        assert!(db
            .close_session("a", end, 12, SessionStatus::Completed)
            .await
            .unwrap());
        assert!(!db
            .close_session("missing", end, 0, SessionStatus::Completed)
            .await
            .unwrap());

        let open = db.get_open_sessions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "b");

        let closed = db.get_session("a").await.unwrap().unwrap();
        assert_eq!(closed.end_time, Some(end));
        assert_eq!(closed.total_measurements, 12);
        assert_eq!(closed.status, SessionStatus::Completed);

        let listed: Vec<_> = db
            .list_sessions()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(listed, vec!["b".to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn empty_session_has_no_last_measurement() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("day.sqlite"), Schema::Session).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        db.insert_session(&open_session("a", start)).await.unwrap();

        assert_eq!(db.last_measurement_time("a").await.unwrap(), None);
        assert_eq!(db.count_measurements("a").await.unwrap(), 0);
    }
}
