use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{format_timestamp, parse_datetime, parse_optional_datetime, to_u64},
    models::{TagValue, QUALITY_GOOD},
};

fn row_to_tag_value(row: &Row) -> Result<TagValue> {
    let timestamp: String = row.get("timestamp")?;

    Ok(TagValue {
        tag_name: row.get("name")?,
        value: row.get("value")?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        quality: row.get("quality")?,
    })
}

/// Counts used by the store status report.
#[derive(Debug, Clone, PartialEq)]
pub struct TagValueSummary {
    pub total_records: u64,
    pub total_tags: u64,
    pub latest_record: Option<DateTime<Utc>>,
}

impl Database {
    /// Append one batch of `(tag_id, value)` rows sharing a timestamp. The
    /// batch is written in a single transaction.
    pub async fn insert_tag_values(
        &self,
        rows: Vec<(i64, String)>,
        timestamp: DateTime<Utc>,
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let stamp = format_timestamp(&timestamp);
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO tag_values (tag_id, value, timestamp, quality)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for (tag_id, value) in &rows {
                    stmt.execute(params![tag_id, value, stamp, QUALITY_GOOD])?;
                }
            }
            tx.commit().context("failed to commit tag values")?;
            Ok(rows.len())
        })
        .await
    }

    pub async fn latest_tag_value(&self, tag_name: &str) -> Result<Option<TagValue>> {
        let tag_name = tag_name.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT tl.name, tv.value, tv.timestamp, tv.quality
                 FROM tag_values tv
                 JOIN tag_list tl ON tv.tag_id = tl.id
                 WHERE tl.name = ?1
                 ORDER BY tv.timestamp DESC, tv.id DESC
                 LIMIT 1",
            )?;

            let mut rows = stmt.query(params![tag_name])?;
            let value = match rows.next()? {
                Some(row) => Some(row_to_tag_value(row)?),
                None => None,
            };
            Ok(value)
        })
        .await
    }

    /// Values stored at or after `since`, ascending by time then insertion
    /// order. `None` selects every tag.
    pub async fn tag_values_since(
        &self,
        tag_name: Option<String>,
        since: DateTime<Utc>,
    ) -> Result<Vec<TagValue>> {
        self.execute(move |conn| {
            let since = format_timestamp(&since);
            let mut values = Vec::new();

            let mut stmt = conn.prepare(
                "SELECT tl.name, tv.value, tv.timestamp, tv.quality
                 FROM tag_values tv
                 JOIN tag_list tl ON tv.tag_id = tl.id
                 WHERE tv.timestamp >= ?1 AND (?2 IS NULL OR tl.name = ?2)
                 ORDER BY tv.timestamp ASC, tv.id ASC",
            )?;
            let mut rows = stmt.query(params![since, tag_name])?;
            while let Some(row) = rows.next()? {
                values.push(row_to_tag_value(row)?);
            }

            Ok(values)
        })
        .await
    }

    pub async fn tag_value_summary(&self) -> Result<TagValueSummary> {
        self.execute(|conn| {
            let total_records: i64 =
                conn.query_row("SELECT COUNT(*) FROM tag_values", [], |row| row.get(0))?;
            let total_tags: i64 =
                conn.query_row("SELECT COUNT(*) FROM tag_list", [], |row| row.get(0))?;
            let latest: Option<String> = conn
                .query_row("SELECT MAX(timestamp) FROM tag_values", [], |row| row.get(0))
                .optional()?
                .flatten();

            Ok(TagValueSummary {
                total_records: to_u64(total_records, "total_records")?,
                total_tags: to_u64(total_tags, "total_tags")?,
                latest_record: parse_optional_datetime(latest, "latest_record")?,
            })
        })
        .await
    }
}
