use anyhow::Result;
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{format_timestamp, parse_air_quality, parse_datetime},
    models::Measurement,
};

fn row_to_measurement(row: &Row) -> Result<Measurement> {
    let timestamp: String = row.get("timestamp")?;
    let air_quality: String = row.get("air_quality_status")?;

    Ok(Measurement {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        co_concentration: row.get("co_concentration")?,
        o2_concentration: row.get("o2_concentration")?,
        sample_temp: row.get("sample_temp")?,
        sample_flow: row.get("sample_flow")?,
        fume_limit_mg_m3: row.get("fume_limit_mg_m3")?,
        percentage_to_limit: row.get("percentage_to_limit")?,
        air_quality_status: parse_air_quality(&air_quality)?,
    })
}

impl Database {
    /// Insert one measurement row and return its row id.
    pub async fn insert_measurement(&self, measurement: &Measurement) -> Result<i64> {
        let record = measurement.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO measurements (
                    session_id, timestamp, co_concentration, o2_concentration, sample_temp,
                    sample_flow, fume_limit_mg_m3, percentage_to_limit, air_quality_status
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.session_id,
                    format_timestamp(&record.timestamp),
                    record.co_concentration,
                    record.o2_concentration,
                    record.sample_temp,
                    record.sample_flow,
                    record.fume_limit_mg_m3,
                    record.percentage_to_limit,
                    record.air_quality_status.as_str(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn get_measurements_for_session(&self, session_id: &str) -> Result<Vec<Measurement>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, timestamp, co_concentration, o2_concentration, sample_temp,
                        sample_flow, fume_limit_mg_m3, percentage_to_limit, air_quality_status
                 FROM measurements
                 WHERE session_id = ?1
                 ORDER BY timestamp ASC, id ASC",
            )?;

            let mut rows = stmt.query(params![session_id])?;
            let mut measurements = Vec::new();
            while let Some(row) = rows.next()? {
                measurements.push(row_to_measurement(row)?);
            }

            Ok(measurements)
        })
        .await
    }
}
