//! Append-only tag value store.
//!
//! Values are resolved to tag ids through the registry before they are
//! written. Unknown names are dropped with a warning and never abort the
//! rest of a batch. There is no update or delete path.

use std::{
    collections::{BTreeMap, HashSet},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{Database, TagValue};
use crate::error::StorageError;
use crate::instrument::TagReadings;
use crate::tags::{TagRegistry, CO_TAG, O2_TAG, PUMP_FLOW_TAG, SAMPLE_TEMP_TAG};
use crate::{log_info, log_warn};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub stored: usize,
    /// Values dropped because the tag is not registered.
    pub unknown: usize,
    /// Values skipped by the sweep's tag filter.
    pub filtered: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub total_records: u64,
    pub total_tags: u64,
    pub latest_record: Option<DateTime<Utc>>,
    pub database_path: PathBuf,
}

/// Latest value of each tag the session pipeline cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestMeasurements {
    pub co: Option<f64>,
    pub o2: Option<f64>,
    pub sample_temp: Option<f64>,
    pub pump_flow: Option<f64>,
}

#[derive(Clone)]
pub struct TimeSeriesStore {
    db: Database,
    registry: Arc<TagRegistry>,
}

impl TimeSeriesStore {
    pub fn new(db: Database, registry: Arc<TagRegistry>) -> Self {
        Self { db, registry }
    }

    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    /// Returns `Ok(false)` when the tag is unknown and nothing was written.
    pub async fn append(
        &self,
        tag_name: &str,
        value: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let Some(tag_id) = self.registry.id_of(tag_name) else {
            log_warn!("Dropping value for unknown tag {tag_name}");
            return Ok(false);
        };

        self.db
            .insert_tag_values(vec![(tag_id, value.to_string())], timestamp)
            .await?;
        Ok(true)
    }

    /// Store one fetch result. With a filter, only the listed tags are kept.
    pub async fn append_batch(
        &self,
        readings: &TagReadings,
        timestamp: DateTime<Utc>,
        filter: Option<&HashSet<String>>,
    ) -> Result<BatchOutcome, StorageError> {
        let mut outcome = BatchOutcome::default();
        let mut rows = Vec::with_capacity(readings.len());

        for (name, value) in readings {
            if filter.is_some_and(|allowed| !allowed.contains(name)) {
                outcome.filtered += 1;
                continue;
            }
            match self.registry.id_of(name) {
                Some(tag_id) => rows.push((tag_id, value.clone())),
                None => {
                    log_warn!("Dropping value for unknown tag {name}");
                    outcome.unknown += 1;
                }
            }
        }

        outcome.stored = self.db.insert_tag_values(rows, timestamp).await?;
        Ok(outcome)
    }

    pub async fn get_latest(&self, tag_name: &str) -> Result<Option<TagValue>, StorageError> {
        Ok(self.db.latest_tag_value(tag_name).await?)
    }

    /// Values stored within `window` of now. `None` returns every tag.
    pub async fn get_recent(
        &self,
        tag_name: Option<&str>,
        window: Duration,
    ) -> Result<Vec<TagValue>, StorageError> {
        let since = window_start(window);
        Ok(self
            .db
            .tag_values_since(tag_name.map(str::to_string), since)
            .await?)
    }

    /// Numeric history grouped by tag name. Values that do not parse as
    /// numbers are skipped.
    pub async fn history(
        &self,
        window: Duration,
    ) -> Result<BTreeMap<String, Vec<(DateTime<Utc>, f64)>>, StorageError> {
        let mut grouped: BTreeMap<String, Vec<(DateTime<Utc>, f64)>> = BTreeMap::new();
        for value in self.get_recent(None, window).await? {
            if let Some(number) = value.as_f64() {
                grouped
                    .entry(value.tag_name)
                    .or_default()
                    .push((value.timestamp, number));
            }
        }
        Ok(grouped)
    }

    pub async fn latest_measurements(&self) -> Result<LatestMeasurements, StorageError> {
        let latest = |value: Option<TagValue>| value.and_then(|v| v.as_f64());

        Ok(LatestMeasurements {
            co: latest(self.get_latest(CO_TAG).await?),
            o2: latest(self.get_latest(O2_TAG).await?),
            sample_temp: latest(self.get_latest(SAMPLE_TEMP_TAG).await?),
            pump_flow: latest(self.get_latest(PUMP_FLOW_TAG).await?),
        })
    }

    pub async fn status(&self) -> Result<StoreStatus, StorageError> {
        let summary = self.db.tag_value_summary().await?;
        log_info!(
            "Time-series store holds {} records across {} tags",
            summary.total_records,
            summary.total_tags
        );

        Ok(StoreStatus {
            total_records: summary.total_records,
            total_tags: summary.total_tags,
            latest_record: summary.latest_record,
            database_path: self.db.path().to_path_buf(),
        })
    }
}

fn window_start(window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Schema, TagDefinition};
    use tempfile::TempDir;

    async fn store() -> (TempDir, TimeSeriesStore) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("data.sqlite"), Schema::TimeSeries).unwrap();
        db.upsert_tags(vec![
            TagDefinition::new(CO_TAG, "concentration_tags", "ppm"),
            TagDefinition::new(O2_TAG, "concentration_tags", "%"),
            TagDefinition::new("OS_VERSION", "instrument_status", ""),
        ])
        .await
        .unwrap();
        let registry = Arc::new(TagRegistry::load(&db).await.unwrap());
        (dir, TimeSeriesStore::new(db, registry))
    }

    fn readings(pairs: &[(&str, &str)]) -> TagReadings {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn unknown_tags_are_dropped_without_rows() {
        let (_dir, store) = store().await;

        assert!(!store.append("NOT_A_TAG", "1", Utc::now()).await.unwrap());
        assert!(store.get_latest("NOT_A_TAG").await.unwrap().is_none());
        assert_eq!(store.status().await.unwrap().total_records, 0);

        assert!(store.append(CO_TAG, "27.5", Utc::now()).await.unwrap());
        assert_eq!(store.status().await.unwrap().total_records, 1);
    }

    #[tokio::test]
    async fn batch_applies_filter_and_survives_unknown_tags() {
        let (_dir, store) = store().await;
        let filter: HashSet<String> = [CO_TAG, O2_TAG, "MYSTERY"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let outcome = store
            .append_batch(
                &readings(&[
                    (CO_TAG, "27.4"),
                    (O2_TAG, "20.9"),
                    ("MYSTERY", "1"),
                    ("OS_VERSION", "1.0"),
                ]),
                Utc::now(),
                Some(&filter),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            BatchOutcome {
                stored: 2,
                unknown: 1,
                filtered: 1
            }
        );
        assert!(store.get_latest("OS_VERSION").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recent_history_and_latest_measurements() {
        let (_dir, store) = store().await;
        let now = Utc::now();
        let old = now - chrono::Duration::hours(2);

        store
            .append_batch(&readings(&[(CO_TAG, "10"), (O2_TAG, "20.9")]), old, None)
            .await
            .unwrap();
        store
            .append_batch(
                &readings(&[(CO_TAG, "12"), (O2_TAG, "n/a"), ("OS_VERSION", "1.0")]),
                now,
                None,
            )
            .await
            .unwrap();

        let recent = store
            .get_recent(Some(CO_TAG), Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].value, "12");

        let everything = store.get_recent(None, Duration::from_secs(3600)).await.unwrap();
        assert_eq!(everything.len(), 3);

        let history = store.history(Duration::from_secs(3 * 3600)).await.unwrap();
        assert_eq!(history[CO_TAG].len(), 2);
        assert_eq!(history[O2_TAG].len(), 1);
        assert!(!history.contains_key("OS_VERSION"));

        let latest = store.latest_measurements().await.unwrap();
        assert_eq!(latest.co, Some(12.0));
        assert_eq!(latest.o2, None);
        assert_eq!(latest.pump_flow, None);

        let status = store.status().await.unwrap();
        assert_eq!(status.total_records, 5);
        assert_eq!(status.total_tags, 3);
        assert!(status.database_path.ends_with("data.sqlite"));
    }
}
