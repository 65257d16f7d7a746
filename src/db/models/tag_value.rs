use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const QUALITY_GOOD: &str = "GOOD";

/// One stored sample. Written once per successful fetch per tag, never
/// updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagValue {
    pub tag_name: String,
    pub value: String,
    pub timestamp: DateTime<Utc>,
    pub quality: String,
}

impl TagValue {
    pub fn as_f64(&self) -> Option<f64> {
        self.value.trim().parse::<f64>().ok()
    }
}
