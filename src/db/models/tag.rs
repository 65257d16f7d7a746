//! Tag catalog models.
//!
//! A tag is a named instrument data point. Definitions come from the
//! instrument's tag list (or from the simulator) and are immutable once
//! registered; `Tag` adds the row identity the value table is keyed by.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDefinition {
    pub name: String,
    pub tag_type: String,
    pub description: String,
    /// Group tag such as `warning_tags` or `flow_tags`.
    pub group: String,
    pub units: String,
    /// Display precision in decimal places.
    pub precision: Option<u32>,
    pub eu_min: Option<f64>,
    pub eu_max: Option<f64>,
    pub is_read_only: bool,
    pub is_visible: bool,
    pub is_dashboard: bool,
}

impl TagDefinition {
    pub fn new(name: impl Into<String>, group: impl Into<String>, units: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            units: units.into(),
            is_visible: true,
            ..Self::default()
        }
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.eu_min = Some(min);
        self.eu_max = Some(max);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: i64,
    #[serde(flatten)]
    pub definition: TagDefinition,
}

impl Tag {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn range(&self) -> Option<(f64, f64)> {
        match (self.definition.eu_min, self.definition.eu_max) {
            (Some(min), Some(max)) => Some((min, max)),
            _ => None,
        }
    }
}
