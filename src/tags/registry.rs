//! Read-only tag catalog.
//!
//! Loaded once at startup from the tag list table. Every other component
//! resolves tag names through this registry instead of carrying its own
//! metadata tables.

use std::collections::HashMap;

use anyhow::Result;

use crate::db::{Database, Tag, TagDefinition};

pub const CO_TAG: &str = "CO_CONC";
pub const O2_TAG: &str = "O2_CONC";
pub const SAMPLE_TEMP_TAG: &str = "AI_SAMPLE_TEMP";
pub const PUMP_FLOW_TAG: &str = "AI_PUMP_FLOW";

/// Tags the session pipeline cannot work without.
pub const REQUIRED_TAGS: &[&str] = &[CO_TAG, O2_TAG, SAMPLE_TEMP_TAG, PUMP_FLOW_TAG];

const DEFAULT_PRECISION: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct TagRegistry {
    tags: HashMap<String, Tag>,
}

impl TagRegistry {
    pub fn new(tags: Vec<Tag>) -> Self {
        Self {
            tags: tags
                .into_iter()
                .map(|tag| (tag.definition.name.clone(), tag))
                .collect(),
        }
    }

    pub async fn load(db: &Database) -> Result<Self> {
        Ok(Self::new(db.load_tags().await?))
    }

    pub fn id_of(&self, name: &str) -> Option<i64> {
        self.tags.get(name).map(|tag| tag.id)
    }

    pub fn metadata_of(&self, name: &str) -> Option<&TagDefinition> {
        self.tags.get(name).map(|tag| &tag.definition)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Names registered under `group`, sorted.
    pub fn names_in_group(&self, group: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .tags
            .values()
            .filter(|tag| tag.definition.group == group)
            .map(|tag| tag.definition.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn missing_required(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| !self.contains(name))
            .map(|name| name.to_string())
            .collect()
    }

    /// Render a raw value with the tag's precision and, optionally, units.
    /// Non-numeric values and unknown tags pass through unchanged.
    pub fn format_value(&self, name: &str, raw: &str, include_units: bool) -> String {
        let Some(def) = self.metadata_of(name) else {
            return raw.to_string();
        };
        let Ok(number) = raw.trim().parse::<f64>() else {
            return raw.to_string();
        };

        let precision = def
            .precision
            .map(|p| p as usize)
            .unwrap_or(DEFAULT_PRECISION);
        let formatted = format!("{number:.precision$}");

        if include_units && !def.units.is_empty() {
            format!("{formatted} {}", def.units)
        } else {
            formatted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TagRegistry {
        TagRegistry::new(vec![
            Tag {
                id: 1,
                definition: TagDefinition::new(CO_TAG, "concentration_tags", "ppm").with_precision(1),
            },
            Tag {
                id: 2,
                definition: TagDefinition::new(O2_TAG, "concentration_tags", "%"),
            },
            Tag {
                id: 3,
                definition: TagDefinition::new("OS_VERSION", "instrument_status", ""),
            },
        ])
    }

    #[test]
    fn lookups_by_name() {
        let registry = registry();
        assert_eq!(registry.id_of(CO_TAG), Some(1));
        assert_eq!(registry.id_of("NOPE"), None);
        assert_eq!(registry.metadata_of(O2_TAG).unwrap().units, "%");
        assert_eq!(
            registry.names_in_group("concentration_tags"),
            vec![CO_TAG.to_string(), O2_TAG.to_string()]
        );
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn reports_missing_required_tags() {
        let missing = registry().missing_required(REQUIRED_TAGS);
        assert_eq!(
            missing,
            vec![SAMPLE_TEMP_TAG.to_string(), PUMP_FLOW_TAG.to_string()]
        );
    }

    #[test]
    fn formats_with_precision_and_units() {
        let registry = registry();
        assert_eq!(registry.format_value(CO_TAG, "27.456", true), "27.5 ppm");
        assert_eq!(registry.format_value(O2_TAG, "20.9", false), "20.90");
        assert_eq!(registry.format_value("OS_VERSION", "1.2.3", true), "1.2.3");
        assert_eq!(registry.format_value("UNKNOWN", "5", true), "5");
    }
}
