use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::format_timestamp,
    models::{Tag, TagDefinition},
};

fn row_to_tag(row: &Row) -> Result<Tag> {
    let precision: Option<i64> = row.get("display_precision")?;

    Ok(Tag {
        id: row.get("id")?,
        definition: TagDefinition {
            name: row.get("name")?,
            tag_type: row.get("tag_type")?,
            description: row.get("description")?,
            group: row.get("tag_group")?,
            units: row.get("units")?,
            precision: precision.and_then(|p| u32::try_from(p).ok()),
            eu_min: row.get("eu_min")?,
            eu_max: row.get("eu_max")?,
            is_read_only: row.get("is_read_only")?,
            is_visible: row.get("is_visible")?,
            is_dashboard: row.get("is_dashboard")?,
        },
    })
}

impl Database {
    /// Insert tag definitions that are not registered yet. Existing rows keep
    /// their id so stored values stay attached to the same tag.
    pub async fn upsert_tags(&self, definitions: Vec<TagDefinition>) -> Result<usize> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let created_at = format_timestamp(&Utc::now());
            let mut inserted = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO tag_list (
                        name, tag_type, description, tag_group, units, display_precision,
                        eu_min, eu_max, is_read_only, is_visible, is_dashboard, created_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                )?;

                for def in definitions.iter().filter(|def| !def.name.is_empty()) {
                    inserted += stmt.execute(params![
                        def.name,
                        def.tag_type,
                        def.description,
                        def.group,
                        def.units,
                        def.precision.map(i64::from),
                        def.eu_min,
                        def.eu_max,
                        def.is_read_only,
                        def.is_visible,
                        def.is_dashboard,
                        created_at,
                    ])?;
                }
            }
            tx.commit().context("failed to commit tag list")?;
            Ok(inserted)
        })
        .await
    }

    pub async fn load_tags(&self) -> Result<Vec<Tag>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, tag_type, description, tag_group, units, display_precision,
                        eu_min, eu_max, is_read_only, is_visible, is_dashboard
                 FROM tag_list
                 ORDER BY name",
            )?;

            let mut rows = stmt.query([])?;
            let mut tags = Vec::new();
            while let Some(row) = rows.next()? {
                tags.push(row_to_tag(row)?);
            }

            Ok(tags)
        })
        .await
    }
}
