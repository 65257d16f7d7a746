use anyhow::{bail, Context, Result};
use rusqlite::{Connection, Transaction};

const TIME_SERIES_MIGRATIONS: &[&str] = &[include_str!("schemas/time_series_v1.sql")];

const SESSION_MIGRATIONS: &[&str] = &[include_str!("schemas/session_v1.sql")];

/// Which family of schema a SQLite file carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// Tag catalog plus the append-only tag value table.
    TimeSeries,
    /// One calendar day of measurement sessions.
    Session,
}

impl Schema {
    pub fn as_str(&self) -> &'static str {
        match self {
            Schema::TimeSeries => "time-series",
            Schema::Session => "session",
        }
    }

    fn migrations(&self) -> &'static [&'static str] {
        match self {
            Schema::TimeSeries => TIME_SERIES_MIGRATIONS,
            Schema::Session => SESSION_MIGRATIONS,
        }
    }

    pub fn current_version(&self) -> i32 {
        self.migrations().len() as i32
    }
}

pub fn run_migrations(conn: &mut Connection, schema: Schema) -> Result<()> {
    let current = schema.current_version();
    let mut version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if version > current {
        bail!(
            "{} database version ({}) is newer than supported schema ({})",
            schema.as_str(),
            version,
            current
        );
    }

    if version == current {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;

    while version < current {
        let next_version = version + 1;
        apply_migration(&tx, schema, next_version)
            .with_context(|| format!("migration to version {next_version} failed"))?;
        version = next_version;
    }

    tx.pragma_update(None, "user_version", current)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, schema: Schema, version: i32) -> Result<()> {
    let Some(script) = schema.migrations().get((version - 1) as usize) else {
        bail!("unknown {} migration target version: {version}", schema.as_str());
    };

    tx.execute_batch(script)
        .with_context(|| format!("failed to execute {} schema v{version}", schema.as_str()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn, Schema::Session).unwrap();
        run_migrations(&mut conn, Schema::Session).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('sessions', 'measurements')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }

    #[test]
    fn newer_database_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", 99).unwrap();

        let err = run_migrations(&mut conn, Schema::TimeSeries).unwrap_err();
        assert!(err.to_string().contains("newer than supported"));
    }
}
