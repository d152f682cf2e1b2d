//! Schema steps for the population and violation-cache tables.
//!
//! # Responsibility
//! - List the schema steps in version order.
//! - Apply pending steps inside one SQLite transaction.
//! - Confirm the tables the backends rely on are present.
//!
//! # Invariants
//! - `version` values are strictly increasing.
//! - `PRAGMA user_version` always equals the last applied step.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension};

/// Tables read or written by the SQLite backends.
pub const REQUIRED_TABLES: &[&str] = &["atoms", "links", "conjunct_cache"];

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "population",
        sql: include_str!("0001_init.sql"),
    },
    SchemaStep {
        version: 2,
        name: "conjunct_cache",
        sql: include_str!("0002_conjunct_cache.sql"),
    },
];

/// Schema version written by this binary.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Applies every step newer than the stored `user_version`, then checks
/// [`REQUIRED_TABLES`].
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let stored = stored_version(conn)?;
    let latest = latest_version();
    if stored > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: stored,
            latest_supported: latest,
        });
    }

    if stored < latest {
        let tx = conn.transaction()?;
        for step in SCHEMA_STEPS.iter().filter(|step| step.version > stored) {
            tx.execute_batch(step.sql)
                .and_then(|()| tx.pragma_update(None, "user_version", step.version))
                .map_err(|source| DbError::Migration {
                    version: step.version,
                    name: step.name,
                    source,
                })?;
            debug!(
                "event=db_migrate_step module=db status=ok version={} name={}",
                step.version, step.name
            );
        }
        tx.commit()?;
        info!(
            "event=db_migrate module=db status=ok from_version={} to_version={}",
            stored, latest
        );
    }

    verify_tables(conn)
}

fn stored_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}

fn verify_tables(conn: &Connection) -> DbResult<()> {
    for &table in REQUIRED_TABLES {
        let found = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1;",
                [table],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        if found.is_none() {
            return Err(DbError::MissingTable(table));
        }
    }
    Ok(())
}
