//! Connection setup for the population file and the violation cache.
//!
//! # Responsibility
//! - Open file or in-memory connections ready for the SQLite backends.
//!
//! # Invariants
//! - File connections use WAL journaling, so readers of the file are not
//!   blocked while a population transaction is open.
//! - Returned connections carry the current schema.

use super::migrations::apply_migrations;
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Wait applied when another connection on the same file holds the lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    File,
    Memory,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Memory => "memory",
        }
    }
}

/// Opens (or creates) a database file with the current schema.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    open_with(Mode::File, &path.display().to_string(), || {
        Connection::open(path)
    })
}

/// Opens a private in-memory database with the current schema.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with(Mode::Memory, ":memory:", Connection::open_in_memory)
}

fn open_with(
    mode: Mode,
    target: &str,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    let result = connect()
        .map_err(Into::into)
        .and_then(|mut conn| prepare(mode, &mut conn).map(|()| conn));

    match &result {
        Ok(_) => info!(
            "event=db_open module=db status=ok mode={} target={} duration_ms={}",
            mode.as_str(),
            target,
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=db_open module=db status=error mode={} target={} duration_ms={} error={}",
            mode.as_str(),
            target,
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

fn prepare(mode: Mode, conn: &mut Connection) -> DbResult<()> {
    if mode == Mode::File {
        // journal_mode returns the resulting mode as a row
        conn.query_row("PRAGMA journal_mode = WAL;", [], |_| Ok(()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
    }
    apply_migrations(conn)
}
