use graphguard_core::db::migrations::{latest_version, REQUIRED_TABLES};
use graphguard_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

fn user_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn tables(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name;")
        .unwrap();
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .unwrap()
        .map(Result::unwrap)
        .collect();
    names
}

#[test]
fn fresh_database_gets_population_and_cache_tables() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(user_version(&conn), latest_version());
    let tables = tables(&conn);
    for required in REQUIRED_TABLES {
        assert!(tables.iter().any(|name| name == *required), "{required} missing");
    }
}

#[test]
fn reopening_keeps_population_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("population.db");

    let first = open_db(&path).unwrap();
    first
        .execute(
            "INSERT INTO links (relation_id, src, tgt) VALUES ('customer[Order*Customer]', 'o1', 'c1');",
            [],
        )
        .unwrap();
    drop(first);

    let second = open_db(&path).unwrap();
    assert_eq!(user_version(&second), latest_version());
    let links: i64 = second
        .query_row("SELECT COUNT(*) FROM links;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(links, 1);
}

#[test]
fn duplicate_links_collapse_on_the_primary_key() {
    let conn = open_db_in_memory().unwrap();
    for _ in 0..2 {
        conn.execute(
            "INSERT OR IGNORE INTO links (relation_id, src, tgt) VALUES ('r[A*B]', 'a', 'b');",
            [],
        )
        .unwrap();
    }
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM links;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn database_from_a_newer_binary_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");
    Connection::open(&path)
        .unwrap()
        .execute_batch("PRAGMA user_version = 999;")
        .unwrap();

    match open_db(&path).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}
