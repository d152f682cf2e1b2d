//! SQLite cache pool storing violation lists as JSON.
//!
//! # Invariants
//! - One row per conjunct id in `conjunct_cache`.
//! - Payloads that fail to decode are reported, never treated as empty.

use super::{CacheError, CachePool, CacheResult, ConjunctViolation};
use crate::db::{open_db, open_db_in_memory, DbResult};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

/// Durable [`CachePool`] over a SQLite connection.
///
/// A pool and a [`SqliteStorage`] must not open the same file on separate
/// connections: an open population transaction holds the write lock, so
/// cache saves at commit would time out. Use [`SqliteStorage::cache_pool`]
/// to share the backend's connection instead.
///
/// [`SqliteStorage`]: crate::storage::SqliteStorage
/// [`SqliteStorage::cache_pool`]: crate::storage::SqliteStorage::cache_pool
pub struct SqliteCachePool {
    conn: Rc<Connection>,
}

impl SqliteCachePool {
    pub fn new(conn: Connection) -> Self {
        Self::shared(Rc::new(conn))
    }

    pub(crate) fn shared(conn: Rc<Connection>) -> Self {
        Self { conn }
    }

    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }
}

impl CachePool for SqliteCachePool {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<ConjunctViolation>>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT violations FROM conjunct_cache WHERE conjunct_id = ?1;",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        payload.map(|text| decode(key, &text)).transpose()
    }

    fn get_many(&self, keys: &[&str]) -> CacheResult<BTreeMap<String, Vec<ConjunctViolation>>> {
        if keys.is_empty() {
            return Ok(BTreeMap::new());
        }

        let placeholders = vec!["?"; keys.len()].join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT conjunct_id, violations FROM conjunct_cache WHERE conjunct_id IN ({placeholders});"
        ))?;
        let mut rows = stmt.query(params_from_iter(keys.iter()))?;

        let mut found = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let text: String = row.get(1)?;
            let violations = decode(&key, &text)?;
            found.insert(key, violations);
        }
        Ok(found)
    }

    fn contains(&self, key: &str) -> CacheResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM conjunct_cache WHERE conjunct_id = ?1);",
            [key],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn save(&self, key: &str, violations: &[ConjunctViolation]) -> CacheResult<()> {
        let text = serde_json::to_string(violations).map_err(|source| {
            CacheError::Serialization {
                key: key.to_string(),
                source,
            }
        })?;
        self.conn.execute(
            "INSERT INTO conjunct_cache (conjunct_id, violations) VALUES (?1, ?2)
             ON CONFLICT(conjunct_id) DO UPDATE SET
                violations = excluded.violations,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![key, text],
        )?;
        Ok(())
    }

    fn clear(&self, key: &str) -> CacheResult<()> {
        self.conn
            .execute("DELETE FROM conjunct_cache WHERE conjunct_id = ?1;", [key])?;
        Ok(())
    }
}

fn decode(key: &str, text: &str) -> CacheResult<Vec<ConjunctViolation>> {
    serde_json::from_str(text).map_err(|source| CacheError::Serialization {
        key: key.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::SqliteCachePool;
    use crate::cache::{CacheError, CachePool, ConjunctViolation};

    fn violation(conjunct_id: &str, src: &str, tgt: &str) -> ConjunctViolation {
        ConjunctViolation {
            conjunct_id: conjunct_id.to_string(),
            src: src.to_string(),
            tgt: tgt.to_string(),
        }
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite3");

        let pool = SqliteCachePool::open(&path).unwrap();
        pool.save("conj_1", &[violation("conj_1", "a", "b")]).unwrap();
        pool.save("conj_2", &[]).unwrap();
        drop(pool);

        let reopened = SqliteCachePool::open(&path).unwrap();
        assert_eq!(
            reopened.get("conj_1").unwrap(),
            Some(vec![violation("conj_1", "a", "b")])
        );
        let many = reopened.get_many(&["conj_1", "conj_2", "conj_3"]).unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many["conj_2"], vec![]);
        assert!(!reopened.contains("conj_3").unwrap());
    }

    #[test]
    fn corrupt_payload_is_reported() {
        let pool = SqliteCachePool::open_in_memory().unwrap();
        pool.conn
            .execute(
                "INSERT INTO conjunct_cache (conjunct_id, violations) VALUES ('conj_1', 'nope');",
                [],
            )
            .unwrap();

        let err = pool.get("conj_1").unwrap_err();
        assert!(matches!(err, CacheError::Serialization { .. }));
    }
}
