//! SQLite population backend.
//!
//! # Responsibility
//! - Keep concept populations in `atoms` and relation populations in `links`.
//! - Run conjunct queries written against those two tables.
//!
//! # Invariants
//! - Conjunct queries must expose `src` and `tgt` columns.
//! - Atom and link inserts are idempotent (`INSERT OR IGNORE`).

use super::{Pair, StorageBackend, StorageError, StorageResult};
use crate::cache::SqliteCachePool;
use crate::db::{open_db, open_db_in_memory};
use crate::model::{Concept, Relation};
use log::debug;
use rusqlite::{params, Connection};
use std::path::Path;
use std::rc::Rc;

/// SQLite-backed [`StorageBackend`].
pub struct SqliteStorage {
    id: String,
    conn: Rc<Connection>,
}

impl SqliteStorage {
    /// Wraps an already migrated connection.
    pub fn new(id: impl Into<String>, conn: Connection) -> Self {
        Self {
            id: id.into(),
            conn: Rc::new(conn),
        }
    }

    /// Opens (and migrates) a database file.
    pub fn open(id: impl Into<String>, path: impl AsRef<Path>) -> StorageResult<Self> {
        Ok(Self::new(id, open_db(path)?))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory(id: impl Into<String>) -> StorageResult<Self> {
        Ok(Self::new(id, open_db_in_memory()?))
    }

    /// Borrow of the underlying connection, mainly for seeding fixtures.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Cache pool on this backend's connection.
    ///
    /// Cache saves made while a transaction is open join it, so they are
    /// committed or rolled back together with the population.
    pub fn cache_pool(&self) -> SqliteCachePool {
        SqliteCachePool::shared(Rc::clone(&self.conn))
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }
}

impl StorageBackend for SqliteStorage {
    fn id(&self) -> &str {
        &self.id
    }

    fn start_transaction(&self) -> StorageResult<()> {
        if self.in_transaction() {
            return Err(StorageError::TransactionAlreadyStarted(self.id.clone()));
        }
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        debug!("event=storage_begin module=storage status=ok storage={}", self.id);
        Ok(())
    }

    fn commit_transaction(&self) -> StorageResult<()> {
        if !self.in_transaction() {
            return Err(StorageError::NoActiveTransaction(self.id.clone()));
        }
        self.conn.execute_batch("COMMIT;")?;
        debug!("event=storage_commit module=storage status=ok storage={}", self.id);
        Ok(())
    }

    fn rollback_transaction(&self) -> StorageResult<()> {
        if !self.in_transaction() {
            return Err(StorageError::NoActiveTransaction(self.id.clone()));
        }
        self.conn.execute_batch("ROLLBACK;")?;
        debug!("event=storage_rollback module=storage status=ok storage={}", self.id);
        Ok(())
    }

    fn execute_query(&self, query: &str) -> StorageResult<Vec<Pair>> {
        let mut stmt = self.conn.prepare(query)?;
        let (src_idx, tgt_idx) = match (stmt.column_index("src"), stmt.column_index("tgt")) {
            (Ok(src), Ok(tgt)) => (src, tgt),
            _ => {
                return Err(StorageError::InvalidQueryResult(
                    "query must select `src` and `tgt` columns".to_string(),
                ))
            }
        };

        let mut rows = stmt.query([])?;
        let mut pairs = Vec::new();
        while let Some(row) = rows.next()? {
            let src: String = row.get(src_idx)?;
            let tgt: String = row.get(tgt_idx)?;
            pairs.push(Pair { src, tgt });
        }
        Ok(pairs)
    }

    fn atom_exists(&self, concept: &Concept, atom_id: &str) -> StorageResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM atoms WHERE concept_id = ?1 AND atom_id = ?2
            );",
            params![concept.id(), atom_id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn add_atom(&self, concept: &Concept, atom_id: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO atoms (concept_id, atom_id) VALUES (?1, ?2);",
            params![concept.id(), atom_id],
        )?;
        Ok(())
    }

    fn delete_atom(
        &self,
        concept: &Concept,
        atom_id: &str,
        relations: &[&Relation],
    ) -> StorageResult<()> {
        for relation in relations {
            if relation.src_concept() == concept.id() {
                self.conn.execute(
                    "DELETE FROM links WHERE relation_id = ?1 AND src = ?2;",
                    params![relation.id(), atom_id],
                )?;
            }
            if relation.tgt_concept() == concept.id() {
                self.conn.execute(
                    "DELETE FROM links WHERE relation_id = ?1 AND tgt = ?2;",
                    params![relation.id(), atom_id],
                )?;
            }
        }
        self.conn.execute(
            "DELETE FROM atoms WHERE concept_id = ?1 AND atom_id = ?2;",
            params![concept.id(), atom_id],
        )?;
        Ok(())
    }

    fn links(&self, relation: &Relation) -> StorageResult<Vec<Pair>> {
        let mut stmt = self.conn.prepare(
            "SELECT src, tgt FROM links WHERE relation_id = ?1 ORDER BY src ASC, tgt ASC;",
        )?;
        let rows = stmt.query_map([relation.id()], |row| {
            Ok(Pair {
                src: row.get(0)?,
                tgt: row.get(1)?,
            })
        })?;
        let mut pairs = Vec::new();
        for pair in rows {
            pairs.push(pair?);
        }
        Ok(pairs)
    }

    fn add_link(&self, relation: &Relation, src: &str, tgt: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO links (relation_id, src, tgt) VALUES (?1, ?2, ?3);",
            params![relation.id(), src, tgt],
        )?;
        Ok(())
    }

    fn delete_link(&self, relation: &Relation, src: &str, tgt: &str) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM links WHERE relation_id = ?1 AND src = ?2 AND tgt = ?3;",
            params![relation.id(), src, tgt],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteStorage;
    use crate::model::{Concept, Relation};
    use crate::storage::{Pair, StorageBackend, StorageError};

    fn order_concept() -> Concept {
        Concept::new("Order", vec![], vec![])
    }

    fn customer_relation() -> Relation {
        Relation::new("customer", "Order", "Customer", vec![], vec![])
    }

    #[test]
    fn rolled_back_writes_are_not_visible() {
        let storage = SqliteStorage::open_in_memory("default").unwrap();
        let order = order_concept();

        storage.start_transaction().unwrap();
        storage.add_atom(&order, "o1").unwrap();
        assert!(storage.atom_exists(&order, "o1").unwrap());
        storage.rollback_transaction().unwrap();

        assert!(!storage.atom_exists(&order, "o1").unwrap());
    }

    #[test]
    fn double_start_is_rejected() {
        let storage = SqliteStorage::open_in_memory("default").unwrap();
        storage.start_transaction().unwrap();
        let err = storage.start_transaction().unwrap_err();
        assert!(matches!(err, StorageError::TransactionAlreadyStarted(_)));
    }

    #[test]
    fn delete_atom_cascades_to_links_of_given_relations() {
        let storage = SqliteStorage::open_in_memory("default").unwrap();
        let order = order_concept();
        let customer = customer_relation();

        storage.add_atom(&order, "o1").unwrap();
        storage.add_link(&customer, "o1", "c1").unwrap();
        storage.add_link(&customer, "o2", "c1").unwrap();
        storage.delete_atom(&order, "o1", &[&customer]).unwrap();

        assert_eq!(storage.links(&customer).unwrap(), vec![Pair::new("o2", "c1")]);
    }

    #[test]
    fn query_without_src_tgt_columns_is_rejected() {
        let storage = SqliteStorage::open_in_memory("default").unwrap();
        let err = storage
            .execute_query("SELECT atom_id FROM atoms")
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidQueryResult(_)));
    }
}
