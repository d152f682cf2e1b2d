#![allow(dead_code)]

use graphguard_core::{
    CachePool, CacheResult, ConjunctViolation, EngineSettings, MemoryCachePool, Model, Pair,
    ProcedureRegistry, Runtime, SqliteStorage, StorageBackend, StorageError, StorageResult,
};
use graphguard_core::{Concept, Relation};
use rusqlite::params;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

pub const ORDER_CUSTOMER: &str = "conj_order_customer";
pub const UNI_CUSTOMER: &str = "conj_uni_customer";
pub const ANCESTORS: &str = "conj_ancestors";
pub const CUSTOMER_REL: &str = "customer[Order*Customer]";
pub const PARENT_REL: &str = "parent[Node*Node]";
pub const ANCESTOR_REL: &str = "ancestor[Node*Node]";

/// Orders, customers and a node hierarchy.
///
/// - `orderHasCustomer` (invariant): every order has a customer.
/// - `UNI_customer` (invariant): an order has at most one customer.
/// - `assignWalkIn` (signal, ExecEngine): links customerless orders to
///   `walk-in`.
/// - `computeAncestors` (signal, Auditor): keeps `ancestor` equal to the
///   transitive closure of `parent`.
pub const MODEL: &str = r#"{
    "concepts": [
        { "id": "Order", "affected_conjuncts": ["conj_order_customer"] },
        { "id": "Customer" },
        { "id": "Node" }
    ],
    "relations": [
        {
            "name": "customer",
            "src_concept": "Order",
            "tgt_concept": "Customer",
            "affected_conjuncts": ["conj_order_customer", "conj_uni_customer"]
        },
        {
            "name": "parent",
            "src_concept": "Node",
            "tgt_concept": "Node",
            "affected_conjuncts": ["conj_ancestors"]
        },
        {
            "name": "ancestor",
            "src_concept": "Node",
            "tgt_concept": "Node",
            "affected_conjuncts": ["conj_ancestors"]
        }
    ],
    "conjuncts": [
        {
            "id": "conj_order_customer",
            "query": "SELECT a.atom_id AS src, a.atom_id AS tgt FROM atoms a WHERE a.concept_id = 'Order' AND NOT EXISTS (SELECT 1 FROM links l WHERE l.relation_id = 'customer[Order*Customer]' AND l.src = a.atom_id) ORDER BY a.atom_id",
            "invariant_rules": ["orderHasCustomer"],
            "signal_rules": ["assignWalkIn"]
        },
        {
            "id": "conj_uni_customer",
            "query": "SELECT src, src AS tgt FROM links WHERE relation_id = 'customer[Order*Customer]' GROUP BY src HAVING COUNT(*) > 1",
            "invariant_rules": ["UNI_customer"]
        },
        {
            "id": "conj_ancestors",
            "query": "WITH RECURSIVE closure(src, tgt) AS (SELECT src, tgt FROM links WHERE relation_id = 'parent[Node*Node]' UNION SELECT c.src, l.tgt FROM closure c JOIN links l ON l.relation_id = 'parent[Node*Node]' AND l.src = c.tgt) SELECT src, tgt FROM closure EXCEPT SELECT src, tgt FROM links WHERE relation_id = 'ancestor[Node*Node]'",
            "signal_rules": ["computeAncestors"]
        }
    ],
    "rules": [
        {
            "id": "orderHasCustomer",
            "kind": "invariant",
            "src_concept": "Order",
            "tgt_concept": "Order",
            "message": "Every order needs a customer",
            "violation_segments": [
                { "type": "text", "value": "Order " },
                { "type": "src" },
                { "type": "text", "value": " has no customer" }
            ],
            "conjuncts": ["conj_order_customer"]
        },
        {
            "id": "UNI_customer",
            "kind": "invariant",
            "src_concept": "Order",
            "tgt_concept": "Order",
            "conjuncts": ["conj_uni_customer"]
        },
        {
            "id": "assignWalkIn",
            "kind": "signal",
            "src_concept": "Order",
            "tgt_concept": "Order",
            "violation_segments": [
                { "type": "text", "value": "{EX}InsPair;customer;Order;" },
                { "type": "src" },
                { "type": "text", "value": ";Customer;walk-in" }
            ],
            "conjuncts": ["conj_order_customer"]
        },
        {
            "id": "computeAncestors",
            "kind": "signal",
            "src_concept": "Node",
            "tgt_concept": "Node",
            "violation_segments": [
                { "type": "text", "value": "{EX}TransitiveClosure;parent;Node;ancestor" }
            ],
            "conjuncts": ["conj_ancestors"]
        }
    ],
    "roles": [
        { "id": "ExecEngine", "maintains": ["assignWalkIn"] },
        { "id": "Auditor", "maintains": ["computeAncestors"] },
        { "id": "Viewer" }
    ]
}"#;

pub fn model() -> Model {
    Model::from_json(MODEL).unwrap()
}

/// SQLite backend that counts queries and can be told to fail them.
pub struct CountingStorage {
    inner: SqliteStorage,
    queries: Cell<usize>,
    fail_queries: Cell<bool>,
}

impl CountingStorage {
    pub fn in_memory(id: &str) -> Self {
        Self {
            inner: SqliteStorage::open_in_memory(id).unwrap(),
            queries: Cell::new(0),
            fail_queries: Cell::new(false),
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.get()
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.set(fail);
    }

    /// Writes an atom directly, bypassing any transaction.
    pub fn seed_atom(&self, concept_id: &str, atom_id: &str) {
        self.inner
            .connection()
            .execute(
                "INSERT OR IGNORE INTO atoms (concept_id, atom_id) VALUES (?1, ?2);",
                params![concept_id, atom_id],
            )
            .unwrap();
    }

    pub fn seed_link(&self, relation_id: &str, src: &str, tgt: &str) {
        self.inner
            .connection()
            .execute(
                "INSERT OR IGNORE INTO links (relation_id, src, tgt) VALUES (?1, ?2, ?3);",
                params![relation_id, src, tgt],
            )
            .unwrap();
    }

    pub fn has_atom(&self, concept_id: &str, atom_id: &str) -> bool {
        let exists: i64 = self
            .inner
            .connection()
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM atoms WHERE concept_id = ?1 AND atom_id = ?2);",
                params![concept_id, atom_id],
                |row| row.get(0),
            )
            .unwrap();
        exists == 1
    }

    pub fn links_of(&self, relation_id: &str) -> Vec<Pair> {
        let mut stmt = self
            .inner
            .connection()
            .prepare("SELECT src, tgt FROM links WHERE relation_id = ?1 ORDER BY src, tgt;")
            .unwrap();
        let rows = stmt
            .query_map([relation_id], |row| {
                Ok(Pair::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                ))
            })
            .unwrap();
        rows.map(Result::unwrap).collect()
    }
}

impl StorageBackend for CountingStorage {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn start_transaction(&self) -> StorageResult<()> {
        self.inner.start_transaction()
    }

    fn commit_transaction(&self) -> StorageResult<()> {
        self.inner.commit_transaction()
    }

    fn rollback_transaction(&self) -> StorageResult<()> {
        self.inner.rollback_transaction()
    }

    fn execute_query(&self, query: &str) -> StorageResult<Vec<Pair>> {
        self.queries.set(self.queries.get() + 1);
        if self.fail_queries.get() {
            return Err(StorageError::InvalidQueryResult(
                "query failure injected by test".to_string(),
            ));
        }
        self.inner.execute_query(query)
    }

    fn atom_exists(&self, concept: &Concept, atom_id: &str) -> StorageResult<bool> {
        self.inner.atom_exists(concept, atom_id)
    }

    fn add_atom(&self, concept: &Concept, atom_id: &str) -> StorageResult<()> {
        self.inner.add_atom(concept, atom_id)
    }

    fn delete_atom(
        &self,
        concept: &Concept,
        atom_id: &str,
        relations: &[&Relation],
    ) -> StorageResult<()> {
        self.inner.delete_atom(concept, atom_id, relations)
    }

    fn links(&self, relation: &Relation) -> StorageResult<Vec<Pair>> {
        self.inner.links(relation)
    }

    fn add_link(&self, relation: &Relation, src: &str, tgt: &str) -> StorageResult<()> {
        self.inner.add_link(relation, src, tgt)
    }

    fn delete_link(&self, relation: &Relation, src: &str, tgt: &str) -> StorageResult<()> {
        self.inner.delete_link(relation, src, tgt)
    }
}

/// In-memory pool that counts bulk reads.
#[derive(Default)]
pub struct CountingCachePool {
    inner: MemoryCachePool,
    bulk_reads: Cell<usize>,
}

impl CountingCachePool {
    pub fn bulk_reads(&self) -> usize {
        self.bulk_reads.get()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl CachePool for CountingCachePool {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<ConjunctViolation>>> {
        self.inner.get(key)
    }

    fn get_many(&self, keys: &[&str]) -> CacheResult<BTreeMap<String, Vec<ConjunctViolation>>> {
        self.bulk_reads.set(self.bulk_reads.get() + 1);
        self.inner.get_many(keys)
    }

    fn contains(&self, key: &str) -> CacheResult<bool> {
        self.inner.contains(key)
    }

    fn save(&self, key: &str, violations: &[ConjunctViolation]) -> CacheResult<()> {
        self.inner.save(key, violations)
    }

    fn clear(&self, key: &str) -> CacheResult<()> {
        self.inner.clear(key)
    }
}

pub struct Fixture {
    pub runtime: Runtime,
    pub storage: Rc<CountingStorage>,
    pub pool: Rc<CountingCachePool>,
}

pub fn fixture() -> Fixture {
    fixture_with(MODEL, EngineSettings::default(), None)
}

pub fn fixture_with_settings(settings: EngineSettings) -> Fixture {
    fixture_with(MODEL, settings, None)
}

pub fn fixture_with(
    model_json: &str,
    settings: EngineSettings,
    procedures: Option<ProcedureRegistry>,
) -> Fixture {
    let storage = Rc::new(CountingStorage::in_memory("main"));
    let pool = Rc::new(CountingCachePool::default());
    let mut builder = Runtime::builder(Model::from_json(model_json).unwrap())
        .storage(storage.clone())
        .cache_pool(pool.clone())
        .settings(settings);
    if let Some(procedures) = procedures {
        builder = builder.procedures(procedures);
    }
    Fixture {
        runtime: builder.build().unwrap(),
        storage,
        pool,
    }
}

pub fn violation(conjunct_id: &str, src: &str, tgt: &str) -> ConjunctViolation {
    ConjunctViolation {
        conjunct_id: conjunct_id.to_string(),
        src: src.to_string(),
        tgt: tgt.to_string(),
    }
}

pub fn settings_with_roles(roles: &[&str]) -> EngineSettings {
    EngineSettings {
        exec_engine_roles: roles.iter().map(|role| role.to_string()).collect(),
        ..EngineSettings::default()
    }
}
