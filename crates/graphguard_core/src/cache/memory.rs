//! Process-local cache pool.

use super::{CachePool, CacheResult, ConjunctViolation};
use std::cell::RefCell;
use std::collections::BTreeMap;

/// In-memory [`CachePool`]; lives as long as the owning runtime.
#[derive(Debug, Default)]
pub struct MemoryCachePool {
    entries: RefCell<BTreeMap<String, Vec<ConjunctViolation>>>,
}

impl MemoryCachePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl CachePool for MemoryCachePool {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<ConjunctViolation>>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn get_many(&self, keys: &[&str]) -> CacheResult<BTreeMap<String, Vec<ConjunctViolation>>> {
        let entries = self.entries.borrow();
        Ok(keys
            .iter()
            .filter_map(|key| {
                entries
                    .get(*key)
                    .map(|violations| ((*key).to_string(), violations.clone()))
            })
            .collect())
    }

    fn contains(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.borrow().contains_key(key))
    }

    fn save(&self, key: &str, violations: &[ConjunctViolation]) -> CacheResult<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), violations.to_vec());
        Ok(())
    }

    fn clear(&self, key: &str) -> CacheResult<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}
