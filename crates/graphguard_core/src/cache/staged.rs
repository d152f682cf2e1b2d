//! Write-through overlay on top of a [`CachePool`].
//!
//! # Invariants
//! - Reads consult staged entries before the pool.
//! - Only `commit` makes a staged entry durable; `discard` drops the rest.

use super::{CachePool, CacheResult, ConjunctViolation};
use log::debug;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Cache view used by conjunct evaluation.
pub struct StagedCache {
    pool: Rc<dyn CachePool>,
    staged: RefCell<BTreeMap<String, Vec<ConjunctViolation>>>,
}

impl StagedCache {
    pub fn new(pool: Rc<dyn CachePool>) -> Self {
        Self {
            pool,
            staged: RefCell::new(BTreeMap::new()),
        }
    }

    /// Durable pool underneath the overlay.
    pub fn pool(&self) -> &dyn CachePool {
        self.pool.as_ref()
    }

    pub fn get(&self, key: &str) -> CacheResult<Option<Vec<ConjunctViolation>>> {
        if let Some(violations) = self.staged.borrow().get(key) {
            return Ok(Some(violations.clone()));
        }
        self.pool.get(key)
    }

    pub fn contains(&self, key: &str) -> CacheResult<bool> {
        if self.staged.borrow().contains_key(key) {
            return Ok(true);
        }
        self.pool.contains(key)
    }

    /// Bulk read: staged hits are served locally, the rest in one pool call.
    pub fn get_many(
        &self,
        keys: &[&str],
    ) -> CacheResult<BTreeMap<String, Vec<ConjunctViolation>>> {
        let staged = self.staged.borrow();
        let mut found = BTreeMap::new();
        let mut remaining = Vec::new();
        for key in keys {
            match staged.get(*key) {
                Some(violations) => {
                    found.insert((*key).to_string(), violations.clone());
                }
                None => remaining.push(*key),
            }
        }
        drop(staged);

        if !remaining.is_empty() {
            found.extend(self.pool.get_many(&remaining)?);
        }
        Ok(found)
    }

    /// Deferred save, visible to later reads through this overlay.
    pub fn stage(&self, key: &str, violations: Vec<ConjunctViolation>) {
        self.staged.borrow_mut().insert(key.to_string(), violations);
    }

    pub fn is_staged(&self, key: &str) -> bool {
        self.staged.borrow().contains_key(key)
    }

    pub fn staged_len(&self) -> usize {
        self.staged.borrow().len()
    }

    /// Persists the staged entries of `keys`; keys without one are skipped.
    ///
    /// Returns the number of entries written to the pool.
    pub fn commit<'k>(&self, keys: impl IntoIterator<Item = &'k str>) -> CacheResult<usize> {
        let mut written = 0;
        for key in keys {
            let Some(violations) = self.staged.borrow_mut().remove(key) else {
                continue;
            };
            self.pool.save(key, &violations)?;
            written += 1;
        }
        debug!("event=cache_commit module=cache status=ok written={written}");
        Ok(written)
    }

    /// Drops every staged entry.
    pub fn discard(&self) {
        let dropped = {
            let mut staged = self.staged.borrow_mut();
            let count = staged.len();
            staged.clear();
            count
        };
        if dropped > 0 {
            debug!("event=cache_discard module=cache status=ok dropped={dropped}");
        }
    }

    /// Removes the entry from both the overlay and the pool.
    pub fn clear(&self, key: &str) -> CacheResult<()> {
        self.staged.borrow_mut().remove(key);
        self.pool.clear(key)
    }
}
