//! Mutation transactions
//!
//! A [`TransactionGuard`] opens a store transaction and rolls it back when
//! dropped uncommitted, so every early return from a mutation undoes its
//! writes.

use crate::observability::Logger;
use crate::store::{ResourceStore, StoreResult};

pub struct TransactionGuard<'a> {
    store: &'a dyn ResourceStore,
    entity: &'a str,
    finished: bool,
}

impl<'a> TransactionGuard<'a> {
    pub fn begin(store: &'a dyn ResourceStore, entity: &'a str) -> StoreResult<Self> {
        store.begin()?;
        Ok(Self {
            store,
            entity,
            finished: false,
        })
    }

    pub fn commit(mut self) -> StoreResult<()> {
        // A failed commit still rolls back on drop
        self.store.commit()?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match self.store.rollback() {
            Ok(()) => Logger::warn("TRANSACTION_ROLLED_BACK", &[("resource", self.entity)]),
            Err(err) => Logger::error(
                "TRANSACTION_ROLLBACK_FAILED",
                &[("resource", self.entity), ("reason", err.to_string().as_str())],
            ),
        }
    }
}
