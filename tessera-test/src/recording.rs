use std::cell::Cell;

use tessera_data::{
    DataError, Dialect, MemoryContext, PersistenceContext, Plan, Record, Table, Transaction,
    Value,
};

/// Snapshot of what a [`RecordingContext`] has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionCounts {
    pub begun: u32,
    pub commits: u32,
    pub rollbacks: u32,
    pub saves: u32,
}

#[derive(Debug, Default)]
struct Counters {
    begun: Cell<u32>,
    commits: Cell<u32>,
    rollbacks: Cell<u32>,
    saves: Cell<u32>,
    fail_commit: Cell<bool>,
}

fn bump(cell: &Cell<u32>) {
    cell.set(cell.get() + 1);
}

/// A [`MemoryContext`] that counts transaction outcomes and saves.
///
/// ```ignore
/// let ctx = RecordingContext::new(MemoryContext::new());
/// let repo = Repository::new(&ctx);
/// let _ = repo.transaction(|_| Err::<(), _>(DataError::NotFound("x".into())));
/// assert_eq!(ctx.counts().rollbacks, 1);
/// ```
#[derive(Debug)]
pub struct RecordingContext {
    inner: MemoryContext,
    counters: Counters,
}

impl RecordingContext {
    pub fn new(inner: MemoryContext) -> Self {
        RecordingContext {
            inner,
            counters: Counters::default(),
        }
    }

    /// Make every transaction commit fail with a database error.
    pub fn failing_commits(self) -> Self {
        self.counters.fail_commit.set(true);
        self
    }

    pub fn inner(&self) -> &MemoryContext {
        &self.inner
    }

    pub fn counts(&self) -> TransactionCounts {
        TransactionCounts {
            begun: self.counters.begun.get(),
            commits: self.counters.commits.get(),
            rollbacks: self.counters.rollbacks.get(),
            saves: self.counters.saves.get(),
        }
    }
}

impl PersistenceContext for RecordingContext {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn fetch(&self, plan: &Plan) -> Result<Vec<Record>, DataError> {
        self.inner.fetch(plan)
    }

    fn count(&self, plan: &Plan) -> Result<u64, DataError> {
        self.inner.count(plan)
    }

    fn find(&self, table: &Table, key: i64) -> Result<Option<Record>, DataError> {
        self.inner.find(table, key)
    }

    fn insert(&self, table: &Table, record: Record) -> Result<i64, DataError> {
        self.inner.insert(table, record)
    }

    fn mark_modified(&self, table: &Table, record: Record) -> Result<(), DataError> {
        self.inner.mark_modified(table, record)
    }

    fn update_fields(&self, table: &Table, key: i64, changes: Record) -> Result<(), DataError> {
        self.inner.update_fields(table, key, changes)
    }

    fn remove(&self, table: &Table, key: i64) -> Result<(), DataError> {
        self.inner.remove(table, key)
    }

    fn reload(&self, table: &Table, key: i64) -> Result<Option<Record>, DataError> {
        self.inner.reload(table, key)
    }

    fn begin_transaction(&self) -> Result<Box<dyn Transaction + '_>, DataError> {
        let inner = self.inner.begin_transaction()?;
        bump(&self.counters.begun);
        Ok(Box::new(RecordingTransaction {
            inner,
            counters: &self.counters,
        }))
    }

    fn execute_raw(&self, command: &str, params: &[Value]) -> Result<u64, DataError> {
        self.inner.execute_raw(command, params)
    }

    fn query_raw(&self, command: &str, params: &[Value]) -> Result<Vec<Record>, DataError> {
        self.inner.query_raw(command, params)
    }

    fn save_changes(&self) -> Result<u64, DataError> {
        let saved = self.inner.save_changes()?;
        bump(&self.counters.saves);
        Ok(saved)
    }
}

struct RecordingTransaction<'a> {
    inner: Box<dyn Transaction + 'a>,
    counters: &'a Counters,
}

impl Transaction for RecordingTransaction<'_> {
    fn commit(&mut self) -> Result<(), DataError> {
        if self.counters.fail_commit.get() {
            tracing::debug!("Refusing transaction commit");
            return Err(DataError::database(std::io::Error::other("commit refused")));
        }
        self.inner.commit()?;
        bump(&self.counters.commits);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DataError> {
        self.inner.rollback()?;
        bump(&self.counters.rollbacks);
        tracing::debug!(rollbacks = self.counters.rollbacks.get(), "Transaction rolled back");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.inner.is_active()
    }
}

impl Drop for RecordingTransaction<'_> {
    fn drop(&mut self) {
        if self.inner.is_active() {
            let _ = self.rollback();
        }
    }
}
