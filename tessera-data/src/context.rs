use crate::entity::{Entity, Table};
use crate::error::DataError;
use crate::plan::Plan;
use crate::query::Query;
use crate::record::Record;
use crate::sql::Dialect;
use crate::value::Value;

/// A unit of work over one store.
///
/// Methods take `&self`: a context tracks pending changes internally and is
/// meant to be used from a single thread. Queries only see saved rows;
/// [`find`](Self::find) also sees tracked, not yet saved changes.
pub trait PersistenceContext {
    fn dialect(&self) -> Dialect {
        Dialect::Generic
    }

    /// Run a store-rooted plan.
    fn fetch(&self, plan: &Plan) -> Result<Vec<Record>, DataError>;

    /// Count the rows of a store-rooted plan.
    fn count(&self, plan: &Plan) -> Result<u64, DataError>;

    /// Look a row up by key, preferring the tracked copy.
    fn find(&self, table: &Table, key: i64) -> Result<Option<Record>, DataError>;

    /// Track a new row. Returns its key, assigning one when the record has none.
    fn insert(&self, table: &Table, record: Record) -> Result<i64, DataError>;

    /// Track a full replacement of an existing row.
    fn mark_modified(&self, table: &Table, record: Record) -> Result<(), DataError>;

    /// Track an update of some fields of an existing row.
    fn update_fields(&self, table: &Table, key: i64, changes: Record) -> Result<(), DataError>;

    /// Track a deletion.
    fn remove(&self, table: &Table, key: i64) -> Result<(), DataError>;

    /// Re-read a row from the store, discarding its tracked changes.
    fn reload(&self, table: &Table, key: i64) -> Result<Option<Record>, DataError>;

    fn begin_transaction(&self) -> Result<Box<dyn Transaction + '_>, DataError>;

    /// Execute a raw command immediately. Returns the affected row count.
    fn execute_raw(&self, command: &str, params: &[Value]) -> Result<u64, DataError>;

    /// Run a raw query immediately.
    fn query_raw(&self, command: &str, params: &[Value]) -> Result<Vec<Record>, DataError>;

    /// Persist every tracked change. Fails with `PersistValidationFailed`
    /// when the store rejects them, leaving the changes tracked.
    fn save_changes(&self) -> Result<u64, DataError>;
}

/// An open transaction.
///
/// Dropping an active handle rolls the transaction back.
pub trait Transaction {
    fn commit(&mut self) -> Result<(), DataError>;
    fn rollback(&mut self) -> Result<(), DataError>;
    /// False once committed or rolled back.
    fn is_active(&self) -> bool;
}

impl<'c> dyn PersistenceContext + 'c {
    /// The lazy sequence of every row of `E`'s table.
    pub fn set<E: Entity>(&'c self) -> Query<'c, E> {
        Query::table(self)
    }
}
