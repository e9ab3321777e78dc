use std::cell::{Cell, RefCell};
use std::fmt;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::Sqlite;
use tessera_core::TesseraConfig;
use tessera_data::plan::Stage;
use tessera_data::tracker::{ChangeTracker, EntryState};
use tessera_data::{
    col, DataError, Dialect, PersistenceContext, Plan, Record, SqlRenderer, SqlStatement, Table,
    Transaction, Value,
};

use crate::error::SqlxErrorExt;
use crate::row::{bind_all, decode_row};
use crate::tx::SqliteTransaction;

const SAVEPOINT: &str = "tessera_save";

/// A persistence context over one SQLite connection.
///
/// Plans are rendered with [`SqlRenderer`] and run in the database; pending
/// changes are tracked in memory until [`save_changes`](PersistenceContext::save_changes)
/// flushes them as `INSERT`/`UPDATE`/`DELETE` in one atomic step.
///
/// The context drives `sqlx` on its own current-thread runtime, so it must
/// not be used from inside an async task.
pub struct SqliteContext {
    runtime: tokio::runtime::Runtime,
    conn: RefCell<Option<PoolConnection<Sqlite>>>,
    renderer: SqlRenderer,
    pub(crate) tracker: RefCell<ChangeTracker>,
    pub(crate) snapshot: RefCell<Option<ChangeTracker>>,
    pub(crate) in_transaction: Cell<bool>,
}

impl fmt::Debug for SqliteContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteContext")
            .field("tracker", &self.tracker)
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

impl SqliteContext {
    /// Open `url` (e.g. `sqlite::memory:` or `sqlite://app.db?mode=rwc`).
    pub fn connect(url: &str) -> Result<Self, DataError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(DataError::database)?;
        // A single connection keeps an in-memory database alive and lets
        // `BEGIN`/`COMMIT` span several statements.
        let conn = runtime.block_on(async {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect(url)
                .await?;
            pool.acquire().await
        });
        let conn = conn.map_err(SqlxErrorExt::into_data_error)?;
        tracing::debug!(url, "SQLite context connected");
        Ok(SqliteContext {
            runtime,
            conn: RefCell::new(Some(conn)),
            renderer: SqlRenderer::new(Dialect::Sqlite),
            tracker: RefCell::new(ChangeTracker::new()),
            snapshot: RefCell::new(None),
            in_transaction: Cell::new(false),
        })
    }

    /// Connect to `tessera.sqlx.url`.
    pub fn from_config(config: &TesseraConfig) -> Result<Self, DataError> {
        let url: String = config
            .get("tessera.sqlx.url")
            .map_err(DataError::database)?;
        Self::connect(&url)
    }

    pub fn renderer(&self) -> &SqlRenderer {
        &self.renderer
    }

    pub(crate) fn run(&self, sql: &str) -> Result<u64, DataError> {
        self.execute(sql, &[]).map_err(SqlxErrorExt::into_data_error)
    }

    fn run_all(&self, statements: &[String]) -> Result<(), DataError> {
        for sql in statements {
            self.run(sql)?;
        }
        Ok(())
    }

    fn execute(&self, sql: &str, binds: &[Value]) -> Result<u64, sqlx::Error> {
        let mut conn = self.conn.borrow_mut();
        let conn = conn.as_mut().ok_or(sqlx::Error::PoolClosed)?;
        let result = self
            .runtime
            .block_on(bind_all(sql, binds).execute(&mut **conn))?;
        Ok(result.rows_affected())
    }

    fn fetch_rows(&self, sql: &str, binds: &[Value]) -> Result<Vec<Record>, DataError> {
        let mut conn = self.conn.borrow_mut();
        let conn = conn
            .as_mut()
            .ok_or_else(|| sqlx::Error::PoolClosed.into_data_error())?;
        let rows: Vec<SqliteRow> = self
            .runtime
            .block_on(bind_all(sql, binds).fetch_all(&mut **conn))
            .map_err(SqlxErrorExt::into_data_error)?;
        rows.iter().map(decode_row).collect()
    }

    fn fetch_statement(&self, statement: &SqlStatement) -> Result<Vec<Record>, DataError> {
        tracing::trace!(sql = %statement.sql, binds = statement.binds.len(), "SQLite query");
        self.fetch_rows(&statement.sql, &statement.binds)
    }

    fn stored(&self, table: &Table, key: i64) -> Result<Option<Record>, DataError> {
        let plan = Plan::scan(*table)
            .then(Stage::Filter(col(table.key).eq(key)))
            .then(Stage::Take(1));
        let statement = self.renderer.select(&plan)?;
        Ok(self.fetch_statement(&statement)?.into_iter().next())
    }

    fn next_key(&self, table: &Table) -> Result<i64, DataError> {
        let sql = format!(
            "SELECT MAX({}) AS max_key FROM {}",
            quoted(table.key),
            quoted(table.name)
        );
        let stored = self
            .fetch_rows(&sql, &[])?
            .first()
            .and_then(|row| row.value("max_key").and_then(Value::as_i64))
            .unwrap_or(0);
        let tracked = self.tracker.borrow().max_key(table).unwrap_or(0);
        Ok(stored.max(tracked) + 1)
    }

    fn is_known(&self, table: &Table, key: i64) -> Result<bool, DataError> {
        Ok(self.find(table, key)?.is_some())
    }

    /// Write every pending entry. Stops at the first rejected statement.
    fn flush(&self) -> Result<u64, DataError> {
        let tracker = self.tracker.borrow();
        let mut saved = 0;
        for entry in tracker.pending() {
            let statement = match entry.state {
                EntryState::Added => self.renderer.insert(&entry.table, &entry.record)?,
                EntryState::Modified => {
                    self.renderer.update(&entry.table, entry.key, &entry.record)?
                }
                EntryState::Deleted => self.renderer.delete(&entry.table, entry.key)?,
                EntryState::Unchanged => continue,
            };
            tracing::trace!(sql = %statement.sql, "SQLite write");
            self.execute(&statement.sql, &statement.binds)
                .map_err(|err| err.into_save_error(entry.table.name))?;
            saved += 1;
        }
        Ok(saved)
    }
}

impl Drop for SqliteContext {
    fn drop(&mut self) {
        // Returning the connection to its pool spawns onto the runtime.
        let _guard = self.runtime.enter();
        self.conn.get_mut().take();
    }
}

fn quoted(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

impl PersistenceContext for SqliteContext {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn fetch(&self, plan: &Plan) -> Result<Vec<Record>, DataError> {
        let statement = self.renderer.select(plan)?;
        self.fetch_statement(&statement)
    }

    fn count(&self, plan: &Plan) -> Result<u64, DataError> {
        let statement = self.renderer.count(plan)?;
        let rows = self.fetch_statement(&statement)?;
        let count = rows
            .first()
            .and_then(|row| row.iter().next())
            .and_then(|(_, value)| value.as_i64())
            .unwrap_or(0);
        Ok(count as u64)
    }

    fn find(&self, table: &Table, key: i64) -> Result<Option<Record>, DataError> {
        if let Some(entry) = self.tracker.borrow().get(table, key) {
            return Ok(match entry.state {
                EntryState::Deleted => None,
                _ => Some(entry.record.clone()),
            });
        }
        let Some(record) = self.stored(table, key)? else {
            return Ok(None);
        };
        self.tracker.borrow_mut().attach(table, key, record.clone());
        Ok(Some(record))
    }

    fn insert(&self, table: &Table, mut record: Record) -> Result<i64, DataError> {
        let key = match table.key_of(&record) {
            Some(key) => key,
            None => {
                let key = self.next_key(table)?;
                record.insert(table.key, key);
                key
            }
        };
        self.tracker.borrow_mut().add(table, key, record)?;
        Ok(key)
    }

    fn mark_modified(&self, table: &Table, record: Record) -> Result<(), DataError> {
        let key = table
            .key_of(&record)
            .ok_or_else(|| DataError::NotFound(format!("{} row without a key", table.name)))?;
        if !self.is_known(table, key)? {
            return Err(DataError::NotFound(format!("{} with key {key}", table.name)));
        }
        self.tracker.borrow_mut().modify(table, key, record)
    }

    fn update_fields(&self, table: &Table, key: i64, changes: Record) -> Result<(), DataError> {
        let base = self.stored(table, key)?;
        self.tracker
            .borrow_mut()
            .update_fields(table, key, base, &changes)
    }

    fn remove(&self, table: &Table, key: i64) -> Result<(), DataError> {
        if !self.is_known(table, key)? {
            return Err(DataError::NotFound(format!("{} with key {key}", table.name)));
        }
        let base = self.stored(table, key)?;
        self.tracker.borrow_mut().delete(table, key, base);
        Ok(())
    }

    fn reload(&self, table: &Table, key: i64) -> Result<Option<Record>, DataError> {
        self.tracker.borrow_mut().detach(table, key);
        self.find(table, key)
    }

    fn begin_transaction(&self) -> Result<Box<dyn Transaction + '_>, DataError> {
        if self.in_transaction.get() {
            return Err(DataError::NestedTransaction);
        }
        self.run("BEGIN")?;
        *self.snapshot.borrow_mut() = Some(self.tracker.borrow().clone());
        self.in_transaction.set(true);
        tracing::debug!("SQLite transaction started");
        Ok(Box::new(SqliteTransaction::new(self)))
    }

    fn execute_raw(&self, command: &str, params: &[Value]) -> Result<u64, DataError> {
        self.execute(command, params)
            .map_err(SqlxErrorExt::into_data_error)
    }

    fn query_raw(&self, command: &str, params: &[Value]) -> Result<Vec<Record>, DataError> {
        self.fetch_rows(command, params)
    }

    fn save_changes(&self) -> Result<u64, DataError> {
        if !self.tracker.borrow().has_changes() {
            return Ok(0);
        }
        // Inside a user transaction a savepoint keeps the flush atomic
        // without ending the outer transaction.
        let (begin, commit, abort) = match self.in_transaction.get() {
            true => (
                vec![format!("SAVEPOINT {SAVEPOINT}")],
                vec![format!("RELEASE {SAVEPOINT}")],
                vec![format!("ROLLBACK TO {SAVEPOINT}"), format!("RELEASE {SAVEPOINT}")],
            ),
            false => (
                vec!["BEGIN".to_string()],
                vec!["COMMIT".to_string()],
                vec!["ROLLBACK".to_string()],
            ),
        };
        self.run_all(&begin)?;
        match self.flush() {
            Ok(saved) => {
                self.run_all(&commit)?;
                self.tracker.borrow_mut().accept_all();
                tracing::debug!(saved, "SQLite changes saved");
                Ok(saved)
            }
            Err(err) => {
                if let Err(abort_err) = self.run_all(&abort) {
                    tracing::error!(error = %abort_err, "Failed to undo a rejected save");
                }
                Err(err)
            }
        }
    }
}
