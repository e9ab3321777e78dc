//! Transaction handle for [`SqliteContext`].

use tessera_data::{DataError, Transaction};

use crate::context::SqliteContext;

/// An open `BEGIN ... COMMIT` block on the context's connection.
///
/// Rolling back also restores the change tracker to its state at `BEGIN`.
/// Dropping an active handle rolls back.
pub struct SqliteTransaction<'a> {
    ctx: &'a SqliteContext,
    active: bool,
}

impl<'a> SqliteTransaction<'a> {
    pub(crate) fn new(ctx: &'a SqliteContext) -> Self {
        SqliteTransaction { ctx, active: true }
    }

    fn ensure_active(&self) -> Result<(), DataError> {
        match self.active {
            true => Ok(()),
            false => Err(DataError::Unsupported("transaction already finished".into())),
        }
    }

    fn finish(&mut self) {
        self.active = false;
        self.ctx.in_transaction.set(false);
    }
}

impl Transaction for SqliteTransaction<'_> {
    fn commit(&mut self) -> Result<(), DataError> {
        self.ensure_active()?;
        let result = self.ctx.run("COMMIT");
        if result.is_ok() {
            self.ctx.snapshot.borrow_mut().take();
            self.finish();
            tracing::debug!("SQLite transaction committed");
        }
        result.map(|_| ())
    }

    fn rollback(&mut self) -> Result<(), DataError> {
        self.ensure_active()?;
        let result = self.ctx.run("ROLLBACK");
        if let Some(tracker) = self.ctx.snapshot.borrow_mut().take() {
            *self.ctx.tracker.borrow_mut() = tracker;
        }
        self.finish();
        tracing::debug!("SQLite transaction rolled back");
        result.map(|_| ())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.active {
            if let Err(err) = self.rollback() {
                tracing::error!(error = %err, "Failed to roll back a dropped transaction");
            }
        }
    }
}
