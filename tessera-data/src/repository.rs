use std::cell::RefCell;

use crate::config::DataConfig;
use crate::context::{PersistenceContext, Transaction};
use crate::entity::{Entity, Field, Model};
use crate::error::DataError;
use crate::expr::Expr;
use crate::plan::Projection;
use crate::query::Query;
use crate::record::Record;
use crate::value::{FromValue, Value};

/// What [`Repository::commit`] does when the store rejects pending changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommitPolicy {
    /// Return the `PersistValidationFailed` error.
    #[default]
    Surface,
    /// Log the failure, keep it for [`Repository::take_validation_failure`]
    /// and report success.
    Suppress,
}

/// Typed CRUD over a persistence context.
///
/// Mutations are tracked by the context and only reach the store on
/// [`commit`](Self::commit). Listing queries skip soft-deleted rows of
/// entities that declare a soft-delete column.
pub struct Repository<'c> {
    ctx: &'c dyn PersistenceContext,
    commit_policy: CommitPolicy,
    last_failure: RefCell<Option<DataError>>,
}

impl std::fmt::Debug for Repository<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("commit_policy", &self.commit_policy)
            .finish_non_exhaustive()
    }
}

impl<'c> Repository<'c> {
    pub fn new(ctx: &'c dyn PersistenceContext) -> Self {
        Repository {
            ctx,
            commit_policy: CommitPolicy::default(),
            last_failure: RefCell::new(None),
        }
    }

    pub fn with_commit_policy(mut self, policy: CommitPolicy) -> Self {
        self.commit_policy = policy;
        self
    }

    pub fn with_config(self, config: &DataConfig) -> Self {
        self.with_commit_policy(config.commit_policy)
    }

    pub fn context(&self) -> &'c dyn PersistenceContext {
        self.ctx
    }

    pub fn commit_policy(&self) -> CommitPolicy {
        self.commit_policy
    }

    // ── reads ───────────────────────────────────────────────────────────

    /// Every live row of `E`, lazily.
    pub fn query<E: Entity>(&self) -> Query<'c, E> {
        let query = Query::<E>::table(self.ctx);
        match E::TABLE.soft_delete {
            Some(column) => query.filter(Expr::column(column).eq(false)),
            None => query,
        }
    }

    /// Look up by key, seeing changes not committed yet.
    pub fn find<E: Entity>(&self, key: i64) -> Result<Option<E>, DataError> {
        self.ctx
            .find(&E::TABLE, key)?
            .map(|record| E::from_record(&record))
            .transpose()
    }

    pub fn get<E: Entity>(&self, key: i64) -> Result<Option<E>, DataError> {
        self.get_query_by_id::<E>(key).first()
    }

    /// First match in the store's natural order.
    pub fn get_by<E: Entity>(&self, predicate: Expr) -> Result<Option<E>, DataError> {
        self.query::<E>().filter(predicate).first()
    }

    pub fn get_query_by_id<E: Entity>(&self, key: i64) -> Query<'c, E> {
        self.query::<E>().filter(E::key_field().eq(key))
    }

    pub fn get_list<E: Entity>(&self, filter: Option<Expr>) -> Result<Vec<E>, DataError> {
        filtered(self.query::<E>(), filter).fetch()
    }

    pub fn get_list_by_ids<E: Entity>(&self, keys: &[i64]) -> Result<Vec<E>, DataError> {
        let keys = keys.iter().copied().map(Value::from).collect();
        self.query::<E>()
            .filter(E::key_field().expr().in_list(keys))
            .fetch()
    }

    /// Like [`get_list`](Self::get_list), letting `include` extend the
    /// query (joins, ordering) before it runs.
    pub fn get_list_with<E: Entity>(
        &self,
        filter: Option<Expr>,
        include: impl FnOnce(Query<'c, E>) -> Query<'c, E>,
    ) -> Result<Vec<E>, DataError> {
        include(filtered(self.query::<E>(), filter)).fetch()
    }

    /// A single field of the row with `key`.
    pub fn get_property<E: Entity, V: FromValue>(
        &self,
        key: i64,
        field: Field<E, V>,
    ) -> Result<Option<V>, DataError> {
        self.get_property_by(E::key_field().eq(key), field)
    }

    pub fn get_property_by<E: Entity, V: FromValue>(
        &self,
        predicate: Expr,
        field: Field<E, V>,
    ) -> Result<Option<V>, DataError> {
        let rows = self
            .query::<E>()
            .filter(predicate)
            .select::<Record>(Projection::new().keep(field.name()))
            .take(1)
            .fetch_records()?;
        rows.first().map(|row| row.get(field.name())).transpose()
    }

    pub fn any<E: Entity>(&self, predicate: Option<Expr>) -> Result<bool, DataError> {
        filtered(self.query::<E>(), predicate).any()
    }

    // ── tracked mutations ───────────────────────────────────────────────

    /// Track a new entity. Returns its key, assigned when the entity has none.
    pub fn add<E: Entity>(&self, entity: &E) -> Result<i64, DataError> {
        self.ctx.insert(&E::TABLE, entity.to_record())
    }

    pub fn add_range<E: Entity>(&self, entities: &[E]) -> Result<Vec<i64>, DataError> {
        entities.iter().map(|entity| self.add(entity)).collect()
    }

    pub fn update<E: Entity>(&self, entity: &E) -> Result<(), DataError> {
        self.ctx.mark_modified(&E::TABLE, entity.to_record())
    }

    pub fn update_field<E: Entity, V: Into<Value>>(
        &self,
        key: i64,
        field: Field<E, V>,
        value: impl Into<V>,
    ) -> Result<(), DataError> {
        let value: Value = Into::<V>::into(value).into();
        self.ctx
            .update_fields(&E::TABLE, key, Record::new().with(field.name(), value))
    }

    /// Update a field chosen by name; the name must be a column of `E`.
    pub fn update_field_named<E: Entity>(
        &self,
        key: i64,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), DataError> {
        if !E::TABLE.columns.iter().any(|column| *column == name) {
            return Err(DataError::MissingField {
                field: format!("{}.{name}", E::TABLE.name),
            });
        }
        self.ctx
            .update_fields(&E::TABLE, key, Record::new().with(name, value))
    }

    /// Update a field on every row matching `predicate`. Returns how many
    /// rows were updated; none is `NotFound`.
    pub fn update_field_by<E: Entity, V: Into<Value> + Clone>(
        &self,
        predicate: Expr,
        field: Field<E, V>,
        value: impl Into<V>,
    ) -> Result<u64, DataError> {
        let keys = self.keys_matching::<E>(predicate)?;
        if keys.is_empty() {
            return Err(DataError::NotFound(format!(
                "no {} row matches the predicate",
                E::TABLE.name
            )));
        }
        let value: V = value.into();
        for key in &keys {
            self.update_field(*key, field, value.clone())?;
        }
        Ok(keys.len() as u64)
    }

    /// Update when the entity already exists, add it otherwise.
    pub fn add_or_update<E: Entity>(&self, entity: &E) -> Result<i64, DataError> {
        let key = entity.key();
        if key != 0 && self.ctx.find(&E::TABLE, key)?.is_some() {
            self.update(entity)?;
            return Ok(key);
        }
        self.add(entity)
    }

    /// Returns false when no row has `key`.
    pub fn remove<E: Entity>(&self, key: i64) -> Result<bool, DataError> {
        if self.ctx.find(&E::TABLE, key)?.is_none() {
            return Ok(false);
        }
        self.ctx.remove(&E::TABLE, key)?;
        Ok(true)
    }

    /// Remove the first row matching `predicate`.
    pub fn remove_by<E: Entity>(&self, predicate: Expr) -> Result<bool, DataError> {
        let first = self
            .query::<E>()
            .filter(predicate)
            .select::<Record>(Projection::new().keep(E::TABLE.key))
            .take(1)
            .fetch_records()?;
        match first.first().and_then(|row| E::TABLE.key_of(row)) {
            Some(key) => self.remove::<E>(key),
            None => Ok(false),
        }
    }

    pub fn remove_entity<E: Entity>(&self, entity: &E) -> Result<bool, DataError> {
        self.remove::<E>(entity.key())
    }

    pub fn remove_range<E: Entity>(&self, entities: &[E]) -> Result<u64, DataError> {
        let mut removed = 0;
        for entity in entities {
            if self.remove_entity(entity)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn remove_range_by<E: Entity>(&self, predicate: Expr) -> Result<u64, DataError> {
        let mut removed = 0;
        for key in self.keys_matching::<E>(predicate)? {
            if self.remove::<E>(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Re-read `entity` from the store, discarding its tracked changes.
    pub fn reload<E: Entity>(&self, entity: &mut E) -> Result<(), DataError> {
        let key = entity.key();
        *entity = self.reload_by_id::<E>(key)?.ok_or_else(|| {
            DataError::NotFound(format!("{} with key {key}", E::TABLE.name))
        })?;
        Ok(())
    }

    pub fn reload_by_id<E: Entity>(&self, key: i64) -> Result<Option<E>, DataError> {
        self.ctx
            .reload(&E::TABLE, key)?
            .map(|record| E::from_record(&record))
            .transpose()
    }

    fn keys_matching<E: Entity>(&self, predicate: Expr) -> Result<Vec<i64>, DataError> {
        Ok(self
            .query::<E>()
            .filter(predicate)
            .select::<Record>(Projection::new().keep(E::TABLE.key))
            .fetch_records()?
            .iter()
            .filter_map(|row| E::TABLE.key_of(row))
            .collect())
    }

    // ── raw access, transactions, commit ────────────────────────────────

    pub fn execute_raw(&self, command: &str, params: &[Value]) -> Result<u64, DataError> {
        self.ctx.execute_raw(command, params)
    }

    /// Run a raw SELECT and decode every row as `M`.
    pub fn raw_query<M: Model>(&self, command: &str, params: &[Value]) -> Result<Vec<M>, DataError> {
        self.ctx
            .query_raw(command, params)?
            .iter()
            .map(M::from_record)
            .collect()
    }

    /// Run `action` in a transaction.
    ///
    /// The transaction is committed when the action succeeds and leaves it
    /// open. Otherwise it is rolled back and the error is returned wrapped
    /// in `TransactionFailed`.
    pub fn transaction<R>(
        &self,
        action: impl FnOnce(&mut dyn Transaction) -> Result<R, DataError>,
    ) -> Result<R, DataError> {
        let mut tx = self
            .ctx
            .begin_transaction()
            .map_err(|err| DataError::TransactionFailed(Box::new(err)))?;

        match action(&mut *tx) {
            Ok(value) => {
                if tx.is_active() {
                    if let Err(err) = tx.commit() {
                        rollback_quietly(&mut *tx);
                        return Err(DataError::TransactionFailed(Box::new(err)));
                    }
                    tracing::debug!("Transaction committed");
                }
                Ok(value)
            }
            Err(err) => {
                rollback_quietly(&mut *tx);
                tracing::warn!(error = %err, "Transaction rolled back");
                Err(DataError::TransactionFailed(Box::new(err)))
            }
        }
    }

    /// Persist tracked changes. Returns the number of rows written.
    ///
    /// Under [`CommitPolicy::Suppress`], a validation failure is logged,
    /// kept for [`take_validation_failure`](Self::take_validation_failure)
    /// and reported as zero rows written.
    pub fn commit(&self) -> Result<u64, DataError> {
        match self.ctx.save_changes() {
            Ok(saved) => Ok(saved),
            Err(err @ DataError::PersistValidationFailed(_))
                if self.commit_policy == CommitPolicy::Suppress =>
            {
                tracing::warn!(error = %err, "Commit validation failure suppressed");
                *self.last_failure.borrow_mut() = Some(err);
                Ok(0)
            }
            Err(err) => Err(err),
        }
    }

    /// The last validation failure swallowed by a suppressing commit.
    pub fn take_validation_failure(&self) -> Option<DataError> {
        self.last_failure.borrow_mut().take()
    }
}

fn filtered<E>(query: Query<'_, E>, filter: Option<Expr>) -> Query<'_, E> {
    match filter {
        Some(predicate) => query.filter(predicate),
        None => query,
    }
}

fn rollback_quietly(tx: &mut dyn Transaction) {
    if tx.is_active() {
        if let Err(err) = tx.rollback() {
            tracing::error!(error = %err, "Transaction rollback failed");
        }
    }
}
