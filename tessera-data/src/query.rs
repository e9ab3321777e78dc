use std::fmt;
use std::marker::PhantomData;

use crate::context::PersistenceContext;
use crate::entity::{Entity, Model};
use crate::error::DataError;
use crate::expr::{Expr, OrderKey};
use crate::plan::{self, Join, JoinKind, Plan, Projection, Stage};
use crate::record::Record;
use crate::sql::{Dialect, SqlRenderer, SqlStatement};

/// A lazy, typed sequence of `T` bound to a persistence context.
///
/// Stages accumulate in a [`Plan`]; nothing runs until one of the
/// terminal methods (`fetch`, `first`, `count`, `any`, ...) is called.
/// A query rooted at a store table runs as a single statement in the store;
/// a query rooted at in-memory rows runs in memory.
///
/// ```ignore
/// let recent = ctx
///     .set::<Order>()
///     .filter(Order::TOTAL.gt(100))
///     .order_by(Order::ID.desc())
///     .take(10)
///     .fetch()?;
/// ```
pub struct Query<'c, T> {
    ctx: &'c dyn PersistenceContext,
    plan: Plan,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Query<'_, T> {
    fn clone(&self) -> Self {
        Query {
            ctx: self.ctx,
            plan: self.plan.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Query<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("type", &std::any::type_name::<T>())
            .field("plan", &self.plan)
            .finish()
    }
}

impl<'c, T: Entity> Query<'c, T> {
    /// Every row of `T`'s table.
    pub fn table(ctx: &'c dyn PersistenceContext) -> Self {
        Self::from_plan(ctx, Plan::scan(T::TABLE))
    }
}

impl<'c, T: Model> Query<'c, T> {
    /// An in-memory sequence over already loaded values.
    pub fn from_models(ctx: &'c dyn PersistenceContext, models: &[T]) -> Self {
        Self::from_records(ctx, models.iter().map(Model::to_record).collect())
    }

    /// Run the query and decode each row.
    pub fn fetch(&self) -> Result<Vec<T>, DataError> {
        self.fetch_records()?.iter().map(T::from_record).collect()
    }

    /// First element in the query's order, if any.
    pub fn first(&self) -> Result<Option<T>, DataError> {
        self.clone()
            .take(1)
            .fetch_records()?
            .first()
            .map(T::from_record)
            .transpose()
    }
}

impl<'c, T> Query<'c, T> {
    pub fn from_plan(ctx: &'c dyn PersistenceContext, plan: Plan) -> Self {
        Query {
            ctx,
            plan,
            _marker: PhantomData,
        }
    }

    pub fn from_records(ctx: &'c dyn PersistenceContext, records: Vec<Record>) -> Self {
        Self::from_plan(ctx, Plan::rows(records))
    }

    pub fn context(&self) -> &'c dyn PersistenceContext {
        self.ctx
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn into_plan(self) -> Plan {
        self.plan
    }

    /// True while the whole pipeline still runs in the store.
    pub fn is_deferred(&self) -> bool {
        self.plan.is_deferred()
    }

    pub fn filter(self, predicate: Expr) -> Self {
        self.then(Stage::Filter(predicate))
    }

    /// Order by `key`. Previous orderings are kept as tie-breakers.
    pub fn order_by(self, key: OrderKey) -> Self {
        self.then(Stage::OrderBy(vec![key]))
    }

    pub fn order_by_all(self, keys: Vec<OrderKey>) -> Self {
        if keys.is_empty() {
            return self;
        }
        self.then(Stage::OrderBy(keys))
    }

    pub fn skip(self, n: u64) -> Self {
        self.then(Stage::Skip(n))
    }

    pub fn take(self, n: u64) -> Self {
        self.then(Stage::Take(n))
    }

    /// Reshape every element into a `U` through a field projection.
    pub fn select<U>(self, projection: Projection) -> Query<'c, U> {
        Query::from_plan(self.ctx, self.plan.then(Stage::Project(projection)))
    }

    /// Inner equi-join with `right`; right fields are added as `{prefix}{name}`.
    pub fn join<U, R>(
        self,
        right: Query<'c, R>,
        left_key: &str,
        right_key: &str,
        prefix: &str,
    ) -> Query<'c, U> {
        self.join_with(JoinKind::Inner, right, left_key, right_key, prefix)
    }

    /// Like [`join`](Self::join), keeping unmatched left rows with null right fields.
    pub fn left_join<U, R>(
        self,
        right: Query<'c, R>,
        left_key: &str,
        right_key: &str,
        prefix: &str,
    ) -> Query<'c, U> {
        self.join_with(JoinKind::Left, right, left_key, right_key, prefix)
    }

    fn join_with<U, R>(
        self,
        kind: JoinKind,
        right: Query<'c, R>,
        left_key: &str,
        right_key: &str,
        prefix: &str,
    ) -> Query<'c, U> {
        let join = Join {
            kind,
            right: right.plan,
            left_key: left_key.to_string(),
            right_key: right_key.to_string(),
            prefix: prefix.to_string(),
        };
        Query::from_plan(self.ctx, self.plan.then(Stage::Join(Box::new(join))))
    }

    /// Reinterpret the elements as `U` without reshaping them.
    pub fn cast<U>(self) -> Query<'c, U> {
        Query::from_plan(self.ctx, self.plan)
    }

    /// Run the query now and continue from its results in memory.
    pub fn materialize(self) -> Result<Query<'c, T>, DataError> {
        let rows = self.fetch_records()?;
        Ok(Query::from_records(self.ctx, rows))
    }

    pub fn fetch_records(&self) -> Result<Vec<Record>, DataError> {
        plan::execute(&self.plan, self.ctx)
    }

    pub fn count(&self) -> Result<u64, DataError> {
        plan::count(&self.plan, self.ctx)
    }

    pub fn any(&self) -> Result<bool, DataError> {
        Ok(!self.clone().take(1).fetch_records()?.is_empty())
    }

    /// The statement the store would run for this query.
    pub fn to_sql(&self, dialect: Dialect) -> Result<SqlStatement, DataError> {
        SqlRenderer::new(dialect).select(&self.plan)
    }

    fn then(self, stage: Stage) -> Self {
        Query::from_plan(self.ctx, self.plan.then(stage))
    }
}
