use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;

use crate::config::DataConfig;
use crate::entity::{Entity, Model};
use crate::error::DataError;
use crate::expr::{Expr, OrderKey};
use crate::page::Page;
use crate::projection::Projector;
use crate::query::Query;

/// Take applied when a search does not set one.
pub const DEFAULT_TAKE: u64 = 1000;

/// Validated skip/take pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    skip: u64,
    take: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            skip: 0,
            take: DEFAULT_TAKE,
        }
    }
}

impl Pagination {
    /// Rejects a negative skip or a take below one.
    pub fn new(skip: i64, take: i64) -> Result<Self, DataError> {
        let skip = u64::try_from(skip).map_err(|_| {
            DataError::InvalidSearchSpecification(format!("skip must be >= 0, got {skip}"))
        })?;
        let take = u64::try_from(take).ok().filter(|t| *t >= 1).ok_or_else(|| {
            DataError::InvalidSearchSpecification(format!("take must be >= 1, got {take}"))
        })?;
        Ok(Pagination { skip, take })
    }

    pub fn skip(&self) -> u64 {
        self.skip
    }

    pub fn take(&self) -> u64 {
        self.take
    }
}

/// A search over the entities of one table, presented as `View`s.
///
/// The pipeline is: build the view, filter, count, order, paginate.
/// Implementors must say how results are ordered.
pub trait SearchModel {
    type Entity: Entity;
    type View: Model;

    fn pagination(&self) -> Pagination;

    fn build_view<'c>(
        &self,
        projector: &Projector,
        query: Query<'c, Self::Entity>,
    ) -> Result<Query<'c, Self::View>, DataError> {
        // Searching entities as themselves stays in the store.
        if TypeId::of::<Self::Entity>() == TypeId::of::<Self::View>() {
            return Ok(query.cast());
        }
        projector.project(query)
    }

    fn filter<'c>(&self, query: Query<'c, Self::View>) -> Query<'c, Self::View> {
        query
    }

    fn order<'c>(&self, query: Query<'c, Self::View>) -> Query<'c, Self::View>;
}

/// Generic search: optional filter, ordering keys and pagination.
///
/// ```ignore
/// let spec = SearchSpec::<Order, OrderView>::builder()
///     .filter(OrderView::TOTAL.gt(100))
///     .order_by(OrderView::ID.asc())
///     .skip(20)
///     .take(10)
///     .build()?;
/// ```
pub struct SearchSpec<E, V> {
    pagination: Pagination,
    order: Vec<OrderKey>,
    reverse: bool,
    filter: Option<Expr>,
    _marker: PhantomData<fn() -> (E, V)>,
}

impl<E, V> Clone for SearchSpec<E, V> {
    fn clone(&self) -> Self {
        SearchSpec {
            pagination: self.pagination,
            order: self.order.clone(),
            reverse: self.reverse,
            filter: self.filter.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E, V> fmt::Debug for SearchSpec<E, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchSpec")
            .field("pagination", &self.pagination)
            .field("order", &self.order)
            .field("reverse", &self.reverse)
            .field("filter", &self.filter)
            .finish()
    }
}

impl<E, V> SearchSpec<E, V> {
    pub fn builder() -> SearchSpecBuilder<E, V> {
        SearchSpecBuilder {
            skip: 0,
            take: None,
            default_take: DEFAULT_TAKE,
            order: Vec::new(),
            reverse: false,
            filter: None,
            _marker: PhantomData,
        }
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    pub fn is_reversed(&self) -> bool {
        self.reverse
    }
}

impl<E: Entity, V: Model> SearchModel for SearchSpec<E, V> {
    type Entity = E;
    type View = V;

    fn pagination(&self) -> Pagination {
        self.pagination
    }

    fn filter<'c>(&self, query: Query<'c, V>) -> Query<'c, V> {
        match &self.filter {
            Some(predicate) => query.filter(predicate.clone()),
            None => query,
        }
    }

    fn order<'c>(&self, query: Query<'c, V>) -> Query<'c, V> {
        let keys = self
            .order
            .iter()
            .cloned()
            .map(|key| if self.reverse { key.reversed() } else { key })
            .collect();
        query.order_by_all(keys)
    }
}

pub struct SearchSpecBuilder<E, V> {
    skip: i64,
    take: Option<i64>,
    default_take: u64,
    order: Vec<OrderKey>,
    reverse: bool,
    filter: Option<Expr>,
    _marker: PhantomData<fn() -> (E, V)>,
}

impl<E, V> SearchSpecBuilder<E, V> {
    /// Add an ordering key; the first key added sorts first.
    pub fn order_by(mut self, key: OrderKey) -> Self {
        self.order.push(key);
        self
    }

    /// Flip every ordering key.
    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Narrow the view; repeated calls are combined with AND.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = skip;
        self
    }

    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    /// Use the configured default take when none is set.
    pub fn config(mut self, config: &DataConfig) -> Self {
        self.default_take = config.default_take;
        self
    }

    pub fn build(self) -> Result<SearchSpec<E, V>, DataError> {
        if self.order.is_empty() {
            return Err(DataError::InvalidSearchSpecification(
                "an ordering key is required".into(),
            ));
        }
        let take = match self.take {
            Some(take) => take,
            None => i64::try_from(self.default_take).unwrap_or(i64::MAX),
        };
        Ok(SearchSpec {
            pagination: Pagination::new(self.skip, take)?,
            order: self.order,
            reverse: self.reverse,
            filter: self.filter,
            _marker: PhantomData,
        })
    }
}

/// A paginated, still lazy view sequence plus the filtered population size.
#[derive(Debug)]
pub struct SearchResult<'c, V> {
    pub query: Query<'c, V>,
    pub count: u64,
    pub pagination: Pagination,
}

impl<V: Model> SearchResult<'_, V> {
    pub fn fetch(self) -> Result<Page<V>, DataError> {
        Ok(Page::new(self.query.fetch()?, &self.pagination, self.count))
    }
}

/// Runs [`SearchModel`]s.
#[derive(Debug, Clone)]
pub struct SearchEngine {
    projector: Projector,
}

impl SearchEngine {
    pub fn new(projector: Projector) -> Self {
        SearchEngine { projector }
    }

    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    pub fn find<'c, S: SearchModel>(
        &self,
        model: &S,
        query: Query<'c, S::Entity>,
    ) -> Result<SearchResult<'c, S::View>, DataError> {
        let view = model.build_view(&self.projector, query)?;
        let filtered = model.filter(view);
        let count = filtered.count()?;
        let pagination = model.pagination();
        let query = model
            .order(filtered)
            .skip(pagination.skip())
            .take(pagination.take());
        tracing::debug!(
            count,
            skip = pagination.skip(),
            take = pagination.take(),
            deferred = query.is_deferred(),
            "Search prepared"
        );
        Ok(SearchResult {
            query,
            count,
            pagination,
        })
    }
}
