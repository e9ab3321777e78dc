use std::fmt;
use std::marker::PhantomData;

use crate::error::DataError;
use crate::expr::{Expr, OrderKey};
use crate::record::Record;
use crate::value::Value;

/// A shape that can travel through queries: entities, views and models.
///
/// Usually derived with `#[derive(Model)]`.
pub trait Model: Sized + 'static {
    fn from_record(record: &Record) -> Result<Self, DataError>;
    fn to_record(&self) -> Record;
}

/// Types carrying a numeric primary key.
pub trait Identified {
    fn key(&self) -> i64;
}

/// A store-backed model.
///
/// # Example
///
/// ```ignore
/// #[derive(Model, Entity)]
/// #[entity(table = "orders", soft_delete = "is_deleted")]
/// pub struct Order {
///     pub id: i64,
///     pub customer: String,
///     pub is_deleted: bool,
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not an entity",
    note = "add `#[derive(Model, Entity)]` with `#[entity(table = \"...\")]`"
)]
pub trait Entity: Model + Identified {
    const TABLE: Table;

    /// Typed selector of the primary-key field, usable to build predicates.
    fn key_field() -> Field<Self, i64> {
        Field::new(Self::TABLE.key)
    }
}

/// Static description of the table an entity lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Table {
    pub name: &'static str,
    pub key: &'static str,
    pub columns: &'static [&'static str],
    /// Column holding the soft-delete flag, if any.
    pub soft_delete: Option<&'static str>,
}

impl Table {
    pub const fn new(name: &'static str, key: &'static str, columns: &'static [&'static str]) -> Self {
        Table {
            name,
            key,
            columns,
            soft_delete: None,
        }
    }

    pub const fn with_soft_delete(mut self, column: &'static str) -> Self {
        self.soft_delete = Some(column);
        self
    }

    /// Read the key of a record of this table. `None` when unset or zero.
    pub fn key_of(&self, record: &Record) -> Option<i64> {
        match record.value(self.key) {
            Some(Value::I64(0)) | Some(Value::Null) | None => None,
            Some(value) => value.as_i64(),
        }
    }
}

/// Typed selector of one field of `M` holding a `V`.
///
/// Generated as associated constants by `#[derive(Model)]`:
/// `Order::CUSTOMER.eq("acme")`.
pub struct Field<M, V> {
    name: &'static str,
    _marker: PhantomData<fn() -> (M, V)>,
}

impl<M, V> Clone for Field<M, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M, V> Copy for Field<M, V> {}

impl<M, V> fmt::Debug for Field<M, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.name).finish()
    }
}

impl<M, V> Field<M, V> {
    pub const fn new(name: &'static str) -> Self {
        Field {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn expr(&self) -> Expr {
        Expr::column(self.name)
    }

    pub fn is_null(&self) -> Expr {
        self.expr().is_null()
    }

    pub fn is_not_null(&self) -> Expr {
        self.expr().is_not_null()
    }

    pub fn asc(&self) -> OrderKey {
        OrderKey::asc(self.expr())
    }

    pub fn desc(&self) -> OrderKey {
        OrderKey::desc(self.expr())
    }
}

impl<M, V: Into<Value>> Field<M, V> {
    pub fn eq(&self, value: impl Into<V>) -> Expr {
        self.expr().eq(Expr::value(value.into()))
    }

    pub fn ne(&self, value: impl Into<V>) -> Expr {
        self.expr().ne(Expr::value(value.into()))
    }

    pub fn lt(&self, value: impl Into<V>) -> Expr {
        self.expr().lt(Expr::value(value.into()))
    }

    pub fn le(&self, value: impl Into<V>) -> Expr {
        self.expr().le(Expr::value(value.into()))
    }

    pub fn gt(&self, value: impl Into<V>) -> Expr {
        self.expr().gt(Expr::value(value.into()))
    }

    pub fn ge(&self, value: impl Into<V>) -> Expr {
        self.expr().ge(Expr::value(value.into()))
    }

    pub fn is_in<I>(&self, values: I) -> Expr
    where
        I: IntoIterator,
        I::Item: Into<V>,
    {
        self.expr()
            .in_list(values.into_iter().map(|v| Into::<V>::into(v).into()).collect())
    }
}

impl<M> Field<M, String> {
    /// SQL `LIKE` with `%` and `_` wildcards, ASCII case-insensitive.
    pub fn like(&self, pattern: &str) -> Expr {
        self.expr().like(pattern)
    }
}

impl<M> Field<M, Option<String>> {
    pub fn like(&self, pattern: &str) -> Expr {
        self.expr().like(pattern)
    }
}
