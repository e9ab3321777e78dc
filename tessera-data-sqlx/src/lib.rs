//! # tessera-data-sqlx: SQLx backend for the Tessera data layer
//!
//! This crate provides a [SQLx](https://github.com/launchbadge/sqlx)-backed
//! [`PersistenceContext`](tessera_data::PersistenceContext) for SQLite.
//! Everything above the context (repositories, projection, search, the
//! generic service) comes from [`tessera-data`] unchanged.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SqliteContext`] | Persistence context on one SQLite connection |
//! | [`SqliteTransaction`] | `BEGIN`/`COMMIT` handle returned by `begin_transaction` |
//! | [`SqlxErrorExt`] | Converts `sqlx::Error` into `DataError` (`.into_data_error()`) |
//! | [`SqlxResult<T>`] | Type alias for `Result<T, DataError>` |
//!
//! # Feature flags
//!
//! | Feature  | Driver |
//! |----------|--------|
//! | `sqlite` (default) | SQLite via `sqlx/sqlite` |
//!
//! # Quick start
//!
//! ```ignore
//! use tessera_data::{PersistenceContext, Repository};
//! use tessera_data_sqlx::SqliteContext;
//!
//! let ctx = SqliteContext::connect("sqlite::memory:")?;
//! ctx.execute_raw("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)", &[])?;
//!
//! let repo = Repository::new(&ctx);
//! repo.add(&Item { id: 0, name: "bolt".into() })?;
//! repo.commit()?;
//! ```
//!
//! # Configuration
//!
//! [`SqliteContext::from_config`] reads the connection URL from
//! `tessera.sqlx.url`.
//!
//! # Error bridging
//!
//! Constraint violations raised while saving (`UNIQUE`, `NOT NULL`,
//! `FOREIGN KEY`, `CHECK`) surface as `DataError::PersistValidationFailed`;
//! every other driver error becomes `DataError::Database`.

pub mod error;
#[cfg(feature = "sqlite")]
mod row;

#[cfg(feature = "sqlite")]
pub mod context;
#[cfg(feature = "sqlite")]
pub mod tx;

pub use error::{SqlxErrorExt, SqlxResult};

#[cfg(feature = "sqlite")]
pub use context::SqliteContext;
#[cfg(feature = "sqlite")]
pub use tx::SqliteTransaction;

/// Re-exports of the most commonly used types from both `tessera-data` and this crate.
pub mod prelude {
    #[cfg(feature = "sqlite")]
    pub use crate::SqliteContext;
    pub use crate::SqlxErrorExt;
    pub use tessera_data::prelude::*;
}
