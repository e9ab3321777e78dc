//! # Tessera
//!
//! A typed data access layer: declare entities and read models, register how
//! one type maps onto another, then query, project, search and persist
//! through a single persistence context.
//!
//! | Part | Where |
//! |------|-------|
//! | Entity contract, `#[derive(Model, Entity)]` | [`data::Entity`], [`Model`](macro@Model), [`Entity`](macro@Entity) |
//! | Lazy queries and SQL push-down | [`data::Query`], [`data::SqlRenderer`] |
//! | Mapping registry | [`data::MappingRegistry`] |
//! | Projection pipeline | [`data::Projector`] |
//! | Search engine | [`data::SearchEngine`], [`data::SearchSpec`] |
//! | Repository and generic service | [`data::Repository`], [`data::GenericService`] |
//! | Configuration, resources, tracing | re-exported from `tessera-core` |
//!
//! ```ignore
//! use tessera::prelude::*;
//!
//! #[derive(Debug, Clone, Model, Entity)]
//! #[entity(table = "customers", soft_delete = "is_deleted")]
//! struct Customer {
//!     id: i64,
//!     name: String,
//!     tier: String,
//!     is_deleted: bool,
//! }
//!
//! #[derive(Debug, Clone, Model)]
//! struct CustomerName {
//!     id: i64,
//!     name: String,
//! }
//!
//! let mut registry = MappingRegistry::new();
//! registry.register_projection::<Customer, CustomerName>(
//!     Projection::new().keep("id").keep("name"),
//! )?;
//! registry.freeze();
//!
//! let ctx = MemoryContext::new();
//! let service = GenericService::new(Repository::new(&ctx), Projector::new(Arc::new(registry))?);
//! let gold: Vec<CustomerName> = service.get_list::<Customer, _>(Some(Customer::TIER.eq("gold")))?;
//! ```
//!
//! # Feature flags
//!
//! | Feature | Enables |
//! |---------|---------|
//! | `sqlite` | [`data_sqlx::SqliteContext`] via `tessera-data-sqlx` |
//! | `full` | every optional backend |

// Derives resolve their support paths through `tessera::data` when the
// facade is a dependency.
pub extern crate tessera_core;
pub extern crate tessera_macros;

pub use tessera_core::*;
pub use tessera_data as data;
pub use tessera_macros::{Entity, Model};

#[cfg(feature = "sqlite")]
pub use tessera_data_sqlx as data_sqlx;

/// Unified prelude: import everything with `use tessera::prelude::*`.
pub mod prelude {
    pub use crate::{Entity, Model};
    pub use std::sync::Arc;
    pub use tessera_core::{init_tracing, LoggingConfig, ResourceRegistry, TesseraConfig};
    pub use tessera_data::prelude::*;
    pub use tessera_data::{MemoryContext, PersistenceContext};

    #[cfg(feature = "sqlite")]
    pub use tessera_data_sqlx::prelude::*;
}
