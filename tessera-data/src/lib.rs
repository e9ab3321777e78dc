//! Typed data access: lazy queries, SQL push-down, cross-type projection,
//! search and CRUD over a persistence context.

pub mod config;
pub mod context;
pub mod copier;
pub mod entity;
pub mod error;
pub mod expr;
pub mod mapping;
pub mod memory;
pub mod page;
pub mod plan;
pub mod projection;
pub mod query;
pub mod record;
pub mod repository;
pub mod search;
pub mod service;
pub mod sql;
pub mod tracker;
pub mod value;

pub use config::DataConfig;
pub use context::{PersistenceContext, Transaction};
pub use copier::{FieldCopier, ObjectCopier};
pub use entity::{Entity, Field, Identified, Model, Table};
pub use error::{DataError, ValidationFailure};
pub use expr::{col, lit, Expr, OrderKey};
pub use mapping::{DuplicatePolicy, MappingKind, MappingRegistry, TypePair};
pub use memory::{Constraint, MemoryContext};
pub use page::Page;
pub use plan::{JoinKind, Plan, Projection};
pub use projection::Projector;
pub use query::Query;
pub use record::Record;
pub use repository::{CommitPolicy, Repository};
pub use search::{Pagination, SearchEngine, SearchModel, SearchResult, SearchSpec, DEFAULT_TAKE};
pub use service::GenericService;
pub use sql::{Dialect, SqlRenderer, SqlStatement};
pub use value::{FromValue, Value};

pub mod prelude {
    //! Re-exports of the most commonly used data types.
    pub use crate::{
        col, lit, CommitPolicy, DataError, Entity, Expr, Field, GenericService, Identified,
        MappingRegistry, Model, Page, Pagination, PersistenceContext, Projection, Projector,
        Query, Record, Repository, SearchModel, SearchSpec, Value,
    };
}
