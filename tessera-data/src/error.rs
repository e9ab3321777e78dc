use std::fmt;

use crate::sql::QueryError;

/// One constraint violation reported by the store while saving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub table: String,
    pub field: Option<String>,
    pub message: String,
}

impl ValidationFailure {
    pub fn new(table: &str, field: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            table: table.to_string(),
            field: field.map(str::to_string),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}.{}: {}", self.table, field, self.message),
            None => write!(f, "{}: {}", self.table, self.message),
        }
    }
}

/// Errors that can occur in the data layer.
#[derive(Debug)]
pub enum DataError {
    /// No mapping is registered for the requested type pair.
    MappingNotFound {
        source: &'static str,
        target: &'static str,
    },
    /// The fallback object copier could not produce a target element.
    ElementCopyFailed {
        source: &'static str,
        target: &'static str,
        cause: Box<DataError>,
    },
    /// Skip, take or ordering of a search was rejected at construction.
    InvalidSearchSpecification(String),
    /// A transaction action failed; the transaction was rolled back.
    TransactionFailed(Box<DataError>),
    /// The store rejected pending changes at save time.
    PersistValidationFailed(Vec<ValidationFailure>),
    NotFound(String),
    /// A record lacks a field the target type requires.
    MissingField { field: String },
    /// A record field holds a value of the wrong kind.
    Decode {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
    /// A plan could not be rendered as SQL.
    Query(QueryError),
    /// A contextual resource could not be resolved or has the wrong type.
    Resource { tag: String, message: String },
    /// A mapping was registered after the registry was frozen.
    RegistryFrozen,
    /// A projector was built from a registry that is still open for registration.
    RegistryNotFrozen,
    /// A second mapping was registered for a pair under `DuplicatePolicy::Reject`.
    DuplicateMapping {
        source: &'static str,
        target: &'static str,
    },
    /// `begin_transaction` was called while a transaction is active.
    NestedTransaction,
    /// The backend does not support this operation.
    Unsupported(String),
    Database(Box<dyn std::error::Error + Send + Sync>),
}

impl DataError {
    /// Construct a `Database` variant from any driver error.
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DataError::Database(Box::new(err))
    }

    pub(crate) fn resource(tag: &str, message: impl Into<String>) -> Self {
        DataError::Resource {
            tag: tag.to_string(),
            message: message.into(),
        }
    }

    /// The failures carried by a `PersistValidationFailed` error.
    pub fn validation_failures(&self) -> Option<&[ValidationFailure]> {
        match self {
            DataError::PersistValidationFailed(failures) => Some(failures),
            _ => None,
        }
    }
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::MappingNotFound { source, target } => {
                write!(f, "No mapping registered from `{source}` to `{target}`")
            }
            DataError::ElementCopyFailed {
                source,
                target,
                cause,
            } => write!(f, "Could not copy `{source}` into `{target}`: {cause}"),
            DataError::InvalidSearchSpecification(msg) => {
                write!(f, "Invalid search specification: {msg}")
            }
            DataError::TransactionFailed(err) => write!(f, "Transaction failed: {err}"),
            DataError::PersistValidationFailed(failures) => {
                write!(f, "Validation failed on save")?;
                for (i, failure) in failures.iter().enumerate() {
                    let sep = if i == 0 { ": " } else { "; " };
                    write!(f, "{sep}{failure}")?;
                }
                Ok(())
            }
            DataError::NotFound(msg) => write!(f, "Not found: {msg}"),
            DataError::MissingField { field } => write!(f, "Missing field `{field}`"),
            DataError::Decode {
                field,
                expected,
                found,
            } => write!(f, "Field `{field}`: expected {expected}, found {found}"),
            DataError::Query(err) => write!(f, "Query error: {err}"),
            DataError::Resource { tag, message } => {
                write!(f, "Contextual resource `{tag}`: {message}")
            }
            DataError::RegistryFrozen => write!(f, "Mapping registry is frozen"),
            DataError::RegistryNotFrozen => {
                write!(f, "Mapping registry must be frozen before projecting")
            }
            DataError::DuplicateMapping { source, target } => {
                write!(f, "A mapping from `{source}` to `{target}` is already registered")
            }
            DataError::NestedTransaction => write!(f, "A transaction is already active"),
            DataError::Unsupported(msg) => write!(f, "Unsupported: {msg}"),
            DataError::Database(err) => write!(f, "Database error: {err}"),
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::TransactionFailed(err) => Some(err.as_ref()),
            DataError::ElementCopyFailed { cause, .. } => Some(cause.as_ref()),
            DataError::Query(err) => Some(err),
            DataError::Database(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<QueryError> for DataError {
    fn from(err: QueryError) -> Self {
        DataError::Query(err)
    }
}
