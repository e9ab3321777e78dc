use sqlx::error::ErrorKind;
use tessera_data::{DataError, ValidationFailure};

/// Extension trait for converting `sqlx::Error` into `DataError`.
///
/// Due to Rust's orphan rules, we can't implement `From<sqlx::Error> for DataError`
/// in this crate. Use `.into_data_error()` instead.
pub trait SqlxErrorExt {
    fn into_data_error(self) -> DataError;

    /// Like [`into_data_error`](Self::into_data_error), reporting constraint
    /// violations on `table` as `PersistValidationFailed`.
    fn into_save_error(self, table: &str) -> DataError;
}

impl SqlxErrorExt for sqlx::Error {
    fn into_data_error(self) -> DataError {
        match &self {
            sqlx::Error::RowNotFound => DataError::NotFound("Row not found".into()),
            _ => DataError::database(self),
        }
    }

    fn into_save_error(self, table: &str) -> DataError {
        let failure = match &self {
            sqlx::Error::Database(db) => match db.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::CheckViolation => Some(ValidationFailure::new(
                    table,
                    constrained_column(db.message()),
                    db.message(),
                )),
                _ => None,
            },
            _ => None,
        };
        match failure {
            Some(failure) => DataError::PersistValidationFailed(vec![failure]),
            None => self.into_data_error(),
        }
    }
}

/// Column named by an SQLite constraint message such as
/// `UNIQUE constraint failed: customers.email`.
fn constrained_column(message: &str) -> Option<&str> {
    let (_, target) = message.split_once("failed: ")?;
    let first = target.split(',').next()?.trim();
    first.split_once('.').map(|(_, column)| column)
}

/// Convenience alias for data-layer results using `DataError`.
pub type SqlxResult<T> = Result<T, DataError>;
