use conductor_core::CoreError;

/// SQLSTATE for a relation that already exists
const DUPLICATE_TABLE: &str = "42P07";
/// SQLSTATE raised by the catalog when two sessions create the same index
const UNIQUE_VIOLATION: &str = "23505";

/// Convert a sqlx error, keeping decode problems apart from store outages
pub(crate) fn map_sqlx_err(context: &str, err: sqlx::Error) -> CoreError {
    match err {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            CoreError::SerializationError(format!("{}: {}", context, err))
        }
        other => CoreError::StateStoreError(format!("{}: {}", context, other)),
    }
}

/// Another session created the same object first
pub(crate) fn is_already_exists(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map_or(false, |code| code == DUPLICATE_TABLE || code == UNIQUE_VIOLATION)
}
