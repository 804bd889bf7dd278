//! Error mapping from `sqlx` into `portcullis_storage::StoreError`.

use portcullis_storage::StoreError;

/// Wraps a raw `sqlx` error into the `Store` trait's error vocabulary.
/// `RowNotFound` maps to `StoreError::NotFound`; everything else is an
/// infrastructure failure the caller may treat as retryable at its
/// discretion — the store itself never retries.
pub fn map_sqlx_error(err: sqlx_core::Error) -> StoreError {
    match err {
        sqlx_core::Error::RowNotFound => StoreError::NotFound,
        sqlx_core::Error::PoolTimedOut => StoreError::DeadlineExceeded,
        other => StoreError::connection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            map_sqlx_error(sqlx_core::Error::RowNotFound),
            StoreError::NotFound
        ));
    }
}
