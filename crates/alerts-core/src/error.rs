use thiserror::Error;

/// Errors surfaced by the classification/mutation pipeline. The store-backed
/// layers (sqlx, the feed fetcher) wrap their own error types into
/// `Store`/`Upstream` at the crate boundary; this type never knows about SQL
/// or HTTP specifically.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed input: {0}")]
    InputMalformed(String),

    #[error("referential miss: {0}")]
    ReferentialMiss(String),

    #[error("store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_malformed_displays_message() {
        let err = CoreError::InputMalformed("bad oar segment".to_string());
        assert_eq!(err.to_string(), "malformed input: bad oar segment");
    }

    #[test]
    fn referential_miss_displays_message() {
        let err = CoreError::ReferentialMiss("stop S9 not on route R1".to_string());
        assert_eq!(err.to_string(), "referential miss: stop S9 not on route R1");
    }

    #[test]
    fn store_error_displays_message() {
        let err = CoreError::Store("connection reset".to_string());
        assert_eq!(err.to_string(), "store error: connection reset");
    }
}
