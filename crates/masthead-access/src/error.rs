//! Error types for the access layer.

use masthead_data::DataError;
use thiserror::Error;

/// Result alias for access layer operations.
pub type Result<T> = std::result::Result<T, AccessError>;

/// Errors raised while editing or resolving access rules.
#[derive(Debug, Error)]
pub enum AccessError {
    /// A super administrator group attempted to edit its own admin grant.
    #[error("super administrator grant cannot be edited by its own holder")]
    SelfDemotion {
        /// Group that attempted the edit.
        group: i64,
    },
    /// A stored rule document did not match the expected shape.
    #[error("rule document is malformed")]
    RuleDocument {
        /// What was found instead of the expected shape.
        detail: String,
    },
    /// The data layer failed.
    #[error("data layer failure")]
    Data {
        /// Underlying data error.
        #[from]
        source: DataError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn messages_are_constant_and_sources_preserved() {
        let demotion = AccessError::SelfDemotion { group: 8 };
        assert_eq!(
            demotion.to_string(),
            "super administrator grant cannot be edited by its own holder"
        );
        assert!(demotion.source().is_none());

        let data = AccessError::from(DataError::QueryFailed {
            operation: "fetch",
            source: sqlx::Error::RowNotFound,
        });
        assert_eq!(data.to_string(), "data layer failure");
        assert!(data.source().is_some());
    }
}
