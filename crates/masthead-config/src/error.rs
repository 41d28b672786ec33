//! Error taxonomy for the save pipeline.
//!
//! Hard failures abort the pipeline as [`ConfigError`]; soft degradations are
//! collected as [`SaveWarning`] values and surfaced on the save report.

use masthead_access::AccessError;
use masthead_data::DataError;
use masthead_fsops::FsOpsError;
use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Hard failures raised by the save pipeline.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The candidate database settings could not open a connection.
    #[error("database connectivity check failed")]
    Connectivity {
        /// Underlying probe error.
        source: DataError,
    },
    /// The proposed rules would revoke the acting user's admin access.
    #[error("save would revoke super administrator access")]
    SuperAdminRevoked {
        /// Groups the acting user belongs to.
        groups: Vec<i64>,
    },
    /// A required asset record is missing.
    #[error("asset record not found")]
    AssetNotFound {
        /// Name of the missing asset.
        name: String,
    },
    /// A required extension record is missing.
    #[error("extension record not found")]
    ExtensionNotFound {
        /// Element of the missing extension.
        element: String,
    },
    /// Reading the configuration artifact failed.
    #[error("configuration artifact read failed")]
    Artifact {
        /// Underlying filesystem error.
        source: FsOpsError,
    },
    /// Writing the configuration artifact failed.
    #[error("configuration artifact write failed")]
    Write {
        /// Underlying filesystem error.
        source: FsOpsError,
    },
    /// A configuration or filter document did not match the expected shape.
    #[error("configuration document is malformed")]
    Document {
        /// Operation that rejected the document.
        operation: &'static str,
        /// Underlying decode error.
        source: serde_json::Error,
    },
    /// A submitted rule document did not match the expected shape.
    #[error("rule document is malformed")]
    Rules {
        /// Underlying access error.
        source: AccessError,
    },
    /// The data layer failed outside the connectivity check.
    #[error("data layer failure")]
    Data {
        /// Underlying data error.
        source: DataError,
    },
}

/// Soft degradations recorded during a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveWarning {
    /// The HTTPS probe failed; `force_ssl` was downgraded to off.
    SslUnavailable {
        /// Probe failure detail.
        detail: String,
    },
    /// The file cache directory is not writable; caching was forced off.
    CacheDirUnwritable,
}
