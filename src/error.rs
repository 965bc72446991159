//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror`, while
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level error enum the CLI commands return
//! - Module-specific errors ([`CatalogError`], [`StorageError`],
//!   [`PlayerError`], ...) for detailed handling
//! - [`ResultExt::with_context`] wraps any of them with a description of
//!   what was being attempted

use crate::config::ConfigError;
use crate::library::CatalogError;
use crate::metadata::MetadataError;
use crate::player::PlayerError;
use crate::storage::StorageError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Persistence layer error
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Catalog could not be produced
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Metadata reading error
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// Audio playback error
    #[error("Playback error: {0}")]
    Playback(#[from] PlayerError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// Whether the root cause is a refused media permission.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Catalog(CatalogError::PermissionDenied) => true,
            Self::WithContext { source, .. } => source.is_permission_denied(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(ctx))
    }
}
