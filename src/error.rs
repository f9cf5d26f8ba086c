//! Error types shared by the projection, catalog and map modules.
//!
//! Every variant is a startup-time failure. Runtime hit-testing and popup
//! updates never produce errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SolarMapError {
    /// A catalog entry failed validation. Loading stops at the first one.
    #[error("invalid record #{index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    /// A CRS code was used before being registered
    #[error("unknown CRS: {0}")]
    UnknownCrs(String),

    /// A CRS code was registered twice with different definitions
    #[error("CRS {code} is already registered with a different definition")]
    CrsConflict { code: String },

    /// The projection engine rejected a definition string
    #[error("invalid projection definition for {code}: {reason}")]
    InvalidProjection { code: String, reason: String },

    /// The projection engine could not transform a point
    #[error("transform from {from} to {to} failed: {reason}")]
    TransformFailed {
        from: String,
        to: String,
        reason: String,
    },

    #[error("invalid tile URL template {0:?}: expected {{z}}, {{x}} and {{y}} placeholders")]
    InvalidTileTemplate(String),

    /// The catalog document is not a JSON array
    #[error("malformed catalog document: {0}")]
    CatalogFormat(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SolarMapError {
    pub fn invalid_record(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            index,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SolarMapError>;
