//! gliff SDK - Error Types

use thiserror::Error;

use crate::gallery::PendingIndexUpdate;
use crate::store::StoreError;

/// Result type for SDK operations
pub type GliffResult<T> = Result<T, GliffError>;

/// SDK error types
#[derive(Error, Debug)]
pub enum GliffError {
    // ═══════════════════════════════════════════════════════════════
    // SESSION ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("No project bound to this session")]
    NotBound,

    #[error("Configuration error: {0}")]
    Config(String),

    // ═══════════════════════════════════════════════════════════════
    // LOOKUP ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No gallery tile for image item: {id}")]
    TileNotFound { id: String },

    // ═══════════════════════════════════════════════════════════════
    // CONTENT ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Stored content could not be decoded: {0}")]
    Decode(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ═══════════════════════════════════════════════════════════════
    // WRITE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Gallery of project {project} changed concurrently, gave up after {attempts} attempts")]
    ConcurrentModification { project: String, attempts: u32 },

    /// The item write landed but the gallery update did not. Replaying
    /// `pending` through `Project::apply_pending` finishes the operation
    /// without creating a second item.
    #[error("Item {item_uid} was written but the gallery update failed: {source}")]
    PartialWrite {
        item_uid: String,
        pending: Box<PendingIndexUpdate>,
        #[source]
        source: Box<GliffError>,
    },

    /// Another writer linked a different annotation item for this user
    #[error("Image {image_uid} already links annotation item {existing} for {username}")]
    AnnotationLinked {
        image_uid: String,
        username: String,
        existing: String,
    },

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GliffError {
    /// Check if repeating the failed step may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            GliffError::ConcurrentModification { .. } => true,
            GliffError::PartialWrite { .. } => true,
            GliffError::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Uid of the item left without an index entry, if any
    pub fn orphaned_item(&self) -> Option<&str> {
        match self {
            GliffError::PartialWrite { item_uid, .. } => Some(item_uid),
            _ => None,
        }
    }
}

impl From<StoreError> for GliffError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unauthorized(msg) => GliffError::Authentication(msg),
            StoreError::NotFound(what) => GliffError::NotFound(what),
            other => GliffError::Store(other),
        }
    }
}

/// Only used on the encode path; decoding stored content maps to `Decode`
impl From<serde_json::Error> for GliffError {
    fn from(e: serde_json::Error) -> Self {
        GliffError::Serialization(e.to_string())
    }
}

impl From<image::ImageError> for GliffError {
    fn from(e: image::ImageError) -> Self {
        GliffError::InvalidImage(e.to_string())
    }
}

impl From<base64::DecodeError> for GliffError {
    fn from(e: base64::DecodeError) -> Self {
        GliffError::InvalidImage(format!("base64: {}", e))
    }
}
