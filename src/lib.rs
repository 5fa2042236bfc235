//! # gliff SDK
//!
//! Upload medical images to an end-to-end encrypted project store, keep the
//! project's gallery index in step with them, and read or write per-user
//! annotations.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       gliff SDK                          │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │  SESSION    │  │  ITEMS      │  │  ANNOTATIONS    │  │
//! │  │  login/bind │  │  images     │  │  per user       │  │
//! │  └──────┬──────┘  └──────┬──────┘  └────────┬────────┘  │
//! │         │                │                   │           │
//! │  ┌──────┴────────────────┴───────────────────┴────────┐ │
//! │  │                GALLERY (tile index)                 │ │
//! │  │        read-modify-write, retried on conflict       │ │
//! │  └──────────────────────────┬──────────────────────────┘ │
//! │                             │                            │
//! │  ┌──────────────────────────┴──────────────────────────┐ │
//! │  │        STORE (collections + items, versioned)       │ │
//! │  └─────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency Model
//!
//! - A project is one store collection; its content is the gallery
//! - Every image item has exactly one tile, keyed by the item uid
//! - Gallery commits are version-checked; lost races are re-applied on
//!   fresh content
//! - Item write + gallery update is not atomic; see `GliffError::PartialWrite`
//!
//! ## Example
//!
//! ```no_run
//! use gliff_sdk::{Image, MemoryStore, SdkConfig, Session};
//!
//! # fn main() -> gliff_sdk::GliffResult<()> {
//! let store = MemoryStore::new();
//! store.add_user("alice", "pw");
//! let project = store.create_collection("alice", b"[]");
//!
//! let mut session = Session::login(&store, SdkConfig::new("http://store", "alice", "pw"))?;
//! let mut project = session.project(&project)?;
//! let bitmap = image::DynamicImage::new_rgb8(64, 64);
//! let uid = project.upload_image("scan", Image::from(bitmap), vec![], Default::default())?;
//! println!("{:?}", project.get_metadata_and_labels(&uid)?);
//! # Ok(())
//! # }
//! ```

pub mod annotation;
pub mod config;
pub mod error;
pub mod gallery;
pub mod items;
pub mod session;
pub mod store;
pub mod thumbs;

pub use annotation::{Annotation, Toolbox};
pub use config::SdkConfig;
pub use error::{GliffError, GliffResult};
pub use gallery::{PendingIndexUpdate, Tile, TilePatch};
pub use items::{ItemMetadata, MetadataAndLabels};
pub use session::{InvitationReport, Project, ProjectContext, Session};
pub use store::{MemoryAccount, MemoryStore, StoreAccount, StoreClient, StoreError};
pub use thumbs::{Image, ImageContent, ThumbnailEngine};

/// gliff SDK version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
