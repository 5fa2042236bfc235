//! gliff SDK - External Store Interface
//!
//! The encrypted collection store does all of the cryptography and sync.
//! This module only names the calls the SDK makes against it; content and
//! metadata cross this boundary already decrypted.

pub mod memory;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use memory::{MemoryAccount, MemoryStore};

/// Result type for store calls
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the store client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0} does not exist")]
    NotFound(String),

    /// Commit was based on a stale version
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("rejected by server: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Check if this error may go away on its own
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Network(_) | StoreError::Conflict(_))
    }
}

/// One encrypted collection (a gliff project)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub uid: String,
    /// Version the content was read at; commits are checked against it
    pub version: u64,
    /// Decrypted collection content (the gallery document)
    pub content: Vec<u8>,
}

/// One encrypted item inside a collection
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub uid: String,
    /// 0 until the item has been committed for the first time
    pub version: u64,
    pub metadata: Map<String, Value>,
    pub content: Vec<u8>,
}

/// Pending invitation to join a shared collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub uid: String,
    pub collection_uid: String,
    pub from_username: String,
}

/// Entry point of a store client: turns credentials into an account
pub trait StoreClient {
    type Account: StoreAccount;

    fn login(
        &self,
        server_url: &str,
        client_name: &str,
        username: &str,
        password: &str,
    ) -> StoreResult<Self::Account>;
}

/// Authenticated handle to the store.
///
/// Item calls take the owning collection, standing in for the store's item
/// manager of that collection.
pub trait StoreAccount {
    fn username(&self) -> &str;

    fn logout(&mut self) -> StoreResult<()>;

    fn list_incoming_invitations(&self) -> StoreResult<Vec<Invitation>>;

    fn accept_invitation(&self, invitation: &Invitation) -> StoreResult<()>;

    fn fetch_collection(&self, uid: &str) -> StoreResult<Collection>;

    /// Persist `collection.content`. Fails with [`StoreError::Conflict`] if
    /// the collection changed since `collection.version` was read; on success
    /// `collection.version` is advanced.
    fn commit_collection(&self, collection: &mut Collection) -> StoreResult<()>;

    /// Remove this account from the collection's members
    fn leave_collection(&self, collection: &Collection) -> StoreResult<()>;

    /// Build a new item locally. Nothing is stored until `commit_items`.
    fn create_item(
        &self,
        collection: &Collection,
        metadata: Map<String, Value>,
        content: Vec<u8>,
    ) -> StoreResult<Item>;

    fn fetch_item(&self, collection: &Collection, uid: &str) -> StoreResult<Item>;

    /// Persist items in one batch, advancing each item's version.
    fn commit_items(&self, collection: &Collection, items: &mut [Item]) -> StoreResult<()>;
}
