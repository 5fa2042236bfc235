//! gliff SDK - In-Memory Store
//!
//! A versioned collection store kept entirely in memory. Several accounts
//! can log in to the same `MemoryStore` and see each other's commits, which
//! is what the gallery retry loop and the CLI demo need.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{Collection, Invitation, Item, StoreAccount, StoreClient, StoreError, StoreResult};

struct StoredItem {
    version: u64,
    metadata: Map<String, Value>,
    content: Vec<u8>,
}

struct StoredCollection {
    version: u64,
    content: Vec<u8>,
    members: BTreeSet<String>,
    items: HashMap<String, StoredItem>,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, String>,
    collections: HashMap<String, StoredCollection>,
    /// (recipient, invitation)
    invitations: Vec<(String, Invitation)>,
    failing_invitations: HashSet<String>,
    collection_commit_failures: VecDeque<StoreError>,
    item_commit_failures: VecDeque<StoreError>,
    /// (collection uid, content) written just before the next commit lands
    interleaved_writes: VecDeque<(String, Vec<u8>)>,
    collection_fetches: usize,
    collection_commits: usize,
}

impl MemoryState {
    fn collection_for(&mut self, uid: &str, username: &str) -> StoreResult<&mut StoredCollection> {
        match self.collections.get_mut(uid) {
            Some(col) if col.members.contains(username) => Ok(col),
            _ => Err(StoreError::NotFound(format!("collection {}", uid))),
        }
    }
}

/// In-memory store shared by every account logged in to it
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user that can log in
    pub fn add_user(&self, username: &str, password: &str) {
        self.state
            .lock()
            .users
            .insert(username.to_string(), password.to_string());
    }

    /// Create a collection owned by `owner` and return its uid
    pub fn create_collection(&self, owner: &str, content: &[u8]) -> String {
        let uid = Uuid::new_v4().simple().to_string();
        let mut members = BTreeSet::new();
        members.insert(owner.to_string());

        self.state.lock().collections.insert(
            uid.clone(),
            StoredCollection {
                version: 1,
                content: content.to_vec(),
                members,
                items: HashMap::new(),
            },
        );
        uid
    }

    /// Invite `to` into a collection and return the invitation uid
    pub fn invite(&self, collection_uid: &str, from: &str, to: &str) -> String {
        let invitation = Invitation {
            uid: Uuid::new_v4().simple().to_string(),
            collection_uid: collection_uid.to_string(),
            from_username: from.to_string(),
        };
        let uid = invitation.uid.clone();
        self.state.lock().invitations.push((to.to_string(), invitation));
        uid
    }

    /// Make accepting this invitation fail
    pub fn fail_invitation(&self, invitation_uid: &str) {
        self.state
            .lock()
            .failing_invitations
            .insert(invitation_uid.to_string());
    }

    /// Make the next `count` collection commits fail with `error`
    pub fn fail_collection_commits(&self, count: usize, error: StoreError) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.collection_commit_failures.push_back(error.clone());
        }
    }

    /// Make the next item batch commit fail with `error`
    pub fn fail_next_item_commit(&self, error: StoreError) {
        self.state.lock().item_commit_failures.push_back(error);
    }

    /// Have another writer replace a collection's content right before the
    /// next collection commit is checked, so that commit loses the race
    pub fn interleave_collection_write(&self, uid: &str, content: &[u8]) {
        self.state
            .lock()
            .interleaved_writes
            .push_back((uid.to_string(), content.to_vec()));
    }

    /// Replace a collection's content as another writer would
    pub fn overwrite_collection(&self, uid: &str, content: &[u8]) -> StoreResult<()> {
        let mut state = self.state.lock();
        let col = state
            .collections
            .get_mut(uid)
            .ok_or_else(|| StoreError::NotFound(format!("collection {}", uid)))?;
        col.content = content.to_vec();
        col.version += 1;
        Ok(())
    }

    /// Number of `fetch_collection` calls served so far
    pub fn collection_fetches(&self) -> usize {
        self.state.lock().collection_fetches
    }

    /// Number of successful collection commits
    pub fn collection_commits(&self) -> usize {
        self.state.lock().collection_commits
    }

    pub fn collection_content(&self, uid: &str) -> Option<Vec<u8>> {
        self.state.lock().collections.get(uid).map(|c| c.content.clone())
    }

    pub fn members(&self, uid: &str) -> Vec<String> {
        self.state
            .lock()
            .collections
            .get(uid)
            .map(|c| c.members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Committed item, bypassing membership checks
    pub fn item(&self, collection_uid: &str, item_uid: &str) -> Option<Item> {
        let state = self.state.lock();
        let stored = state.collections.get(collection_uid)?.items.get(item_uid)?;
        Some(Item {
            uid: item_uid.to_string(),
            version: stored.version,
            metadata: stored.metadata.clone(),
            content: stored.content.clone(),
        })
    }

    pub fn item_count(&self, collection_uid: &str) -> usize {
        self.state
            .lock()
            .collections
            .get(collection_uid)
            .map(|c| c.items.len())
            .unwrap_or(0)
    }
}

impl StoreClient for MemoryStore {
    type Account = MemoryAccount;

    fn login(
        &self,
        server_url: &str,
        _client_name: &str,
        username: &str,
        password: &str,
    ) -> StoreResult<MemoryAccount> {
        if server_url.is_empty() {
            return Err(StoreError::Network("no server url".into()));
        }

        let state = self.state.lock();
        match state.users.get(username) {
            Some(expected) if expected == password => Ok(MemoryAccount {
                username: username.to_string(),
                state: Arc::clone(&self.state),
                logged_in: true,
            }),
            _ => Err(StoreError::Unauthorized(format!(
                "invalid credentials for {}",
                username
            ))),
        }
    }
}

/// Account handle issued by [`MemoryStore`]
pub struct MemoryAccount {
    username: String,
    state: Arc<Mutex<MemoryState>>,
    logged_in: bool,
}

impl MemoryAccount {
    fn ensure_logged_in(&self) -> StoreResult<()> {
        if self.logged_in {
            Ok(())
        } else {
            Err(StoreError::Unauthorized("logged out".into()))
        }
    }
}

impl StoreAccount for MemoryAccount {
    fn username(&self) -> &str {
        &self.username
    }

    fn logout(&mut self) -> StoreResult<()> {
        self.ensure_logged_in()?;
        self.logged_in = false;
        Ok(())
    }

    fn list_incoming_invitations(&self) -> StoreResult<Vec<Invitation>> {
        self.ensure_logged_in()?;
        let state = self.state.lock();
        Ok(state
            .invitations
            .iter()
            .filter(|(to, _)| *to == self.username)
            .map(|(_, inv)| inv.clone())
            .collect())
    }

    fn accept_invitation(&self, invitation: &Invitation) -> StoreResult<()> {
        self.ensure_logged_in()?;
        let mut state = self.state.lock();

        if state.failing_invitations.contains(&invitation.uid) {
            return Err(StoreError::Rejected(format!(
                "invitation {} could not be verified",
                invitation.uid
            )));
        }

        let col = state
            .collections
            .get_mut(&invitation.collection_uid)
            .ok_or_else(|| StoreError::NotFound(format!("collection {}", invitation.collection_uid)))?;
        col.members.insert(self.username.clone());

        state.invitations.retain(|(_, inv)| inv.uid != invitation.uid);
        Ok(())
    }

    fn fetch_collection(&self, uid: &str) -> StoreResult<Collection> {
        self.ensure_logged_in()?;
        let mut state = self.state.lock();
        state.collection_fetches += 1;

        let col = state.collection_for(uid, &self.username)?;
        Ok(Collection {
            uid: uid.to_string(),
            version: col.version,
            content: col.content.clone(),
        })
    }

    fn commit_collection(&self, collection: &mut Collection) -> StoreResult<()> {
        self.ensure_logged_in()?;
        let mut state = self.state.lock();

        if let Some(err) = state.collection_commit_failures.pop_front() {
            return Err(err);
        }
        if let Some((uid, content)) = state.interleaved_writes.pop_front() {
            if let Some(col) = state.collections.get_mut(&uid) {
                col.content = content;
                col.version += 1;
            }
        }

        let col = state.collection_for(&collection.uid, &self.username)?;
        if col.version != collection.version {
            return Err(StoreError::Conflict(format!(
                "collection {} is at version {}, commit was based on {}",
                collection.uid, col.version, collection.version
            )));
        }

        col.version += 1;
        col.content = collection.content.clone();
        collection.version = col.version;

        state.collection_commits += 1;
        Ok(())
    }

    fn leave_collection(&self, collection: &Collection) -> StoreResult<()> {
        self.ensure_logged_in()?;
        let mut state = self.state.lock();
        let col = state.collection_for(&collection.uid, &self.username)?;
        col.members.remove(&self.username);
        Ok(())
    }

    fn create_item(
        &self,
        collection: &Collection,
        metadata: Map<String, Value>,
        content: Vec<u8>,
    ) -> StoreResult<Item> {
        self.ensure_logged_in()?;
        self.state.lock().collection_for(&collection.uid, &self.username)?;

        Ok(Item {
            uid: Uuid::new_v4().simple().to_string(),
            version: 0,
            metadata,
            content,
        })
    }

    fn fetch_item(&self, collection: &Collection, uid: &str) -> StoreResult<Item> {
        self.ensure_logged_in()?;
        let mut state = self.state.lock();
        let col = state.collection_for(&collection.uid, &self.username)?;

        let stored = col
            .items
            .get(uid)
            .ok_or_else(|| StoreError::NotFound(format!("item {}", uid)))?;
        Ok(Item {
            uid: uid.to_string(),
            version: stored.version,
            metadata: stored.metadata.clone(),
            content: stored.content.clone(),
        })
    }

    fn commit_items(&self, collection: &Collection, items: &mut [Item]) -> StoreResult<()> {
        self.ensure_logged_in()?;
        let mut state = self.state.lock();

        if let Some(err) = state.item_commit_failures.pop_front() {
            return Err(err);
        }

        let col = state.collection_for(&collection.uid, &self.username)?;

        // The batch is all-or-nothing
        for item in items.iter() {
            let current = col.items.get(&item.uid).map(|s| s.version).unwrap_or(0);
            if current != item.version {
                return Err(StoreError::Conflict(format!(
                    "item {} is at version {}, commit was based on {}",
                    item.uid, current, item.version
                )));
            }
        }

        for item in items.iter_mut() {
            item.version += 1;
            col.items.insert(
                item.uid.clone(),
                StoredItem {
                    version: item.version,
                    metadata: item.metadata.clone(),
                    content: item.content.clone(),
                },
            );
        }

        Ok(())
    }
}
