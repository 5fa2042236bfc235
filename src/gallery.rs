//! gliff SDK - Gallery Index
//!
//! The project's collection content is a JSON array of tiles, one per image
//! item. It is the only place that links images to their annotation and
//! audit items, so every change to it is a full read-modify-write of the
//! whole document, retried when another writer got there first.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{GliffError, GliffResult};
use crate::session::Project;
use crate::store::{StoreAccount, StoreError};

// ═══════════════════════════════════════════════════════════════════════════════
// TILE
// ═══════════════════════════════════════════════════════════════════════════════

/// Gallery entry for one image item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    /// Image item uid
    pub id: String,
    /// `data:image/png;base64,...` preview
    pub thumbnail: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image_labels: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Map<String, Value>,
    /// username -> annotation item uid
    #[serde(rename = "annotationUID", default, deserialize_with = "null_as_default")]
    pub annotation_uid: BTreeMap<String, String>,
    /// username -> annotation finished
    #[serde(default, deserialize_with = "null_as_default")]
    pub annotation_complete: BTreeMap<String, bool>,
    /// username -> audit item uid
    #[serde(rename = "auditUID", default, deserialize_with = "null_as_default")]
    pub audit_uid: BTreeMap<String, String>,
    /// Fields written by other clients, kept as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Tile {
    pub fn new(
        id: impl Into<String>,
        thumbnail: impl Into<String>,
        image_labels: Vec<String>,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            thumbnail: thumbnail.into(),
            image_labels,
            metadata,
            annotation_uid: BTreeMap::new(),
            annotation_complete: BTreeMap::new(),
            audit_uid: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

/// Partial tile update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(rename = "annotationUID", skip_serializing_if = "Option::is_none")]
    pub annotation_uid: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation_complete: Option<BTreeMap<String, bool>>,
    #[serde(rename = "auditUID", skip_serializing_if = "Option::is_none")]
    pub audit_uid: Option<BTreeMap<String, String>>,
}

impl TilePatch {
    pub fn labels(mut self, labels: Vec<String>) -> Self {
        self.image_labels = Some(labels);
        self
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Link `username`'s annotation item to the tile
    pub fn annotation(mut self, username: &str, item_uid: &str, complete: bool) -> Self {
        self.annotation_uid
            .get_or_insert_with(BTreeMap::new)
            .insert(username.to_string(), item_uid.to_string());
        self.annotation_complete(username, complete)
    }

    pub fn annotation_complete(mut self, username: &str, complete: bool) -> Self {
        self.annotation_complete
            .get_or_insert_with(BTreeMap::new)
            .insert(username.to_string(), complete);
        self
    }

    pub fn audit(mut self, username: &str, item_uid: &str) -> Self {
        self.audit_uid
            .get_or_insert_with(BTreeMap::new)
            .insert(username.to_string(), item_uid.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &TilePatch::default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MERGE POLICY
// ═══════════════════════════════════════════════════════════════════════════════

/// How a patch field is applied to a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Patch value replaces the tile value
    Replace,
    /// Patch keys are written into the tile mapping, other keys stay
    ShallowMerge,
}

/// Wire field name and policy for every patchable tile field.
/// `id` and `thumbnail` are not listed and can never be patched.
pub const TILE_MERGE_POLICIES: &[(&str, MergePolicy)] = &[
    ("imageLabels", MergePolicy::Replace),
    ("metadata", MergePolicy::ShallowMerge),
    ("annotationUID", MergePolicy::ShallowMerge),
    ("annotationComplete", MergePolicy::ShallowMerge),
    ("auditUID", MergePolicy::ShallowMerge),
];

/// Apply `patch` to `tile` following [`TILE_MERGE_POLICIES`]
pub fn merge_update(tile: &Tile, patch: &TilePatch) -> GliffResult<Tile> {
    let Value::Object(mut target) = serde_json::to_value(tile)? else {
        return Err(GliffError::Serialization("tile is not a JSON object".into()));
    };
    let Value::Object(changes) = serde_json::to_value(patch)? else {
        return Err(GliffError::Serialization("patch is not a JSON object".into()));
    };

    for (field, policy) in TILE_MERGE_POLICIES {
        let Some(change) = changes.get(*field) else {
            continue;
        };

        match policy {
            MergePolicy::Replace => {
                target.insert(field.to_string(), change.clone());
            }
            MergePolicy::ShallowMerge => {
                let current = target
                    .entry(field.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !current.is_object() {
                    *current = Value::Object(Map::new());
                }
                if let (Value::Object(current), Value::Object(update)) = (current, change) {
                    for (key, value) in update {
                        current.insert(key.clone(), value.clone());
                    }
                }
            }
        }
    }

    serde_json::from_value(Value::Object(target))
        .map_err(|e| GliffError::Decode(format!("merged tile {}: {}", tile.id, e)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// GALLERY DOCUMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Decode collection content into tiles.
///
/// A collection that was never written has no content and reads as an empty
/// gallery; anything else must be a JSON array of tiles.
pub fn decode_gallery(content: &[u8]) -> GliffResult<Vec<Tile>> {
    if content.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_slice(content).map_err(|e| GliffError::Decode(format!("gallery: {}", e)))
}

/// Encode tiles as compact JSON
pub fn encode_gallery(tiles: &[Tile]) -> GliffResult<Vec<u8>> {
    Ok(serde_json::to_vec(tiles)?)
}

/// Index of the tile for image item `id`
pub fn find_tile(tiles: &[Tile], id: &str) -> Option<usize> {
    tiles.iter().position(|tile| tile.id == id)
}

pub fn append_tile(tiles: &mut Vec<Tile>, tile: Tile) {
    tiles.push(tile);
}

/// Gallery change that still has to be applied after an item write
#[derive(Debug, Clone, PartialEq)]
pub enum PendingIndexUpdate {
    Append(Tile),
    Merge { tile_id: String, patch: TilePatch },
    /// First link of a user's annotation item to an image tile
    LinkAnnotation {
        image_uid: String,
        username: String,
        item_uid: String,
        metadata: Option<Map<String, Value>>,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROJECT GALLERY OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

impl<'s, A: StoreAccount> Project<'s, A> {
    /// Tiles of the cached collection
    pub fn tiles(&self) -> GliffResult<Vec<Tile>> {
        decode_gallery(&self.context.collection.content)
    }

    /// Tile for image item `id`, refreshing once if the cached gallery
    /// does not have it yet
    pub fn tile(&mut self, id: &str) -> GliffResult<Tile> {
        if let Some(tile) = self.cached_tile(id)? {
            return Ok(tile);
        }

        debug!("tile {} not in cached gallery, refreshing", id);
        self.refresh()?;
        self.cached_tile(id)?
            .ok_or_else(|| GliffError::TileNotFound { id: id.to_string() })
    }

    /// Tile for image item `id`, read from a freshly fetched gallery
    pub fn fresh_tile(&mut self, id: &str) -> GliffResult<Tile> {
        self.refresh()?;
        self.cached_tile(id)?
            .ok_or_else(|| GliffError::TileNotFound { id: id.to_string() })
    }

    fn cached_tile(&self, id: &str) -> GliffResult<Option<Tile>> {
        let mut tiles = self.tiles()?;
        Ok(find_tile(&tiles, id).map(|index| tiles.swap_remove(index)))
    }

    /// Read-modify-write the gallery.
    ///
    /// `apply` runs against the freshest tiles on every attempt; when the
    /// commit loses to another writer the collection is re-fetched and
    /// `apply` runs again, up to `max_commit_retries` times.
    pub fn update_gallery<F>(&mut self, mut apply: F) -> GliffResult<Vec<Tile>>
    where
        F: FnMut(&mut Vec<Tile>) -> GliffResult<()>,
    {
        let max_attempts = self.config.max_commit_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let mut collection = self.context.collection.clone();
            let mut tiles = decode_gallery(&collection.content)?;
            apply(&mut tiles)?;
            collection.content = encode_gallery(&tiles)?;

            match self.account.commit_collection(&mut collection) {
                Ok(()) => {
                    self.context.collection = collection;
                    info!("updated gallery of project {}", self.context.uid);
                    return Ok(tiles);
                }
                Err(StoreError::Conflict(reason)) => {
                    warn!(
                        "gallery commit for {} lost a race (attempt {}/{}): {}",
                        self.context.uid, attempt, max_attempts, reason
                    );
                    if attempt >= max_attempts {
                        return Err(GliffError::ConcurrentModification {
                            project: self.context.uid.clone(),
                            attempts: attempt,
                        });
                    }
                    self.refresh()?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Replace the whole gallery
    pub fn set_tiles(&mut self, tiles: Vec<Tile>) -> GliffResult<()> {
        self.update_gallery(|current| {
            current.clone_from(&tiles);
            Ok(())
        })?;
        Ok(())
    }

    /// Add a tile for a new image item. A tile that is already present is
    /// left alone, so replaying the append never duplicates it.
    pub fn append_tile(&mut self, tile: Tile) -> GliffResult<()> {
        self.update_gallery(|tiles| {
            if find_tile(tiles, &tile.id).is_some() {
                debug!("tile {} already in gallery", tile.id);
            } else {
                append_tile(tiles, tile.clone());
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Merge `patch` into the tile for image item `id`
    pub fn update_tile(&mut self, id: &str, patch: &TilePatch) -> GliffResult<Tile> {
        let mut updated = None;

        self.update_gallery(|tiles| {
            let index = find_tile(tiles, id)
                .ok_or_else(|| GliffError::TileNotFound { id: id.to_string() })?;
            let merged = merge_update(&tiles[index], patch)?;
            tiles[index] = merged.clone();
            updated = Some(merged);
            Ok(())
        })?;

        updated.ok_or_else(|| GliffError::TileNotFound { id: id.to_string() })
    }

    /// Link `username`'s annotation item `item_uid` to the tile of
    /// `image_uid`, merging `metadata` into the tile as well.
    ///
    /// A link to a different item is never overwritten: that fails with
    /// `GliffError::AnnotationLinked` naming the item already linked. If
    /// `item_uid` is linked already only the metadata is merged.
    pub fn link_annotation(
        &mut self,
        image_uid: &str,
        username: &str,
        item_uid: &str,
        metadata: Option<Map<String, Value>>,
    ) -> GliffResult<Tile> {
        let mut updated = None;

        self.update_gallery(|tiles| {
            let index = find_tile(tiles, image_uid)
                .ok_or_else(|| GliffError::TileNotFound { id: image_uid.to_string() })?;

            let mut patch = TilePatch::default();
            match tiles[index].annotation_uid.get(username) {
                Some(existing) if existing != item_uid => {
                    return Err(GliffError::AnnotationLinked {
                        image_uid: image_uid.to_string(),
                        username: username.to_string(),
                        existing: existing.clone(),
                    });
                }
                Some(_) => debug!("{} already linked to tile {}", item_uid, image_uid),
                None => patch = patch.annotation(username, item_uid, false),
            }
            if let Some(metadata) = &metadata {
                patch = patch.metadata(metadata.clone());
            }

            let merged = merge_update(&tiles[index], &patch)?;
            tiles[index] = merged.clone();
            updated = Some(merged);
            Ok(())
        })?;

        updated.ok_or_else(|| GliffError::TileNotFound { id: image_uid.to_string() })
    }

    /// Finish an operation that failed with `GliffError::PartialWrite`
    pub fn apply_pending(&mut self, pending: PendingIndexUpdate) -> GliffResult<()> {
        match pending {
            PendingIndexUpdate::Append(tile) => self.append_tile(tile),
            PendingIndexUpdate::Merge { tile_id, patch } => {
                self.update_tile(&tile_id, &patch)?;
                Ok(())
            }
            PendingIndexUpdate::LinkAnnotation {
                image_uid,
                username,
                item_uid,
                metadata,
            } => {
                self.link_annotation(&image_uid, &username, &item_uid, metadata)?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SdkConfig;
    use crate::session::Session;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn tile(id: &str) -> Tile {
        Tile::new(id, "data:image/png;base64,AAAA", Vec::new(), Map::new())
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn setup(retries: u32) -> (MemoryStore, String, Session<crate::store::MemoryAccount>) {
        let store = MemoryStore::new();
        store.add_user("alice", "pw");
        let project = store.create_collection("alice", b"[]");

        let mut config = SdkConfig::new("http://store.test", "alice", "pw");
        config.max_commit_retries = retries;
        let session = Session::login(&store, config).unwrap();
        (store, project, session)
    }

    #[test]
    fn test_metadata_merge_keeps_existing_keys() {
        let mut original = tile("img");
        original.metadata = object(json!({"a": 1}));

        let patch = TilePatch::default().metadata(object(json!({"b": 2})));
        let merged = merge_update(&original, &patch).unwrap();

        assert_eq!(Value::Object(merged.metadata), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_metadata_merge_overwrites_same_key() {
        let mut original = tile("img");
        original.metadata = object(json!({"a": 1, "keep": true}));

        let patch = TilePatch::default().metadata(object(json!({"a": 5})));
        let merged = merge_update(&original, &patch).unwrap();

        assert_eq!(Value::Object(merged.metadata), json!({"a": 5, "keep": true}));
    }

    #[test]
    fn test_annotation_merge_never_removes_users() {
        let mut original = tile("img");
        original.annotation_uid.insert("alice".into(), "A1".into());
        original.annotation_complete.insert("alice".into(), true);

        let patch = TilePatch::default().annotation("bob", "B1", false);
        let merged = merge_update(&original, &patch).unwrap();

        assert_eq!(merged.annotation_uid.get("alice").unwrap(), "A1");
        assert_eq!(merged.annotation_uid.get("bob").unwrap(), "B1");
        assert_eq!(merged.annotation_complete.get("alice"), Some(&true));
        assert_eq!(merged.annotation_complete.get("bob"), Some(&false));
    }

    #[test]
    fn test_labels_are_replaced_not_merged() {
        let mut original = tile("img");
        original.image_labels = vec!["a".into(), "b".into()];

        let merged = merge_update(&original, &TilePatch::default().labels(vec!["c".into()])).unwrap();
        assert_eq!(merged.image_labels, vec!["c".to_string()]);
    }

    #[test]
    fn test_empty_patch_is_noop() {
        let mut original = tile("img");
        original.metadata = object(json!({"a": 1}));
        original.audit_uid.insert("alice".into(), "X".into());

        assert_eq!(merge_update(&original, &TilePatch::default()).unwrap(), original);

        let empty_maps = TilePatch {
            metadata: Some(Map::new()),
            annotation_uid: Some(BTreeMap::new()),
            ..Default::default()
        };
        assert_eq!(merge_update(&original, &empty_maps).unwrap(), original);
    }

    #[test]
    fn test_every_patch_field_has_a_policy() {
        let patch = TilePatch::default()
            .labels(vec!["x".into()])
            .metadata(Map::new())
            .annotation("u", "a", true)
            .audit("u", "b");
        let wire = object(serde_json::to_value(&patch).unwrap());

        for key in wire.keys() {
            assert!(
                TILE_MERGE_POLICIES.iter().any(|(field, _)| *field == key.as_str()),
                "no merge policy for {}",
                key
            );
        }
        assert!(!TILE_MERGE_POLICIES.iter().any(|(f, _)| *f == "id" || *f == "thumbnail"));
    }

    #[test]
    fn test_legacy_tile_decodes() {
        let doc = br#"[{"id":"img1","thumbnail":"t","imageLabels":[],"metadata":{"imageName":"scan"},"imageUID":"img1","annotationUID":null,"auditUID":null}]"#;
        let tiles = decode_gallery(doc).unwrap();

        assert_eq!(tiles.len(), 1);
        assert!(tiles[0].annotation_uid.is_empty());
        assert!(tiles[0].annotation_complete.is_empty());
        assert_eq!(tiles[0].extra.get("imageUID"), Some(&json!("img1")));

        let merged = merge_update(&tiles[0], &TilePatch::default().annotation("alice", "A", false)).unwrap();
        assert_eq!(merged.extra.get("imageUID"), Some(&json!("img1")));
        assert_eq!(merged.annotation_uid.get("alice").unwrap(), "A");
    }

    #[test]
    fn test_gallery_round_trip() {
        let mut first = tile("img1");
        first.image_labels = vec!["tumour".into()];
        first.metadata = object(json!({"imageName": "scan1", "width": 200, "nested": {"k": [1, 2]}}));
        first.annotation_uid.insert("alice".into(), "ann1".into());
        first.annotation_complete.insert("alice".into(), false);
        let tiles = vec![first, tile("img2")];

        let encoded = encode_gallery(&tiles).unwrap();
        let decoded = decode_gallery(&encoded).unwrap();
        assert_eq!(decoded, tiles);
        assert_eq!(encode_gallery(&decoded).unwrap(), encoded);
        assert!(!encoded.contains(&b' '));
    }

    #[test]
    fn test_decode_errors_are_surfaced() {
        assert!(matches!(decode_gallery(b"not json"), Err(GliffError::Decode(_))));
        assert!(matches!(decode_gallery(b"{}"), Err(GliffError::Decode(_))));
        assert!(decode_gallery(b"").unwrap().is_empty());
    }

    #[test]
    fn test_find_tile() {
        let tiles = vec![tile("a"), tile("b"), tile("c")];
        assert_eq!(find_tile(&tiles, "b"), Some(1));
        assert_eq!(find_tile(&tiles, "z"), None);
    }

    #[test]
    fn test_append_is_not_duplicated() {
        let (store, project_uid, mut session) = setup(3);
        let mut project = session.project(&project_uid).unwrap();

        project.append_tile(tile("img1")).unwrap();
        project.apply_pending(PendingIndexUpdate::Append(tile("img1"))).unwrap();

        let stored = decode_gallery(&store.collection_content(&project_uid).unwrap()).unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[test]
    fn test_update_missing_tile_does_not_commit() {
        let (store, project_uid, mut session) = setup(3);
        let mut project = session.project(&project_uid).unwrap();
        let commits = store.collection_commits();

        let err = project.update_tile("nope", &TilePatch::default().labels(vec![])).unwrap_err();
        assert!(matches!(err, GliffError::TileNotFound { ref id } if id == "nope"));
        assert_eq!(store.collection_commits(), commits);
    }

    #[test]
    fn test_conflict_is_retried_against_fresh_gallery() {
        let (store, project_uid, mut session) = setup(3);
        let mut project = session.project(&project_uid).unwrap();

        // Another writer appends after we bound the project
        let other = encode_gallery(&[tile("theirs")]).unwrap();
        store.overwrite_collection(&project_uid, &other).unwrap();

        project.append_tile(tile("ours")).unwrap();

        let stored = decode_gallery(&store.collection_content(&project_uid).unwrap()).unwrap();
        let ids: Vec<_> = stored.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["theirs", "ours"]);
        assert_eq!(project.tiles().unwrap(), stored);
    }

    #[test]
    fn test_retries_are_bounded() {
        let (store, project_uid, mut session) = setup(2);
        let mut project = session.project(&project_uid).unwrap();

        store.fail_collection_commits(3, StoreError::Conflict("busy".into()));
        let err = project.append_tile(tile("img")).unwrap_err();

        assert!(matches!(
            err,
            GliffError::ConcurrentModification { attempts: 3, .. }
        ));
        assert!(project.tiles().unwrap().is_empty());
    }

    #[test]
    fn test_store_failure_leaves_cache_untouched() {
        let (store, project_uid, mut session) = setup(3);
        let mut project = session.project(&project_uid).unwrap();

        store.fail_collection_commits(1, StoreError::Network("down".into()));
        assert!(matches!(
            project.append_tile(tile("img")),
            Err(GliffError::Store(StoreError::Network(_)))
        ));
        assert!(project.tiles().unwrap().is_empty());

        project.append_tile(tile("img")).unwrap();
        assert_eq!(project.tiles().unwrap().len(), 1);
    }

    #[test]
    fn test_set_tiles_replaces_gallery() {
        let (store, project_uid, mut session) = setup(3);
        let mut project = session.project(&project_uid).unwrap();

        project.append_tile(tile("a")).unwrap();
        project.set_tiles(vec![tile("b"), tile("c")]).unwrap();

        let stored = decode_gallery(&store.collection_content(&project_uid).unwrap()).unwrap();
        assert_eq!(stored, vec![tile("b"), tile("c")]);
    }

    #[test]
    fn test_link_never_replaces_another_users_item() {
        let (store, project_uid, mut session) = setup(3);
        let mut project = session.project(&project_uid).unwrap();
        project.append_tile(tile("img")).unwrap();

        // Another session of the same user links its item after we read
        let mut theirs = tile("img");
        theirs.annotation_uid.insert("alice".into(), "A1".into());
        store
            .overwrite_collection(&project_uid, &encode_gallery(&[theirs]).unwrap())
            .unwrap();

        let err = project
            .link_annotation("img", "alice", "A2", Some(object(json!({"x": 1}))))
            .unwrap_err();
        assert!(matches!(err, GliffError::AnnotationLinked { ref existing, .. } if existing == "A1"));

        let stored = decode_gallery(&store.collection_content(&project_uid).unwrap()).unwrap();
        assert_eq!(stored[0].annotation_uid.get("alice").map(String::as_str), Some("A1"));
        assert!(stored[0].metadata.is_empty());
    }

    #[test]
    fn test_relinking_same_item_keeps_completion() {
        let (store, project_uid, mut session) = setup(3);
        let mut project = session.project(&project_uid).unwrap();
        project.append_tile(tile("img")).unwrap();

        project.link_annotation("img", "alice", "A1", None).unwrap();
        project
            .update_tile("img", &TilePatch::default().annotation_complete("alice", true))
            .unwrap();

        let pending = PendingIndexUpdate::LinkAnnotation {
            image_uid: "img".into(),
            username: "alice".into(),
            item_uid: "A1".into(),
            metadata: Some(object(json!({"b": 2}))),
        };
        project.apply_pending(pending).unwrap();

        let stored = decode_gallery(&store.collection_content(&project_uid).unwrap()).unwrap();
        assert_eq!(stored[0].annotation_complete.get("alice"), Some(&true));
        assert_eq!(stored[0].metadata["b"], json!(2));
    }

    #[test]
    fn test_fresh_tile_sees_remote_changes() {
        let (store, project_uid, mut session) = setup(3);
        let mut project = session.project(&project_uid).unwrap();
        project.append_tile(tile("img")).unwrap();

        let mut theirs = tile("img");
        theirs.image_labels = vec!["remote".into()];
        store
            .overwrite_collection(&project_uid, &encode_gallery(&[theirs]).unwrap())
            .unwrap();

        assert!(project.tile("img").unwrap().image_labels.is_empty());
        assert_eq!(project.fresh_tile("img").unwrap().image_labels, vec!["remote".to_string()]);
        assert!(matches!(
            project.fresh_tile("missing"),
            Err(GliffError::TileNotFound { .. })
        ));
    }

    #[test]
    fn test_unbounded_retry_setting_does_not_overflow() {
        let (store, project_uid, mut session) = setup(u32::MAX);
        let mut project = session.project(&project_uid).unwrap();

        store.fail_collection_commits(2, StoreError::Conflict("busy".into()));
        project.append_tile(tile("img")).unwrap();
        assert_eq!(project.tiles().unwrap().len(), 1);
    }
}
