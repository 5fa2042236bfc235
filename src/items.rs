//! gliff SDK - Item Operations
//!
//! Every write here is two remote steps: one item commit, then one gallery
//! update. They are not atomic. If the item lands and the gallery update
//! does not, the error is `GliffError::PartialWrite`, which carries the
//! gallery change so it can be replayed on its own.

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::annotation::{compact_and_append, decode_annotations, encode_annotations, Annotation};
use crate::error::{GliffError, GliffResult};
use crate::gallery::{PendingIndexUpdate, Tile, TilePatch};
use crate::session::Project;
use crate::store::{Item, StoreAccount};
use crate::thumbs::{Image, ImageContent, ThumbnailEngine};

/// Item type tag of image items
pub const IMAGE_ITEM_TYPE: &str = "gliff.image";

/// Item type tag of annotation items
pub const ANNOTATION_ITEM_TYPE: &str = "gliff.annotation";

/// Milliseconds since the Unix epoch
fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Metadata stored alongside an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    pub created_time: i64,
    pub modified_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_complete: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ItemMetadata {
    fn new(item_type: &str) -> Self {
        let now = now_ms();
        Self {
            item_type: item_type.to_string(),
            name: None,
            image_name: None,
            created_time: now,
            modified_time: now,
            width: None,
            height: None,
            is_complete: None,
            extra: Map::new(),
        }
    }

    pub fn image(name: &str, width: u32, height: u32) -> Self {
        Self {
            name: Some(name.to_string()),
            image_name: Some(name.to_string()),
            width: Some(width),
            height: Some(height),
            ..Self::new(IMAGE_ITEM_TYPE)
        }
    }

    pub fn annotation() -> Self {
        Self {
            is_complete: Some(false),
            ..Self::new(ANNOTATION_ITEM_TYPE)
        }
    }

    pub fn from_map(map: &Map<String, Value>) -> GliffResult<Self> {
        serde_json::from_value(Value::Object(map.clone()))
            .map_err(|e| GliffError::Decode(format!("item metadata: {}", e)))
    }

    pub fn to_map(&self) -> GliffResult<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(GliffError::Serialization("item metadata is not an object".into())),
        }
    }

    /// Bump `modifiedTime`
    pub fn touch(&mut self) {
        self.modified_time = now_ms().max(self.created_time);
    }
}

/// Tile metadata and labels of one image
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataAndLabels {
    pub metadata: Map<String, Value>,
    pub image_labels: Vec<String>,
}

impl<'s, A: StoreAccount> Project<'s, A> {
    // ═══════════════════════════════════════════════════════════════════════
    // IMAGES
    // ═══════════════════════════════════════════════════════════════════════

    /// Upload an image as a new item and add its tile to the gallery.
    /// Returns the new image item uid.
    pub fn upload_image(
        &mut self,
        name: &str,
        image: Image,
        labels: Vec<String>,
        metadata: Map<String, Value>,
    ) -> GliffResult<String> {
        info!("creating and uploading a new image item...");

        let normalized = ThumbnailEngine::new(self.config.thumbnail_size).normalize(image)?;
        let item_metadata = ItemMetadata::image(name, normalized.width, normalized.height);
        let content = ImageContent::single(normalized.encoded).encode()?;

        let uid = self.write_new_item(&item_metadata, content)?;
        info!("uploaded new image item, uid: {}", uid);

        let mut tile_metadata = Map::new();
        tile_metadata.insert("imageName".into(), json!(name));
        tile_metadata.insert("width".into(), json!(normalized.width));
        tile_metadata.insert("height".into(), json!(normalized.height));
        tile_metadata.extend(metadata);

        let tile = Tile::new(uid.clone(), normalized.thumbnail, labels, tile_metadata);
        self.index_step(&uid, PendingIndexUpdate::Append(tile))?;

        Ok(uid)
    }

    /// Decoded content of an image item
    pub fn get_image(&self, item_uid: &str) -> GliffResult<ImageContent> {
        info!("fetching image {}...", item_uid);
        let item = self.account.fetch_item(&self.context.collection, item_uid)?;
        info!("fetched image {}", item_uid);

        ImageContent::decode(&item.content)
    }

    /// Replace labels and/or merge metadata of an image.
    /// Does nothing when neither is given.
    pub fn update_metadata_and_labels(
        &mut self,
        item_uid: &str,
        labels: Option<Vec<String>>,
        metadata: Option<Map<String, Value>>,
    ) -> GliffResult<()> {
        let has_labels = labels.as_ref().map_or(false, |l| !l.is_empty());
        let has_metadata = metadata.as_ref().map_or(false, |m| !m.is_empty());
        if !has_labels && !has_metadata {
            debug!("no labels or metadata for {}, nothing to update", item_uid);
            return Ok(());
        }

        self.tile(item_uid)?;

        let mut item = self.account.fetch_item(&self.context.collection, item_uid)?;
        self.touch_and_commit(&mut item, |_| {})?;

        let mut patch = TilePatch::default();
        if let Some(labels) = labels {
            patch = patch.labels(labels);
        }
        if let Some(metadata) = metadata {
            patch = patch.metadata(metadata);
        }

        self.index_step(
            item_uid,
            PendingIndexUpdate::Merge {
                tile_id: item_uid.to_string(),
                patch,
            },
        )
    }

    /// Tile metadata and labels of an image
    pub fn get_metadata_and_labels(&mut self, item_uid: &str) -> GliffResult<MetadataAndLabels> {
        let tile = self.fresh_tile(item_uid)?;
        Ok(MetadataAndLabels {
            metadata: tile.metadata,
            image_labels: tile.image_labels,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ANNOTATIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Store `annotations` for `username` on an image.
    ///
    /// The first upload creates the user's annotation item and links it to
    /// the tile; later uploads append to that same item. Returns the
    /// annotation item uid.
    ///
    /// If another session links an item for the same user between our read
    /// and our gallery commit, the annotations are appended to that item
    /// instead and the one created here is left unlinked.
    pub fn upload_annotation(
        &mut self,
        image_uid: &str,
        username: &str,
        annotations: Vec<Annotation>,
        metadata: Option<Map<String, Value>>,
    ) -> GliffResult<String> {
        let tile = self.fresh_tile(image_uid)?;

        if let Some(uid) = tile.annotation_uid.get(username) {
            return self.append_annotations(image_uid, uid, annotations, metadata);
        }

        info!("creating annotation item for {} on image {}...", username, image_uid);

        let content = encode_annotations(&annotations)?;
        let uid = self.write_new_item(&ItemMetadata::annotation(), content)?;
        info!("uploaded new annotation item, uid: {}", uid);

        let pending = PendingIndexUpdate::LinkAnnotation {
            image_uid: image_uid.to_string(),
            username: username.to_string(),
            item_uid: uid.clone(),
            metadata: metadata.clone(),
        };

        match self.apply_pending(pending.clone()) {
            Ok(()) => Ok(uid),
            Err(GliffError::AnnotationLinked { existing, .. }) => {
                warn!(
                    "{} got annotation item {} for image {} concurrently, leaving {} unlinked",
                    username, existing, image_uid, uid
                );
                self.append_annotations(image_uid, &existing, annotations, metadata)
            }
            Err(source) => Err(GliffError::PartialWrite {
                item_uid: uid,
                pending: Box::new(pending),
                source: Box::new(source),
            }),
        }
    }

    /// Append to an existing annotation item, compacting a trailing blank one
    fn append_annotations(
        &mut self,
        image_uid: &str,
        uid: &str,
        annotations: Vec<Annotation>,
        metadata: Option<Map<String, Value>>,
    ) -> GliffResult<String> {
        info!("appending to annotation item {}...", uid);

        let mut item = self.account.fetch_item(&self.context.collection, uid)?;
        let mut stored = decode_annotations(&item.content)?;
        compact_and_append(&mut stored, annotations);
        item.content = encode_annotations(&stored)?;
        self.touch_and_commit(&mut item, |_| {})?;
        info!("updated annotation item {}", uid);

        if let Some(metadata) = metadata.filter(|m| !m.is_empty()) {
            self.index_step(
                uid,
                PendingIndexUpdate::Merge {
                    tile_id: image_uid.to_string(),
                    patch: TilePatch::default().metadata(metadata),
                },
            )?;
        }
        Ok(uid.to_string())
    }

    /// Annotations of `username` on an image, `None` if there are none yet
    pub fn get_annotations(
        &mut self,
        image_uid: &str,
        username: &str,
    ) -> GliffResult<Option<Vec<Annotation>>> {
        let tile = self.fresh_tile(image_uid)?;

        let Some(uid) = tile.annotation_uid.get(username) else {
            debug!("no annotations by {} on image {}", username, image_uid);
            return Ok(None);
        };

        info!("fetching annotation item {}...", uid);
        let item = self.account.fetch_item(&self.context.collection, uid)?;
        decode_annotations(&item.content).map(Some)
    }

    /// Mark `username`'s annotation of an image as complete or not
    pub fn set_annotation_complete(
        &mut self,
        image_uid: &str,
        username: &str,
        complete: bool,
    ) -> GliffResult<()> {
        let tile = self.fresh_tile(image_uid)?;
        let uid = tile.annotation_uid.get(username).ok_or_else(|| {
            GliffError::NotFound(format!("annotation by {} on image {}", username, image_uid))
        })?;

        let mut item = self.account.fetch_item(&self.context.collection, uid)?;
        self.touch_and_commit(&mut item, |meta| meta.is_complete = Some(complete))?;

        self.index_step(
            uid,
            PendingIndexUpdate::Merge {
                tile_id: image_uid.to_string(),
                patch: TilePatch::default().annotation_complete(username, complete),
            },
        )
    }

    // ═══════════════════════════════════════════════════════════════════════
    // HELPERS
    // ═══════════════════════════════════════════════════════════════════════

    /// Create and commit a new item, returning its uid
    fn write_new_item(&self, metadata: &ItemMetadata, content: Vec<u8>) -> GliffResult<String> {
        let collection = &self.context.collection;
        let item = self
            .account
            .create_item(collection, metadata.to_map()?, content)?;

        let mut batch = [item];
        self.account.commit_items(collection, &mut batch)?;
        let [item] = batch;
        Ok(item.uid)
    }

    /// Update the item's metadata, bump `modifiedTime` and commit it
    fn touch_and_commit<F>(&self, item: &mut Item, edit: F) -> GliffResult<()>
    where
        F: FnOnce(&mut ItemMetadata),
    {
        let mut metadata = ItemMetadata::from_map(&item.metadata)?;
        edit(&mut metadata);
        metadata.touch();
        item.metadata = metadata.to_map()?;

        self.account
            .commit_items(&self.context.collection, std::slice::from_mut(item))?;
        Ok(())
    }

    /// Gallery half of an operation whose item write has already landed
    fn index_step(&mut self, item_uid: &str, pending: PendingIndexUpdate) -> GliffResult<()> {
        self.apply_pending(pending.clone())
            .map_err(|source| GliffError::PartialWrite {
                item_uid: item_uid.to_string(),
                pending: Box::new(pending),
                source: Box::new(source),
            })
    }
}
