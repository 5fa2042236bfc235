//! gliff SDK - Image Handling & Thumbnails
//!
//! Normalises caller images into what an image item and its tile need:
//! dimensions, base64 PNG content and a small data-URI thumbnail.

use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::error::{GliffError, GliffResult};

/// Prefix of tile thumbnails
pub const THUMBNAIL_URI_PREFIX: &str = "data:image/png;base64,";

/// Image handed to `upload_image`
#[derive(Debug, Clone)]
pub enum Image {
    /// Decoded pixels
    Bitmap(DynamicImage),
    /// Base64 image, raw or as a data URI
    Encoded(String),
}

impl From<DynamicImage> for Image {
    fn from(img: DynamicImage) -> Self {
        Image::Bitmap(img)
    }
}

impl Image {
    /// Decode an image file (PNG, JPEG, ...)
    pub fn from_file_bytes(data: &[u8]) -> GliffResult<Self> {
        Ok(Image::Bitmap(image::load_from_memory(data)?))
    }
}

/// An image resolved for upload
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub width: u32,
    pub height: u32,
    /// Data-URI PNG thumbnail
    pub thumbnail: String,
    /// Image item content string
    pub encoded: String,
}

/// Thumbnail Engine
pub struct ThumbnailEngine {
    /// Longest allowed side
    size: u32,
}

impl ThumbnailEngine {
    /// Create new thumbnail engine
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    /// Generate a data-URI PNG thumbnail
    pub fn generate(&self, img: &DynamicImage) -> GliffResult<String> {
        let thumb = self.resize_to_thumbnail(img);
        Ok(format!("{}{}", THUMBNAIL_URI_PREFIX, encode_png_base64(&thumb)?))
    }

    /// Downscale to fit the thumbnail box, keeping the aspect ratio.
    /// Images that already fit are never enlarged.
    fn resize_to_thumbnail(&self, img: &DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();

        if width <= self.size && height <= self.size {
            return img.clone();
        }

        img.resize(self.size, self.size, FilterType::Lanczos3)
    }

    /// Resolve either image form into upload-ready parts
    pub fn normalize(&self, image: Image) -> GliffResult<NormalizedImage> {
        let (bitmap, encoded) = match image {
            Image::Bitmap(bitmap) => {
                let encoded = encode_png_base64(&bitmap)?;
                (bitmap, encoded)
            }
            Image::Encoded(encoded) => (decode_base64_image(&encoded)?, encoded),
        };

        let (width, height) = bitmap.dimensions();
        if width == 0 || height == 0 {
            return Err(GliffError::InvalidImage("image has no pixels".into()));
        }

        Ok(NormalizedImage {
            width,
            height,
            thumbnail: self.generate(&bitmap)?,
            encoded,
        })
    }
}

/// PNG-encode and base64 an image (no data-URI prefix)
pub fn encode_png_base64(img: &DynamicImage) -> GliffResult<String> {
    let mut output = Vec::new();
    img.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(general_purpose::STANDARD.encode(output))
}

/// Decode a base64 image, with or without a data-URI header, as RGB
pub fn decode_base64_image(encoded: &str) -> GliffResult<DynamicImage> {
    let payload = match encoded.strip_prefix("data:") {
        Some(uri) => uri
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| GliffError::InvalidImage("data URI without payload".into()))?,
        None => encoded,
    };

    let bytes = general_purpose::STANDARD.decode(payload.trim())?;
    let img = image::load_from_memory(&bytes)?;
    Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
}

/// Image item content: slices of channels, each a base64 image.
/// Single 2D images are stored as `[[image]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageContent(pub Vec<Vec<String>>);

impl ImageContent {
    pub fn single(encoded: String) -> Self {
        ImageContent(vec![vec![encoded]])
    }

    pub fn decode(content: &[u8]) -> GliffResult<Self> {
        serde_json::from_slice(content)
            .map_err(|e| GliffError::Decode(format!("image content: {}", e)))
    }

    pub fn encode(&self) -> GliffResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// First channel of the first slice
    pub fn first(&self) -> Option<&str> {
        self.0.first()?.first().map(String::as_str)
    }

    pub fn first_bitmap(&self) -> GliffResult<DynamicImage> {
        let encoded = self
            .first()
            .ok_or_else(|| GliffError::InvalidImage("image item has no slices".into()))?;
        decode_base64_image(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap(width: u32, height: u32) -> DynamicImage {
        DynamicImage::new_rgb8(width, height)
    }

    #[test]
    fn test_bitmap_normalization() {
        let engine = ThumbnailEngine::new(128);
        let normalized = engine.normalize(Image::Bitmap(bitmap(200, 100))).unwrap();

        assert_eq!((normalized.width, normalized.height), (200, 100));
        assert!(normalized.thumbnail.starts_with(THUMBNAIL_URI_PREFIX));
        assert!(!normalized.encoded.starts_with("data:"));

        let thumb = decode_base64_image(&normalized.thumbnail).unwrap();
        assert_eq!(thumb.dimensions(), (128, 64));

        let full = decode_base64_image(&normalized.encoded).unwrap();
        assert_eq!(full.dimensions(), (200, 100));
    }

    #[test]
    fn test_encoded_image_is_stored_as_given() {
        let engine = ThumbnailEngine::new(128);
        let encoded = encode_png_base64(&bitmap(50, 40)).unwrap();

        let normalized = engine.normalize(Image::Encoded(encoded.clone())).unwrap();
        assert_eq!(normalized.encoded, encoded);
        assert_eq!((normalized.width, normalized.height), (50, 40));

        // Small images are not enlarged
        let thumb = decode_base64_image(&normalized.thumbnail).unwrap();
        assert_eq!(thumb.dimensions(), (50, 40));
    }

    #[test]
    fn test_data_uri_input() {
        let engine = ThumbnailEngine::new(128);
        let uri = format!("{}{}", THUMBNAIL_URI_PREFIX, encode_png_base64(&bitmap(300, 600)).unwrap());

        let normalized = engine.normalize(Image::Encoded(uri)).unwrap();
        assert_eq!((normalized.width, normalized.height), (300, 600));
        assert_eq!(decode_base64_image(&normalized.thumbnail).unwrap().dimensions(), (64, 128));
    }

    #[test]
    fn test_invalid_images() {
        let engine = ThumbnailEngine::new(128);

        assert!(matches!(
            engine.normalize(Image::Encoded("%%% not base64 %%%".into())),
            Err(GliffError::InvalidImage(_))
        ));
        // Valid base64, but "hello" is not an image
        assert!(matches!(
            engine.normalize(Image::Encoded("aGVsbG8=".into())),
            Err(GliffError::InvalidImage(_))
        ));
        assert!(matches!(
            engine.normalize(Image::Encoded("data:image/png;base64".into())),
            Err(GliffError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_image_content_wire_format() {
        let content = ImageContent::single("abc".into());
        assert_eq!(content.encode().unwrap(), br#"[["abc"]]"#.to_vec());
        assert_eq!(ImageContent::decode(br#"[["abc"]]"#).unwrap(), content);
        assert_eq!(content.first(), Some("abc"));

        assert!(matches!(ImageContent::decode(b"[1]"), Err(GliffError::Decode(_))));
        assert!(ImageContent(vec![]).first_bitmap().is_err());
    }
}
