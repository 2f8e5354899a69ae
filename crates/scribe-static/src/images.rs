//! Image compression for post assets.
//!
//! Large images are scaled down to fit the configured bounds and re-encoded in
//! their original format. Anything that cannot be decoded or re-encoded is served
//! as the original bytes.

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat, ImageOutputFormat};

/// Images above this many pixels get a lower JPEG quality.
const LARGE_IMAGE_PIXELS: u64 = 2_000_000;
const LARGE_IMAGE_QUALITY: u8 = 75;

const THUMBNAIL_SIZE: u32 = 400;
const PLACEHOLDER_SIZE: u32 = 32;

const COMPRESSIBLE: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Unsupported image format: {0}")]
    Unsupported(String),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Requested output size, from the `?size=` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageSize {
    #[default]
    Full,
    Thumbnail,
    Placeholder,
}

impl ImageSize {
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("thumbnail") => Self::Thumbnail,
            Some("placeholder") => Self::Placeholder,
            _ => Self::Full,
        }
    }

    fn bound(&self) -> Option<u32> {
        match self {
            Self::Full => None,
            Self::Thumbnail => Some(THUMBNAIL_SIZE),
            Self::Placeholder => Some(PLACEHOLDER_SIZE),
        }
    }
}

/// Whether `path` has an extension the compressor will try to decode.
pub fn is_compressible(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| COMPRESSIBLE.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// MIME type for an asset path.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "css" => "text/css; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone)]
pub struct ImageCompressor {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

impl Default for ImageCompressor {
    fn default() -> Self {
        Self {
            max_width: 1200,
            max_height: 1600,
            quality: 85,
        }
    }
}

impl ImageCompressor {
    /// Compress an encoded image of the given format.
    pub fn compress(
        &self,
        bytes: &[u8],
        format: ImageFormat,
        size: ImageSize,
    ) -> Result<Vec<u8>, ImageError> {
        let img = image::load_from_memory_with_format(bytes, format)?;
        let img = self.resize(&img, size);

        let (width, height) = img.dimensions();
        let quality = if u64::from(width) * u64::from(height) > LARGE_IMAGE_PIXELS {
            self.quality.min(LARGE_IMAGE_QUALITY)
        } else {
            self.quality
        };

        let mut out = Vec::new();
        match format {
            ImageFormat::Jpeg => {
                let rgb = img.to_rgb8();
                let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
                encoder.encode(rgb.as_raw(), width, height, image::ColorType::Rgb8)?;
            }
            ImageFormat::Png => {
                img.write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)?;
            }
            ImageFormat::Gif => {
                img.write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Gif)?;
            }
            other => return Err(ImageError::Unsupported(format!("{:?}", other))),
        }

        Ok(out)
    }

    /// Read and compress the image at `path`.
    pub fn compress_file(&self, path: &Path, size: ImageSize) -> Result<Vec<u8>, ImageError> {
        if !is_compressible(path) {
            return Err(ImageError::Unsupported(path.display().to_string()));
        }
        let format = ImageFormat::from_path(path)?;
        let bytes = std::fs::read(path)?;
        self.compress(&bytes, format, size)
    }

    /// Compressed bytes when possible, the file's original bytes otherwise.
    pub fn compress_or_original(&self, path: &Path, size: ImageSize) -> std::io::Result<Vec<u8>> {
        if !is_compressible(path) {
            return std::fs::read(path);
        }

        match self.compress_file(path, size) {
            Ok(bytes) => Ok(bytes),
            Err(ImageError::Io(e)) => Err(e),
            Err(e) => {
                tracing::warn!("Serving original {}: {}", path.display(), e);
                std::fs::read(path)
            }
        }
    }

    /// Scale down by the smaller of the two ratios; never scale up.
    fn resize(&self, img: &DynamicImage, size: ImageSize) -> DynamicImage {
        let (max_width, max_height) = match size.bound() {
            Some(bound) => (bound.min(self.max_width), bound.min(self.max_height)),
            None => (self.max_width, self.max_height),
        };

        let (width, height) = img.dimensions();
        let width_ratio = max_width as f32 / width as f32;
        let height_ratio = max_height as f32 / height as f32;
        let ratio = width_ratio.min(height_ratio);

        if ratio >= 1.0 {
            return img.clone();
        }

        let new_width = ((width as f32 * ratio) as u32).max(1);
        let new_height = ((height as f32 * ratio) as u32).max(1);

        img.resize_exact(new_width, new_height, FilterType::Lanczos3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::tempdir;

    fn encode(width: u32, height: u32, format: ImageOutputFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([200, 80, 20])));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), format).unwrap();
        out
    }

    #[test]
    fn scales_down_by_smaller_ratio() {
        let compressor = ImageCompressor::default();
        let png = encode(2400, 1000, ImageOutputFormat::Png);

        let out = compressor
            .compress(&png, ImageFormat::Png, ImageSize::Full)
            .unwrap();
        let decoded = image::load_from_memory(&out).unwrap();

        assert_eq!(decoded.dimensions(), (1200, 500));
    }

    #[test]
    fn tall_images_are_bounded_by_height() {
        let compressor = ImageCompressor::default();
        let jpeg = encode(800, 3200, ImageOutputFormat::Jpeg(90));

        let out = compressor
            .compress(&jpeg, ImageFormat::Jpeg, ImageSize::Full)
            .unwrap();
        let decoded = image::load_from_memory(&out).unwrap();

        assert_eq!(decoded.dimensions(), (400, 1600));
    }

    #[test]
    fn small_images_keep_their_size() {
        let compressor = ImageCompressor::default();
        let png = encode(300, 200, ImageOutputFormat::Png);

        let out = compressor
            .compress(&png, ImageFormat::Png, ImageSize::Full)
            .unwrap();

        assert_eq!(image::load_from_memory(&out).unwrap().dimensions(), (300, 200));
    }

    #[test]
    fn size_variants_shrink_further() {
        let compressor = ImageCompressor::default();
        let png = encode(1000, 500, ImageOutputFormat::Png);

        let thumb = compressor
            .compress(&png, ImageFormat::Png, ImageSize::Thumbnail)
            .unwrap();
        let placeholder = compressor
            .compress(&png, ImageFormat::Png, ImageSize::Placeholder)
            .unwrap();

        assert_eq!(image::load_from_memory(&thumb).unwrap().dimensions(), (400, 200));
        assert_eq!(
            image::load_from_memory(&placeholder).unwrap().dimensions(),
            (32, 16)
        );
        assert_eq!(ImageSize::from_query(Some("thumbnail")), ImageSize::Thumbnail);
        assert_eq!(ImageSize::from_query(Some("huge")), ImageSize::Full);
    }

    #[test]
    fn falls_back_to_original_bytes() {
        let temp = tempdir().unwrap();
        let broken = temp.path().join("broken.jpg");
        let text = temp.path().join("notes.txt");
        std::fs::write(&broken, b"not really a jpeg").unwrap();
        std::fs::write(&text, b"hello").unwrap();

        let compressor = ImageCompressor::default();

        assert_eq!(
            compressor.compress_or_original(&broken, ImageSize::Full).unwrap(),
            b"not really a jpeg"
        );
        assert_eq!(
            compressor.compress_or_original(&text, ImageSize::Full).unwrap(),
            b"hello"
        );
        assert!(compressor
            .compress_or_original(&temp.path().join("missing.png"), ImageSize::Full)
            .is_err());
    }

    #[test]
    fn detects_content_types() {
        assert_eq!(content_type(Path::new("a/B.JPG")), "image/jpeg");
        assert_eq!(content_type(Path::new("clip.mp4")), "video/mp4");
        assert_eq!(content_type(Path::new("file")), "application/octet-stream");
        assert!(is_compressible(Path::new("x.webp")));
        assert!(!is_compressible(Path::new("x.svg")));
    }
}
