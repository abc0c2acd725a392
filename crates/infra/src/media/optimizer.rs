//! JPEG re-encoding of oversized images.

use std::io::Cursor;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use relaypost_core::{AssetOptimizer, MediaAsset, SyncError};
use relaypost_domain::ImageSettings;
use tokio::task;
use tracing::{debug, info};

/// Re-encodes images above a byte limit as JPEG.
///
/// Assets at or under the limit pass through untouched. Larger ones are
/// decoded and written once at the configured quality; if the result is
/// still over the limit the upload is refused.
#[derive(Debug, Clone, Copy)]
pub struct ImageOptimizer {
    max_bytes: u64,
    quality: u8,
}

impl ImageOptimizer {
    pub fn new(max_bytes: u64, quality: u8) -> Self {
        Self { max_bytes, quality: quality.clamp(1, 100) }
    }

    pub fn from_settings(settings: &ImageSettings) -> Self {
        Self::new(settings.max_image_bytes(), settings.image_quality)
    }

    fn too_large(&self, file_name: &str, size: u64) -> SyncError {
        SyncError::Validation {
            status: None,
            message: format!(
                "{file_name} is {size} bytes, above the {} byte upload limit",
                self.max_bytes
            ),
        }
    }

    fn reencode(self, asset: MediaAsset) -> Result<MediaAsset, SyncError> {
        let original = asset.size();
        let decoded = image::load_from_memory(&asset.bytes).map_err(|e| SyncError::Validation {
            status: None,
            message: format!("{} cannot be decoded for re-encoding: {e}", asset.file_name),
        })?;

        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(Cursor::new(&mut bytes), self.quality)
            .encode_image(&decoded.to_rgb8())
            .map_err(|e| SyncError::Internal(format!("jpeg encoding failed: {e}")))?;

        let file_name = jpeg_name(&asset.file_name);
        let size = bytes.len() as u64;
        if size > self.max_bytes {
            return Err(self.too_large(&file_name, size));
        }

        info!(
            file_name = %file_name,
            original_bytes = original,
            optimized_bytes = size,
            quality = self.quality,
            "image re-encoded"
        );
        Ok(MediaAsset { file_name, bytes })
    }
}

fn jpeg_name(file_name: &str) -> String {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    format!("{stem}.jpg")
}

#[async_trait]
impl AssetOptimizer for ImageOptimizer {
    async fn optimize(&self, asset: MediaAsset) -> Result<MediaAsset, SyncError> {
        if asset.size() <= self.max_bytes {
            debug!(file_name = %asset.file_name, bytes = asset.size(), "asset within upload limit");
            return Ok(asset);
        }

        let optimizer = *self;
        task::spawn_blocking(move || optimizer.reencode(asset))
            .await
            .map_err(|e| SyncError::Internal(format!("image task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use image::{ImageFormat, Rgb, RgbImage};

    use super::*;

    /// Uncompressed 200x200 gradient, about 120 KB as BMP.
    fn gradient_bmp() -> Vec<u8> {
        let img = RgbImage::from_fn(200, 200, |x, y| Rgb([x as u8, y as u8, 128]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Bmp).unwrap();
        bytes
    }

    fn asset(file_name: &str, bytes: Vec<u8>) -> MediaAsset {
        MediaAsset { file_name: file_name.into(), bytes }
    }

    #[tokio::test]
    async fn small_assets_pass_through() {
        let optimizer = ImageOptimizer::new(1024, 85);
        let input = asset("logo.png", vec![1, 2, 3]);

        let output = optimizer.optimize(input.clone()).await.unwrap();

        assert_eq!(output.file_name, "logo.png");
        assert_eq!(output.bytes, input.bytes);
    }

    #[tokio::test]
    async fn oversized_images_become_jpeg() {
        let bmp = gradient_bmp();
        let optimizer = ImageOptimizer::new(50_000, 80);

        let output = optimizer.optimize(asset("scan.bmp", bmp.clone())).await.unwrap();

        assert_eq!(output.file_name, "scan.jpg");
        assert!(output.size() <= 50_000);
        assert!(output.size() < bmp.len() as u64);
        assert_eq!(image::guess_format(&output.bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn still_oversized_output_is_a_validation_error() {
        let optimizer = ImageOptimizer::new(100, 100);
        let err = optimizer.optimize(asset("scan.bmp", gradient_bmp())).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation { status: None, .. }));
    }

    #[tokio::test]
    async fn undecodable_bytes_are_rejected() {
        let optimizer = ImageOptimizer::new(10, 85);
        let err = optimizer.optimize(asset("notes.pdf", vec![0u8; 64])).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));
    }

    #[test]
    fn settings_are_converted_to_bytes() {
        let optimizer = ImageOptimizer::from_settings(&ImageSettings::default());
        assert_eq!(optimizer.max_bytes, 5 * 1024 * 1024);
        assert_eq!(optimizer.quality, 85);
        assert_eq!(jpeg_name("photo.final.PNG"), "photo.final.jpg");
        assert_eq!(jpeg_name("noext"), "noext.jpg");
    }
}
