//! Image normalisation: input → bytes → [`ReceiptImage`] → base64 `ImageData`.
//!
//! Receipts arrive as phone-camera JPEGs or PNG screenshots. Both are decoded
//! and re-encoded as PNG before upload: lossless output keeps thermal-printer
//! digits crisp, and re-encoding strips EXIF data the model has no use for.
//! Camera photos are often 4000 px tall, so anything larger than
//! `max_image_dimension` is downscaled first.

use crate::config::ScanConfig;
use crate::error::ReceiptError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// A decoded receipt photo.
#[derive(Debug, Clone)]
pub struct ReceiptImage {
    pub image: DynamicImage,
    /// Format of the uploaded bytes.
    pub format: ImageFormat,
    /// Size of the uploaded bytes.
    pub byte_len: usize,
}

impl ReceiptImage {
    /// Decode uploaded bytes. Only JPEG and PNG are accepted.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReceiptError> {
        let format = image::guess_format(bytes).map_err(|e| ReceiptError::UnsupportedImage {
            detail: e.to_string(),
        })?;
        if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
            return Err(ReceiptError::UnsupportedImage {
                detail: format!("{format:?}"),
            });
        }

        let image = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| ReceiptError::ImageDecode(e.to_string()))?;
        debug!(
            "Decoded {:?} receipt: {}x{} px, {} bytes",
            format,
            image.width(),
            image.height(),
            bytes.len()
        );

        Ok(Self {
            image,
            format,
            byte_len: bytes.len(),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Downscale so neither side exceeds `max_dim`, keeping the aspect ratio.
    pub fn fit_within(self, max_dim: u32) -> Self {
        if self.width() <= max_dim && self.height() <= max_dim {
            return self;
        }
        let (w, h) = (self.width(), self.height());
        let image = self.image.resize(max_dim, max_dim, FilterType::Lanczos3);
        debug!("Downscaled {}x{} → {}x{}", w, h, image.width(), image.height());
        Self { image, ..self }
    }

    /// Encode as base64 PNG for a multimodal request.
    ///
    /// `detail: "high"` keeps small print legible for GPT-4-class models;
    /// other providers ignore it.
    pub fn encode(&self) -> Result<ImageData, ReceiptError> {
        let mut buf = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| ReceiptError::Internal(format!("PNG encoding failed: {e}")))?;

        let b64 = STANDARD.encode(&buf);
        debug!("Encoded receipt → {} bytes base64", b64.len());

        Ok(ImageData::new(b64, "image/png").with_detail("high"))
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read raw bytes from a local path, `-` (stdin) or an HTTP(S) URL.
pub async fn read_input(input: &str, timeout_secs: u64) -> Result<Vec<u8>, ReceiptError> {
    if input == "-" {
        let mut buf = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut buf)
            .await
            .map_err(|e| ReceiptError::Internal(format!("Failed to read stdin: {e}")))?;
        return Ok(buf);
    }
    if is_url(input) {
        return download_url(input, timeout_secs).await;
    }

    let path = PathBuf::from(input);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ReceiptError::InputNotFound { path })
        }
        Err(e) => Err(ReceiptError::Internal(format!(
            "Failed to read '{}': {e}",
            path.display()
        ))),
    }
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, ReceiptError> {
    info!("Downloading receipt from: {}", url);

    let failed = |reason: String| ReceiptError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {timeout_secs}s"))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    Ok(bytes.to_vec())
}

/// Resolve `input`, decode it and apply the dimension cap.
///
/// Decoding a 12-megapixel JPEG takes long enough to stall the runtime, so
/// it runs on the blocking pool.
pub async fn load_receipt(input: &str, config: &ScanConfig) -> Result<ReceiptImage, ReceiptError> {
    let bytes = read_input(input, config.download_timeout_secs).await?;
    decode_receipt(bytes, config.max_image_dimension).await
}

/// Decode already-loaded bytes on the blocking pool.
pub async fn decode_receipt(bytes: Vec<u8>, max_dim: u32) -> Result<ReceiptImage, ReceiptError> {
    tokio::task::spawn_blocking(move || {
        ReceiptImage::from_bytes(&bytes).map(|img| img.fit_within(max_dim))
    })
    .await
    .map_err(|e| ReceiptError::Internal(format!("Image task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/ticket.jpg"));
        assert!(is_url("http://example.com/ticket.jpg"));
        assert!(!is_url("/tmp/ticket.jpg"));
        assert!(!is_url("-"));
        assert!(!is_url(""));
    }

    #[test]
    fn decodes_png() {
        let bytes = png_bytes(20, 40);
        let img = ReceiptImage::from_bytes(&bytes).unwrap();
        assert_eq!(img.format, ImageFormat::Png);
        assert_eq!((img.width(), img.height()), (20, 40));
        assert_eq!(img.byte_len, bytes.len());
    }

    #[test]
    fn rejects_gif() {
        let err = ReceiptImage::from_bytes(b"GIF89a\x01\x00\x01\x00").unwrap_err();
        assert!(matches!(err, ReceiptError::UnsupportedImage { .. }), "{err:?}");
    }

    #[test]
    fn rejects_unknown_bytes() {
        let err = ReceiptImage::from_bytes(b"not an image").unwrap_err();
        assert!(matches!(err, ReceiptError::UnsupportedImage { .. }), "{err:?}");
    }

    #[test]
    fn truncated_png_is_decode_error() {
        let mut bytes = png_bytes(8, 8);
        bytes.truncate(20);
        let err = ReceiptImage::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, ReceiptError::ImageDecode(_)), "{err:?}");
    }

    #[test]
    fn large_photo_is_downscaled() {
        let img = ReceiptImage::from_bytes(&png_bytes(3000, 1000))
            .unwrap()
            .fit_within(2000);
        assert_eq!(img.width(), 2000);
        assert!((666..=667).contains(&img.height()), "h = {}", img.height());
    }

    #[test]
    fn small_photo_untouched() {
        let img = ReceiptImage::from_bytes(&png_bytes(10, 10))
            .unwrap()
            .fit_within(2000);
        assert_eq!((img.width(), img.height()), (10, 10));
    }

    #[test]
    fn encode_small_image() {
        let img = ReceiptImage::from_bytes(&png_bytes(10, 10)).unwrap();
        let data = img.encode().expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(image::guess_format(&decoded).unwrap(), ImageFormat::Png);
    }

    #[tokio::test]
    async fn missing_file_is_input_not_found() {
        let err = read_input("/definitely/not/here.jpg", 5).await.unwrap_err();
        assert!(matches!(err, ReceiptError::InputNotFound { .. }));
    }

    #[tokio::test]
    async fn load_receipt_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ticket.png");
        std::fs::write(&path, png_bytes(4000, 100)).unwrap();
        let config = ScanConfig::default();
        let img = load_receipt(path.to_str().unwrap(), &config).await.unwrap();
        assert_eq!(img.width(), 2000);
    }
}
