use anyhow::{Context, Result};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use sha2::{Digest, Sha256};

/// Decodes a downloaded image, shrinks it to fit within `max_dimension`
/// pixels on both axes, and re-encodes it as a base64 JPEG data URI.
pub fn to_data_uri(bytes: &[u8], max_dimension: u32, quality: u8) -> Result<String> {
    let mut img = image::load_from_memory(bytes).context("Failed to decode image")?;

    if img.width() > max_dimension || img.height() > max_dimension {
        img = img.thumbnail(max_dimension, max_dimension);
    }

    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    rgb.write_with_encoder(encoder)
        .context("Failed to encode JPEG")?;

    let encoded = base64::engine::general_purpose::STANDARD.encode(&buffer);
    Ok(format!("data:image/jpeg;base64,{}", encoded))
}

/// Hash of a key that is stable across processes and platforms.
pub fn stable_hash(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn decode_data_uri(uri: &str) -> DynamicImage {
        let payload = uri.strip_prefix("data:image/jpeg;base64,").unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .unwrap();
        image::load_from_memory(&bytes).unwrap()
    }

    #[test]
    fn test_large_image_is_shrunk_preserving_aspect() -> Result<()> {
        let uri = to_data_uri(&png_bytes(1600, 800), 800, 85)?;
        let img = decode_data_uri(&uri);
        assert_eq!(img.width(), 800);
        assert_eq!(img.height(), 400);
        Ok(())
    }

    #[test]
    fn test_small_image_keeps_its_size() -> Result<()> {
        let uri = to_data_uri(&png_bytes(64, 32), 800, 85)?;
        let img = decode_data_uri(&uri);
        assert_eq!((img.width(), img.height()), (64, 32));
        Ok(())
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(to_data_uri(b"definitely not an image", 800, 85).is_err());
    }

    #[test]
    fn test_stable_hash_is_deterministic() {
        assert_eq!(stable_hash("holmes"), stable_hash("holmes"));
        assert_ne!(stable_hash("holmes"), stable_hash("watson"));
    }
}
