//! Header-only dimension extraction.
//!
//! Reads width and height from container headers without decoding pixels,
//! so oversized inputs can be flagged before any memory is committed.

use crate::{ImageFormat, detect_from_signature};
use serde::{Deserialize, Serialize};

/// Bytes per decoded pixel (RGBA).
pub const BYTES_PER_PIXEL: u64 = 4;

/// Image metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Detected format
    pub format: ImageFormat,
    /// File size in bytes
    pub size_bytes: usize,
}

impl ImageMetadata {
    /// Memory needed for the decoded RGBA surface.
    pub fn decoded_bytes(&self) -> u64 {
        self.width as u64 * self.height as u64 * BYTES_PER_PIXEL
    }
}

/// Extract metadata from image data.
///
/// Returns `None` for formats whose headers are not parsed here (HEIC, AVIF,
/// TIFF) and for truncated headers.
pub fn extract_metadata(data: &[u8]) -> Option<ImageMetadata> {
    let format = detect_from_signature(data)?;

    let (width, height) = match format {
        ImageFormat::Jpeg => extract_jpeg_dimensions(data)?,
        ImageFormat::Png => extract_png_dimensions(data)?,
        ImageFormat::Gif => extract_gif_dimensions(data)?,
        ImageFormat::Bmp => extract_bmp_dimensions(data)?,
        ImageFormat::WebP => extract_webp_dimensions(data)?,
        _ => return None,
    };

    Some(ImageMetadata {
        width,
        height,
        format,
        size_bytes: data.len(),
    })
}

fn u16_le(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]) as u32)
}

fn u24_le(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 3)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
}

fn i32_le(data: &[u8], at: usize) -> Option<i32> {
    let bytes = data.get(at..at + 4)?;
    Some(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// SOF marker scan.
fn extract_jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    // Skip SOI marker
    let mut i = 2;

    while i + 4 < data.len() {
        if data[i] != 0xFF {
            i += 1;
            continue;
        }

        let marker = data[i + 1];

        if matches!(marker, 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF) {
            if i + 9 < data.len() {
                let height = u16::from_be_bytes([data[i + 5], data[i + 6]]) as u32;
                let width = u16::from_be_bytes([data[i + 7], data[i + 8]]) as u32;
                return Some((width, height));
            }
            return None;
        }

        if marker == 0xD8 || marker == 0xD9 || (0xD0..=0xD7).contains(&marker) || marker == 0xFF {
            i += if marker == 0xFF { 1 } else { 2 };
        } else {
            let length = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
            i += 2 + length;
        }
    }

    None
}

/// IHDR chunk right after the signature.
fn extract_png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 24 || &data[12..16] != b"IHDR" {
        return None;
    }

    let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
    Some((width, height))
}

/// Logical screen descriptor.
fn extract_gif_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    Some((u16_le(data, 6)?, u16_le(data, 8)?))
}

/// BITMAPINFOHEADER; height is negative for top-down bitmaps.
fn extract_bmp_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let width = i32_le(data, 18)?;
    let height = i32_le(data, 22)?;
    Some((width.unsigned_abs(), height.unsigned_abs()))
}

/// First chunk of a RIFF/WEBP container.
fn extract_webp_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    match data.get(12..16)? {
        b"VP8 " => {
            if data.get(23..26)? != [0x9D, 0x01, 0x2A] {
                return None;
            }
            Some((u16_le(data, 26)? & 0x3FFF, u16_le(data, 28)? & 0x3FFF))
        }
        b"VP8L" => {
            if *data.get(20)? != 0x2F {
                return None;
            }
            let bits = i32_le(data, 21)? as u32;
            Some(((bits & 0x3FFF) + 1, ((bits >> 14) & 0x3FFF) + 1))
        }
        b"VP8X" => Some((u24_le(data, 24)? + 1, u24_le(data, 27)? + 1)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn encoded(width: u32, height: u32, format: image::ImageOutputFormat) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .to_rgb8()
            .write_to(&mut out, format)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_png_jpeg_gif_bmp() {
        for (format, expected) in [
            (image::ImageOutputFormat::Png, ImageFormat::Png),
            (image::ImageOutputFormat::Jpeg(80), ImageFormat::Jpeg),
            (image::ImageOutputFormat::Gif, ImageFormat::Gif),
            (image::ImageOutputFormat::Bmp, ImageFormat::Bmp),
        ] {
            let meta = extract_metadata(&encoded(37, 21, format)).unwrap();
            assert_eq!(meta.format, expected);
            assert_eq!((meta.width, meta.height), (37, 21));
        }
    }

    #[test]
    fn test_webp_vp8x() {
        let mut data = b"RIFF\x00\x00\x00\x00WEBPVP8X".to_vec();
        data.extend_from_slice(&[0x0A, 0, 0, 0]); // chunk size
        data.extend_from_slice(&[0x10, 0, 0, 0]); // flags
        data.extend_from_slice(&[0x7F, 0x07, 0x00]); // width - 1 = 1919
        data.extend_from_slice(&[0x37, 0x04, 0x00]); // height - 1 = 1079
        let meta = extract_metadata(&data).unwrap();
        assert_eq!((meta.width, meta.height), (1920, 1080));
    }

    #[test]
    fn test_webp_vp8l() {
        let mut data = b"RIFF\x00\x00\x00\x00WEBPVP8L".to_vec();
        data.extend_from_slice(&[0x05, 0, 0, 0]);
        data.push(0x2F);
        // width - 1 = 99, height - 1 = 49
        let bits: u32 = 99 | (49 << 14);
        data.extend_from_slice(&bits.to_le_bytes());
        let meta = extract_metadata(&data).unwrap();
        assert_eq!((meta.width, meta.height), (100, 50));
    }

    #[test]
    fn test_truncated_headers() {
        assert!(extract_metadata(b"GIF89a\x01").is_none());
        assert!(extract_metadata(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]).is_none());
        assert!(extract_metadata(b"BM\x00\x00").is_none());
        assert!(extract_metadata(&[]).is_none());
    }

    #[test]
    fn test_decoded_bytes() {
        let meta = ImageMetadata {
            width: 4000,
            height: 3000,
            format: ImageFormat::Jpeg,
            size_bytes: 0,
        };
        assert_eq!(meta.decoded_bytes(), 48_000_000);
    }
}
