//! Decoded raster surfaces.

use image::{DynamicImage, RgbaImage};

/// A width × height RGBA raster produced by decoding.
///
/// Owned by the conversion step that produced it and consumed by either the
/// encoder or the size optimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSurface {
    pixels: RgbaImage,
}

impl DecodedSurface {
    /// Wrap an RGBA buffer.
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    /// Build from raw RGBA bytes. Returns `None` if the buffer length does not
    /// match `width * height * 4`.
    pub fn from_raw(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        RgbaImage::from_raw(width, height, rgba).map(Self::new)
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Borrow the pixel buffer.
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Raw RGBA bytes, row-major.
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Whether any pixel is not fully opaque.
    pub fn has_transparency(&self) -> bool {
        self.pixels.pixels().any(|p| p[3] != u8::MAX)
    }

    /// Unwrap into the pixel buffer.
    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }
}

impl From<DynamicImage> for DecodedSurface {
    fn from(img: DynamicImage) -> Self {
        Self::new(img.into_rgba8())
    }
}
