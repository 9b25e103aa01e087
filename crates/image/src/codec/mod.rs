//! Per-format decode capabilities.
//!
//! Tier 1 formats go straight to the built-in decoder. Tier 2 formats are
//! resolved through a [`CodecCache`], which loads each codec at most once per
//! process and shares in-flight loads between concurrent callers.

mod cache;
mod external;
mod integrity;
mod loader;

pub use cache::{CodecCache, DEFAULT_LOAD_TIMEOUT, NetworkHint};
pub use external::{ToolDecoder, ToolSpec};
pub use integrity::{is_valid_sri, verify_integrity};
pub use loader::{CodecLoader, CodecOptions, DefaultCodecLoader, avif_supported};

use crate::detect::{FormatDescriptor, Tier};
use crate::{ConvertError, DecodedSurface, ImageFormat, RawInput, Result};
use std::sync::Arc;
use tracing::debug;

/// A loaded decode capability.
pub trait Decode: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Decode `input`, which has already been detected as `format`.
    fn decode(&self, input: &RawInput, format: ImageFormat) -> Result<DecodedSurface>;
}

/// Decoder backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeDecoder;

fn native_format(format: ImageFormat) -> Option<image::ImageFormat> {
    match format {
        ImageFormat::Jpeg => Some(image::ImageFormat::Jpeg),
        ImageFormat::Png => Some(image::ImageFormat::Png),
        ImageFormat::WebP => Some(image::ImageFormat::WebP),
        ImageFormat::Gif => Some(image::ImageFormat::Gif),
        ImageFormat::Bmp => Some(image::ImageFormat::Bmp),
        ImageFormat::Tiff => Some(image::ImageFormat::Tiff),
        ImageFormat::Avif => Some(image::ImageFormat::Avif),
        ImageFormat::Heic => None,
    }
}

impl Decode for NativeDecoder {
    fn name(&self) -> &str {
        "native"
    }

    fn decode(&self, input: &RawInput, format: ImageFormat) -> Result<DecodedSurface> {
        let native = native_format(format).ok_or(ConvertError::NoCodec(format))?;
        let img = image::load_from_memory_with_format(input.bytes(), native)
            .map_err(|e| ConvertError::decode(input.name(), format, e))?;

        if img.width() == 0 || img.height() == 0 {
            return Err(ConvertError::decode(input.name(), format, "image has no pixels"));
        }
        Ok(DecodedSurface::from(img))
    }
}

/// The codec provider: picks a decoder by tier and runs it off the async
/// executor.
pub struct Codecs<L: CodecLoader = DefaultCodecLoader> {
    native: Arc<dyn Decode>,
    cache: Arc<CodecCache<L>>,
}

impl<L: CodecLoader> Codecs<L> {
    /// Build a provider around a codec cache.
    pub fn new(cache: Arc<CodecCache<L>>) -> Self {
        Self {
            native: Arc::new(NativeDecoder),
            cache,
        }
    }

    /// The tier 2 codec cache.
    pub fn cache(&self) -> &Arc<CodecCache<L>> {
        &self.cache
    }

    /// Resolve the decoder for a detected input. The descriptor's tier alone
    /// selects the path.
    pub async fn decoder_for(&self, descriptor: &FormatDescriptor) -> Result<Arc<dyn Decode>> {
        match descriptor.tier {
            Tier::Native => Ok(Arc::clone(&self.native)),
            Tier::External => self.cache.get(descriptor.format).await,
        }
    }

    /// Decode an input on the blocking pool.
    pub async fn decode(&self, input: &RawInput, descriptor: &FormatDescriptor) -> Result<DecodedSurface> {
        let decoder = self.decoder_for(descriptor).await?;
        let format = descriptor.format;
        let input = input.clone();

        debug!(
            file = input.name(),
            format = %format,
            tier = descriptor.tier.number(),
            decoder = decoder.name(),
            "Decoding"
        );

        tokio::task::spawn_blocking(move || decoder.decode(&input, format))
            .await
            .map_err(|e| ConvertError::Unknown(format!("decode task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::detect_format;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = RgbaImage::from_pixel(6, 4, Rgba([9, 8, 7, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageOutputFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_native_decode() {
        let input = RawInput::new("a.png", png_bytes());
        let surface = NativeDecoder.decode(&input, ImageFormat::Png).unwrap();
        assert_eq!(surface.dimensions(), (6, 4));
    }

    #[test]
    fn test_native_decode_failure_keeps_format() {
        let input = RawInput::new("broken.jpg", vec![0xFFu8, 0xD8, 0xFF, 0xE0, 0x00]);
        let err = NativeDecoder.decode(&input, ImageFormat::Jpeg).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::DecodeFailed);
        assert_eq!(err.input_format(), Some(ImageFormat::Jpeg));
    }

    #[test]
    fn test_native_has_no_heic() {
        let input = RawInput::new("a.heic", vec![0u8; 4]);
        assert!(matches!(
            NativeDecoder.decode(&input, ImageFormat::Heic),
            Err(ConvertError::NoCodec(ImageFormat::Heic))
        ));
    }

    #[tokio::test]
    async fn test_tier_one_skips_cache() {
        let cache = Arc::new(CodecCache::new(DefaultCodecLoader::default()));
        let codecs = Codecs::new(Arc::clone(&cache));

        let input = RawInput::new("a.png", png_bytes());
        let descriptor = detect_format(&input).unwrap();
        let surface = codecs.decode(&input, &descriptor).await.unwrap();

        assert_eq!(surface.width(), 6);
        assert!(!cache.is_loaded(ImageFormat::Png));
    }
}
