//! Loading tier 2 codecs.

use super::external::{ToolDecoder, ToolSpec, resolve_tool};
use super::{Decode, NativeDecoder, NetworkHint};
use crate::{ConvertError, DecodedSurface, ImageFormat, RawInput, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Source of tier 2 decode capabilities.
///
/// Implementations perform the actual (possibly slow) load; caching and
/// coalescing are handled by [`super::CodecCache`].
pub trait CodecLoader: Send + Sync + 'static {
    /// Load the codec for `format`.
    fn load(&self, format: ImageFormat) -> impl Future<Output = Result<Arc<dyn Decode>>> + Send;
}

/// Codec settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecOptions {
    /// Bound on one codec load, in seconds
    pub load_timeout_secs: u64,
    /// Warm up the HEIC codec at start-up
    pub preload: bool,
    /// Network condition used to decide on preloading
    pub network: NetworkHint,
    /// Where downloaded decoder tools are kept; defaults to the user cache dir
    pub cache_dir: Option<PathBuf>,
    /// External HEIC decoder
    pub heic: ToolSpec,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            load_timeout_secs: 10,
            preload: true,
            network: NetworkHint::Unknown,
            cache_dir: None,
            heic: ToolSpec::default(),
        }
    }
}

impl CodecOptions {
    /// Effective tool cache directory.
    pub fn resolved_cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|d| d.join("covert").join("codecs")))
    }
}

// 1x1 AVIF used to probe for native support.
const AVIF_PROBE: &str = "AAAAIGZ0eXBhdmlmAAAAAGF2aWZtaWYxbWlhZk1BMUIAAADybWV0YQAAAAAAAAAoaGRscgAAAAAAAAAAcGljdAAAAAAAAAAAAAAAAGxpYmF2aWYAAAAADnBpdG0AAAAAAAEAAAAeaWxvYwAAAABEAAABAAEAAAABAAABGgAAAB0AAAAoaWluZgAAAAAAAQAAABppbmZlAgAAAAABAABhdjAxQ29sb3IAAAAAamlwcnAAAABLaXBjbwAAABRpc3BlAAAAAAAAAAIAAAACAAAAEHBpeGkAAAAAAwgICAAAAAxhdjFDgQ0MAAAAABNjb2xybmNseAACAAIAAYAAAAAXaXBtYQAAAAAAAAABAAEEAQKDBAAAACVtZGF0EgAKBzgABpAQ0AIyExAAAAAP+j/AAAAQAAID";

static AVIF_NATIVE: Lazy<bool> = Lazy::new(|| {
    let supported = STANDARD
        .decode(AVIF_PROBE)
        .ok()
        .map(|bytes| RawInput::new("probe.avif", bytes))
        .is_some_and(|probe| NativeDecoder.decode(&probe, ImageFormat::Avif).is_ok());
    debug!(supported, "AVIF native probe");
    supported
});

/// Whether this build decodes AVIF natively. Probed once per process.
pub fn avif_supported() -> bool {
    *AVIF_NATIVE
}

/// Decoder that always fails with a fixed reason.
#[derive(Debug, Clone)]
struct Unavailable {
    reason: &'static str,
}

impl Decode for Unavailable {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn decode(&self, input: &RawInput, format: ImageFormat) -> Result<DecodedSurface> {
        Err(ConvertError::decode(input.name(), format, self.reason))
    }
}

const AVIF_GUIDANCE: &str = "this build can't decode AVIF images; \
     install a build with the avif-native feature or convert the file with a newer tool";

/// Loader used by the application.
///
/// TIFF is compiled in. AVIF uses the native decoder when the probe
/// succeeds and otherwise fails each decode with upgrade guidance. HEIC runs
/// an external decoder tool, downloading it if a URL is configured.
#[derive(Debug, Clone, Default)]
pub struct DefaultCodecLoader {
    options: CodecOptions,
    client: reqwest::Client,
}

impl DefaultCodecLoader {
    /// Create a loader from codec settings.
    pub fn new(options: CodecOptions) -> Self {
        Self {
            options,
            client: reqwest::Client::new(),
        }
    }

    /// Codec settings.
    pub fn options(&self) -> &CodecOptions {
        &self.options
    }
}

impl CodecLoader for DefaultCodecLoader {
    async fn load(&self, format: ImageFormat) -> Result<Arc<dyn Decode>> {
        match format {
            ImageFormat::Tiff => Ok(Arc::new(NativeDecoder)),
            ImageFormat::Avif => {
                if avif_supported() {
                    Ok(Arc::new(NativeDecoder))
                } else {
                    info!("AVIF not supported natively; decodes will fail with guidance");
                    Ok(Arc::new(Unavailable { reason: AVIF_GUIDANCE }))
                }
            }
            ImageFormat::Heic => {
                let cache_dir = self.options.resolved_cache_dir();
                let program =
                    resolve_tool(&self.client, &self.options.heic, cache_dir.as_deref(), format).await?;
                Ok(Arc::new(ToolDecoder::new(program, self.options.heic.args.clone())))
            }
            other => Err(ConvertError::NoCodec(other)),
        }
    }
}
