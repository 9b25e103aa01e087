//! Process-lifetime cache of tier 2 codecs.

use super::{CodecLoader, Decode};
use crate::detect::Tier;
use crate::{ConvertError, ImageFormat, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default bound on a single codec load.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

type SharedLoad = Shared<BoxFuture<'static, Result<Arc<dyn Decode>>>>;

struct InFlight {
    generation: u64,
    load: SharedLoad,
}

#[derive(Default)]
struct CacheState {
    loaded: HashMap<ImageFormat, Arc<dyn Decode>>,
    in_flight: HashMap<ImageFormat, InFlight>,
    next_generation: u64,
}

/// Host's view of its network connection, used to decide on preloading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkHint {
    /// Fast connection
    Fast,
    /// Slow or metered connection
    Slow,
    /// No information; treated as fast
    #[default]
    Unknown,
}

impl NetworkHint {
    /// Whether a speculative preload is worthwhile.
    pub fn allows_preload(&self) -> bool {
        !matches!(self, NetworkHint::Slow)
    }
}

impl FromStr for NetworkHint {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(NetworkHint::Fast),
            "slow" => Ok(NetworkHint::Slow),
            "unknown" => Ok(NetworkHint::Unknown),
            other => Err(format!("unknown network hint '{}'", other)),
        }
    }
}

impl fmt::Display for NetworkHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkHint::Fast => f.write_str("fast"),
            NetworkHint::Slow => f.write_str("slow"),
            NetworkHint::Unknown => f.write_str("unknown"),
        }
    }
}

/// Cache of loaded tier 2 codecs.
///
/// Each format is loaded at most once while loads keep succeeding.
/// Concurrent requests for a format that is still loading await the same
/// load. Failed loads are not cached, so the next request tries again.
pub struct CodecCache<L> {
    loader: Arc<L>,
    timeout: Duration,
    state: Mutex<CacheState>,
}

impl<L: CodecLoader> CodecCache<L> {
    /// Create a cache with the default load timeout.
    pub fn new(loader: L) -> Self {
        Self::with_timeout(loader, DEFAULT_LOAD_TIMEOUT)
    }

    /// Create a cache with a custom load timeout.
    pub fn with_timeout(loader: L, timeout: Duration) -> Self {
        Self {
            loader: Arc::new(loader),
            timeout,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// The load timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    // The lock is never held across an await, so a poisoned lock still
    // guards consistent maps.
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a codec for `format` has finished loading.
    pub fn is_loaded(&self, format: ImageFormat) -> bool {
        self.lock().loaded.contains_key(&format)
    }

    /// Whether a load for `format` is in progress.
    pub fn is_loading(&self, format: ImageFormat) -> bool {
        self.lock().in_flight.contains_key(&format)
    }

    fn start_load(&self, format: ImageFormat) -> SharedLoad {
        let loader = Arc::clone(&self.loader);
        let timeout = self.timeout;

        async move {
            debug!(format = %format, "Loading codec");
            match tokio::time::timeout(timeout, loader.load(format)).await {
                Ok(Ok(codec)) => {
                    info!(format = %format, codec = codec.name(), "Codec loaded");
                    Ok(codec)
                }
                Ok(Err(err)) => Err(err),
                Err(_) => Err(ConvertError::codec_load(
                    format,
                    format!("timed out after {}s; check your connection and try again", timeout.as_secs()),
                )),
            }
        }
        .boxed()
        .shared()
    }

    /// Get the codec for a tier 2 format, loading it if needed.
    ///
    /// Formats without a tier 2 codec fail with `unsupported_format`.
    pub async fn get(&self, format: ImageFormat) -> Result<Arc<dyn Decode>> {
        if format.tier() != Tier::External {
            return Err(ConvertError::NoCodec(format));
        }

        // Check loaded, then in-flight, then register; all under one lock.
        let (generation, load) = {
            let mut state = self.lock();
            if let Some(codec) = state.loaded.get(&format) {
                return Ok(Arc::clone(codec));
            }

            match state.in_flight.get(&format) {
                Some(entry) => (entry.generation, entry.load.clone()),
                None => {
                    let generation = state.next_generation;
                    state.next_generation += 1;
                    let load = self.start_load(format);
                    state.in_flight.insert(
                        format,
                        InFlight {
                            generation,
                            load: load.clone(),
                        },
                    );
                    (generation, load)
                }
            }
        };

        let result = load.await;

        let mut state = self.lock();
        if state
            .in_flight
            .get(&format)
            .is_some_and(|entry| entry.generation == generation)
        {
            state.in_flight.remove(&format);
        }

        match &result {
            Ok(codec) => {
                state
                    .loaded
                    .entry(format)
                    .or_insert_with(|| Arc::clone(codec));
            }
            Err(err) => warn!(format = %format, error = %err, "Codec load failed"),
        }
        result
    }
}

impl<L: CodecLoader> CodecCache<L> {
    /// Start loading `format` in the background. Errors are dropped; the next
    /// real request retries and reports them.
    ///
    /// Does nothing outside a Tokio runtime.
    pub fn preload(self: &Arc<Self>, format: ImageFormat) {
        if self.is_loaded(format) || self.is_loading(format) {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(format = %format, "No runtime; skipping preload");
            return;
        };

        let cache = Arc::clone(self);
        handle.spawn(async move {
            if let Err(err) = cache.get(format).await {
                debug!(format = %format, error = %err, "Preload failed");
            }
        });
    }

    /// Preload the most common tier 2 codec (HEIC) unless the network is slow.
    pub fn init_preload(self: &Arc<Self>, hint: NetworkHint) {
        if hint.allows_preload() {
            self.preload(ImageFormat::Heic);
        }
    }
}
