//! Size optimization toward a target byte budget.
//!
//! The optimizer searches two levers: encode quality and a uniform scale
//! factor. Which lever goes first depends on the image content; photos lose
//! quality first, graphics shrink first. Both searches are bounded binary
//! searches sharing one iteration budget.
//!
//! A missed target is not an error. The smallest result seen is returned and
//! flagged as best-effort.

use crate::classify::{DEFAULT_SAMPLE_COUNT, DEFAULT_VARIANCE_THRESHOLD, ImageClass, classify};
use crate::encode::{DEFAULT_QUALITY, EncodeSurface, OutputFormat, clamp_quality};
use crate::resize::scale_surface;
use crate::{DecodedSurface, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tracing::debug;

/// Tunable bounds for the search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeSettings {
    /// Lowest quality probed
    pub quality_min: f32,
    /// Highest quality considered
    pub quality_max: f32,
    /// Smallest scale factor probed
    pub scale_min: f32,
    /// Largest scale factor considered
    pub scale_max: f32,
    /// Encodes allowed beyond the initial one, across both levers
    pub max_iterations: u32,
    /// Stop subdividing quality below this interval
    pub quality_tolerance: f32,
    /// Stop subdividing scale below this interval
    pub scale_tolerance: f32,
    /// Color variance above which an image is a photo
    pub variance_threshold: f64,
    /// Pixels sampled by the classifier
    pub sample_count: usize,
}

impl Default for OptimizeSettings {
    fn default() -> Self {
        Self {
            quality_min: 0.10,
            quality_max: 1.0,
            scale_min: 0.25,
            scale_max: 1.0,
            max_iterations: 8,
            quality_tolerance: 0.02,
            scale_tolerance: 0.05,
            variance_threshold: DEFAULT_VARIANCE_THRESHOLD,
            sample_count: DEFAULT_SAMPLE_COUNT,
        }
    }
}

/// Per-conversion optimization request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeRequest {
    /// Byte budget for the output
    pub target_bytes: u64,
    /// Output container
    pub format: OutputFormat,
    /// Quality of the first encode
    pub initial_quality: f32,
    /// Only dimensions may change
    pub lock_quality: bool,
    /// Only quality may change
    pub lock_dimensions: bool,
}

impl OptimizeRequest {
    /// Request with no locks.
    pub fn new(target_bytes: u64, format: OutputFormat) -> Self {
        Self {
            target_bytes,
            format,
            initial_quality: DEFAULT_QUALITY,
            lock_quality: false,
            lock_dimensions: false,
        }
    }
}

/// The knob a probe adjusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lever {
    /// Encode quality
    Quality,
    /// Linear scale factor
    Scale,
}

/// Lever order chosen for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// No lever could move; the initial encode is the result
    SinglePass,
    /// Quality only (dimensions locked)
    QualityOnly,
    /// Scale only (quality locked, or lossless output)
    ScaleOnly,
    /// Quality, then scale
    QualityFirst,
    /// Scale, then quality
    ScaleFirst,
}

/// One encode issued by a search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    /// Lever being searched
    pub lever: Lever,
    /// Lever value at this probe
    pub value: f32,
    /// Encoded size
    pub bytes: u64,
}

/// Result of an optimization run.
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    /// Encoded output
    pub data: Vec<u8>,
    /// Quality used for `data`
    pub quality: f32,
    /// Scale used for `data` (1.0 = original size)
    pub scale: f32,
    /// Encodes issued after the initial one
    pub iterations: u32,
    /// Whether `data` fits the budget
    pub target_met: bool,
    /// Lever order used
    pub strategy: Strategy,
    /// Classification, when both levers were available
    pub class: Option<ImageClass>,
    /// Every search probe in order
    pub probes: Vec<Probe>,
}

impl OptimizationOutcome {
    /// The budget was missed and `data` is the closest result found.
    pub fn is_best_effort(&self) -> bool {
        !self.target_met
    }

    /// Size of `data`.
    pub fn byte_size(&self) -> u64 {
        self.data.len() as u64
    }
}

struct Candidate {
    data: Vec<u8>,
    quality: f32,
    scale: f32,
}

impl Candidate {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}

struct SearchResult {
    data: Vec<u8>,
    value: f32,
    met: bool,
}

/// Bounded binary search over one lever.
///
/// A probe within budget raises `lo` and becomes the current success. A probe
/// over budget lowers `hi` and is kept as the fallback if it is the smallest
/// overshoot so far. Returns `None` when no probe could run.
#[allow(clippy::too_many_arguments)]
fn binary_search(
    lever: Lever,
    mut lo: f32,
    mut hi: f32,
    tolerance: f32,
    budget: u32,
    target: u64,
    probes: &mut Vec<Probe>,
    mut encode_at: impl FnMut(f32) -> Result<Vec<u8>>,
) -> Result<Option<SearchResult>> {
    let mut success: Option<(Vec<u8>, f32)> = None;
    let mut fallback: Option<(Vec<u8>, f32)> = None;
    let mut used = 0;

    while used < budget && hi - lo > tolerance {
        let mid = (lo + hi) / 2.0;
        let data = encode_at(mid)?;
        used += 1;

        let bytes = data.len() as u64;
        probes.push(Probe { lever, value: mid, bytes });
        debug!(lever = ?lever, value = mid, bytes, target, "Probe");

        if bytes <= target {
            lo = mid;
            success = Some((data, mid));
        } else {
            hi = mid;
            if fallback.as_ref().is_none_or(|(best, _)| data.len() < best.len()) {
                fallback = Some((data, mid));
            }
        }
    }

    Ok(match (success, fallback) {
        (Some((data, value)), _) => Some(SearchResult { data, value, met: true }),
        (None, Some((data, value))) => Some(SearchResult { data, value, met: false }),
        (None, None) => None,
    })
}

/// Searches quality and scale toward a byte budget.
#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    settings: OptimizeSettings,
}

impl Optimizer {
    /// Create an optimizer with the given bounds.
    pub fn new(settings: OptimizeSettings) -> Self {
        Self { settings }
    }

    /// Current bounds.
    pub fn settings(&self) -> &OptimizeSettings {
        &self.settings
    }

    /// Optimize `surface` toward `request.target_bytes`.
    ///
    /// Encode failures propagate; a missed budget does not.
    pub fn optimize<E: EncodeSurface>(
        &self,
        encoder: &mut E,
        surface: &DecodedSurface,
        request: &OptimizeRequest,
    ) -> Result<OptimizationOutcome> {
        let s = &self.settings;
        let target = request.target_bytes;
        let format = request.format;

        // Lossless output ignores quality, so the lever is off regardless of locks.
        let can_quality = !request.lock_quality && !format.is_lossless();
        let can_scale = !request.lock_dimensions;

        let initial_quality = clamp_quality(request.initial_quality).min(s.quality_max);
        let initial = encoder.encode(surface, format, initial_quality)?;

        let mut outcome = OptimizationOutcome {
            target_met: initial.len() as u64 <= target,
            data: initial,
            quality: initial_quality,
            scale: 1.0,
            iterations: 0,
            strategy: Strategy::SinglePass,
            class: None,
            probes: Vec::new(),
        };

        if outcome.target_met || (!can_quality && !can_scale) {
            debug!(
                bytes = outcome.byte_size(),
                target,
                target_met = outcome.target_met,
                "Optimization skipped"
            );
            return Ok(outcome);
        }

        let class = (can_quality && can_scale)
            .then(|| classify(surface, s.sample_count, s.variance_threshold));
        outcome.class = class;

        let strategy = match (can_quality, can_scale, class) {
            (true, false, _) => Strategy::QualityOnly,
            (false, true, _) => Strategy::ScaleOnly,
            (_, _, Some(ImageClass::Graphic)) => Strategy::ScaleFirst,
            _ => Strategy::QualityFirst,
        };
        outcome.strategy = strategy;

        let levers: &[Lever] = match strategy {
            Strategy::QualityOnly => &[Lever::Quality],
            Strategy::ScaleOnly => &[Lever::Scale],
            Strategy::QualityFirst => &[Lever::Quality, Lever::Scale],
            Strategy::ScaleFirst => &[Lever::Scale, Lever::Quality],
            Strategy::SinglePass => &[],
        };

        let mut best = Candidate {
            data: std::mem::take(&mut outcome.data),
            quality: initial_quality,
            scale: 1.0,
        };
        let mut quality = initial_quality;
        let mut scale = s.scale_max.min(1.0);
        let mut probes = Vec::new();

        for (i, lever) in levers.iter().enumerate() {
            let remaining = s.max_iterations.saturating_sub(probes.len() as u32);
            let budget = if i == 0 && levers.len() > 1 {
                s.max_iterations.div_ceil(2)
            } else {
                remaining
            };

            let result = match lever {
                Lever::Quality => {
                    let base: Cow<'_, DecodedSurface> = if scale < 1.0 {
                        Cow::Owned(scale_surface(surface, scale))
                    } else {
                        Cow::Borrowed(surface)
                    };
                    let lo = s.quality_min.min(quality);
                    binary_search(Lever::Quality, lo, quality, s.quality_tolerance, budget, target, &mut probes, |q| {
                        encoder.encode(&base, format, q)
                    })?
                    .map(|r| {
                        quality = r.value;
                        (r, quality, scale)
                    })
                }
                Lever::Scale => {
                    let q = quality;
                    binary_search(Lever::Scale, s.scale_min, scale, s.scale_tolerance, budget, target, &mut probes, |f| {
                        encoder.encode(&scale_surface(surface, f), format, q)
                    })?
                    .map(|r| {
                        scale = r.value;
                        (r, quality, scale)
                    })
                }
            };

            let Some((result, q, f)) = result else {
                continue;
            };

            if result.met {
                outcome.data = result.data;
                outcome.quality = q;
                outcome.scale = f;
                outcome.target_met = true;
                outcome.iterations = probes.len() as u32;
                outcome.probes = probes;
                debug!(
                    strategy = ?strategy,
                    quality = q,
                    scale = f,
                    iterations = outcome.iterations,
                    bytes = outcome.byte_size(),
                    "Target met"
                );
                return Ok(outcome);
            }

            if (result.data.len() as u64) < best.len() {
                best = Candidate {
                    data: result.data,
                    quality: q,
                    scale: f,
                };
            }
        }

        outcome.iterations = probes.len() as u32;
        outcome.probes = probes;
        outcome.target_met = best.len() <= target;
        outcome.quality = best.quality;
        outcome.scale = best.scale;
        outcome.data = best.data;

        debug!(
            strategy = ?strategy,
            quality = outcome.quality,
            scale = outcome.scale,
            iterations = outcome.iterations,
            bytes = outcome.byte_size(),
            target,
            "Best-effort result"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Encoder;
    use image::{Rgba, RgbaImage};

    /// Counts encodes passed through to a real encoder.
    #[derive(Default)]
    struct Counting {
        inner: Encoder,
        calls: usize,
    }

    impl EncodeSurface for Counting {
        fn encode(&mut self, surface: &DecodedSurface, format: OutputFormat, quality: f32) -> Result<Vec<u8>> {
            self.calls += 1;
            self.inner.encode(surface, format, quality)
        }
    }

    fn noise(width: u32, height: u32) -> DecodedSurface {
        let mut state: u32 = 0xDEAD_BEEF;
        DecodedSurface::new(RgbaImage::from_fn(width, height, |_, _| {
            let mut next = || {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 16) as u8
            };
            Rgba([next(), next(), next(), 255])
        }))
    }

    /// White canvas with a thin dark border: low sampled variance but
    /// enough edges to encode to more than a few bytes.
    fn graphic(size: u32) -> DecodedSurface {
        DecodedSurface::new(RgbaImage::from_fn(size, size, |x, y| {
            if x % 50 == 7 || y % 50 == 7 {
                Rgba([20, 20, 20, 255])
            } else {
                Rgba([250, 250, 250, 255])
            }
        }))
    }

    #[test]
    fn test_already_under_budget_encodes_once() {
        let surface = noise(64, 64);
        let mut encoder = Counting::default();
        let request = OptimizeRequest::new(u64::MAX, OutputFormat::Jpeg);

        let outcome = Optimizer::default().optimize(&mut encoder, &surface, &request).unwrap();

        assert_eq!(encoder.calls, 1);
        assert_eq!(outcome.iterations, 0);
        assert!(outcome.target_met);
        assert_eq!(outcome.scale, 1.0);
        assert_eq!(outcome.strategy, Strategy::SinglePass);
    }

    #[test]
    fn test_both_locks_return_single_pass() {
        let surface = noise(64, 64);
        let mut encoder = Counting::default();
        let request = OptimizeRequest {
            lock_quality: true,
            lock_dimensions: true,
            ..OptimizeRequest::new(1, OutputFormat::Jpeg)
        };

        let outcome = Optimizer::default().optimize(&mut encoder, &surface, &request).unwrap();

        assert_eq!(encoder.calls, 1);
        assert_eq!(outcome.iterations, 0);
        assert!(outcome.is_best_effort());
        assert_eq!(outcome.quality, DEFAULT_QUALITY);
    }

    #[test]
    fn test_unreachable_target_is_bounded_best_effort() {
        let surface = noise(96, 96);
        let mut encoder = Counting::default();
        let request = OptimizeRequest::new(1, OutputFormat::Jpeg);

        let outcome = Optimizer::default().optimize(&mut encoder, &surface, &request).unwrap();

        assert!(outcome.iterations <= 8);
        assert_eq!(encoder.calls as u32, outcome.iterations + 1);
        assert!(outcome.is_best_effort());

        let smallest = outcome.probes.iter().map(|p| p.bytes).min().unwrap();
        assert_eq!(outcome.byte_size(), smallest);
    }

    #[test]
    fn test_photo_reduces_quality_first() {
        let surface = noise(128, 96);
        let mut encoder = Counting::default();
        let initial = encoder.encode(&surface, OutputFormat::Jpeg, DEFAULT_QUALITY).unwrap();
        let request = OptimizeRequest::new(initial.len() as u64 * 2 / 3, OutputFormat::Jpeg);

        let outcome = Optimizer::default().optimize(&mut encoder, &surface, &request).unwrap();

        assert_eq!(outcome.class, Some(ImageClass::Photo));
        assert_eq!(outcome.strategy, Strategy::QualityFirst);
        assert_eq!(outcome.probes[0].lever, Lever::Quality);
        assert!(outcome.byte_size() <= request.target_bytes || outcome.is_best_effort());
    }

    #[test]
    fn test_graphic_resizes_first() {
        let surface = graphic(200);
        let mut encoder = Counting::default();
        let request = OptimizeRequest::new(100, OutputFormat::Jpeg);

        let outcome = Optimizer::default().optimize(&mut encoder, &surface, &request).unwrap();

        assert_eq!(outcome.class, Some(ImageClass::Graphic));
        assert_eq!(outcome.strategy, Strategy::ScaleFirst);
        assert_eq!(outcome.probes[0].lever, Lever::Scale);
        assert!(outcome.probes.iter().any(|p| p.lever == Lever::Quality));
    }

    #[test]
    fn test_lossless_only_resizes() {
        let surface = noise(64, 64);
        let mut encoder = Counting::default();
        let request = OptimizeRequest::new(2_000, OutputFormat::Png);

        let outcome = Optimizer::default().optimize(&mut encoder, &surface, &request).unwrap();

        assert_eq!(outcome.strategy, Strategy::ScaleOnly);
        assert_eq!(outcome.class, None);
        assert!(outcome.probes.iter().all(|p| p.lever == Lever::Scale));
        assert!(outcome.scale < 1.0);
    }

    #[test]
    fn test_lossless_with_locked_dimensions_is_single_pass() {
        let surface = noise(32, 32);
        let mut encoder = Counting::default();
        let request = OptimizeRequest {
            lock_dimensions: true,
            ..OptimizeRequest::new(10, OutputFormat::Png)
        };

        let outcome = Optimizer::default().optimize(&mut encoder, &surface, &request).unwrap();
        assert_eq!(encoder.calls, 1);
        assert_eq!(outcome.strategy, Strategy::SinglePass);
    }

    #[test]
    fn test_met_target_keeps_least_aggressive_quality() {
        let surface = noise(96, 96);
        let mut encoder = Counting::default();
        let request = OptimizeRequest {
            lock_dimensions: true,
            ..OptimizeRequest::new(0, OutputFormat::Jpeg)
        };
        let low = encoder.encode(&surface, OutputFormat::Jpeg, 0.5).unwrap();
        let request = OptimizeRequest {
            target_bytes: low.len() as u64,
            ..request
        };

        let outcome = Optimizer::default().optimize(&mut encoder, &surface, &request).unwrap();

        assert_eq!(outcome.strategy, Strategy::QualityOnly);
        assert!(outcome.target_met);
        assert!(outcome.byte_size() <= request.target_bytes);
        // Every successful probe is at or below the chosen quality
        for probe in outcome.probes.iter().filter(|p| p.bytes <= request.target_bytes) {
            assert!(probe.value <= outcome.quality);
        }
    }

    #[test]
    fn test_iteration_budget_is_tunable() {
        let surface = noise(64, 64);
        let mut encoder = Counting::default();
        let optimizer = Optimizer::new(OptimizeSettings {
            max_iterations: 3,
            ..OptimizeSettings::default()
        });

        let outcome = optimizer
            .optimize(&mut encoder, &surface, &OptimizeRequest::new(1, OutputFormat::Jpeg))
            .unwrap();
        assert!(outcome.iterations <= 3);
    }
}
