//! Uniform downscaling of decoded surfaces.

use crate::DecodedSurface;
use image::imageops::{self, FilterType};

/// Calculate scaled dimensions for a linear scale factor.
///
/// Both sides are rounded to the nearest pixel and never drop below 1.
///
/// # Example
/// ```
/// use covert_image::scaled_dimensions;
///
/// assert_eq!(scaled_dimensions(4000, 3000, 0.5), (2000, 1500));
/// assert_eq!(scaled_dimensions(3, 3, 0.01), (1, 1));
/// ```
pub fn scaled_dimensions(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let scale = scale.clamp(0.0, 1.0) as f64;
    let new_width = (width as f64 * scale).round() as u32;
    let new_height = (height as f64 * scale).round() as u32;
    (new_width.max(1), new_height.max(1))
}

/// Scale a surface with a Lanczos3 filter.
///
/// A scale of 1.0 (or one that rounds to the original size) returns a copy
/// of the input.
pub fn scale_surface(surface: &DecodedSurface, scale: f32) -> DecodedSurface {
    let (width, height) = surface.dimensions();
    let (new_width, new_height) = scaled_dimensions(width, height, scale);

    if (new_width, new_height) == (width, height) {
        return surface.clone();
    }

    DecodedSurface::new(imageops::resize(
        surface.pixels(),
        new_width,
        new_height,
        FilterType::Lanczos3,
    ))
}
