//! Alpha flattening for formats without an alpha channel.

use crate::DecodedSurface;

/// Background used when flattening transparency.
pub const WHITE: [u8; 3] = [255, 255, 255];

/// Composite an RGBA surface over a solid background, writing packed RGB
/// into `out`. `out` is cleared and reused, so its capacity carries over
/// between calls.
pub fn flatten_into(surface: &DecodedSurface, background: [u8; 3], out: &mut Vec<u8>) {
    let (width, height) = surface.dimensions();
    out.clear();
    out.reserve(width as usize * height as usize * 3);

    for px in surface.as_raw().chunks_exact(4) {
        let [r, g, b, a] = [px[0], px[1], px[2], px[3]];
        if a == u8::MAX {
            out.extend_from_slice(&[r, g, b]);
            continue;
        }

        let alpha = a as f32 / 255.0;
        let inv_alpha = 1.0 - alpha;
        let blend = |c: u8, bg: u8| ((c as f32 * alpha) + (bg as f32 * inv_alpha)).round() as u8;

        out.extend_from_slice(&[
            blend(r, background[0]),
            blend(g, background[1]),
            blend(b, background[2]),
        ]);
    }
}
