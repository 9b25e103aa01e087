//! Benchmarks for detection and classification.

use covert_image::{DecodedSurface, RawInput, classify, detect_format, detect_from_signature};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{Rgba, RgbaImage};

fn bench_format_detection(c: &mut Criterion) {
    let jpeg_data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];
    let mut heic_data = vec![0x00, 0x00, 0x00, 0x18];
    heic_data.extend_from_slice(b"ftypheic\x00\x00\x00\x00");
    let unknown = RawInput::new("scan.tif", vec![0u8; 64]);

    c.bench_function("detect_jpeg", |b| {
        b.iter(|| detect_from_signature(black_box(&jpeg_data)))
    });

    c.bench_function("detect_heic", |b| {
        b.iter(|| detect_from_signature(black_box(&heic_data)))
    });

    c.bench_function("detect_extension_fallback", |b| {
        b.iter(|| detect_format(black_box(&unknown)))
    });
}

fn bench_classification(c: &mut Criterion) {
    let photo = DecodedSurface::new(RgbaImage::from_fn(4000, 3000, |x, y| {
        Rgba([(x ^ y) as u8, (x * 7) as u8, (y * 13) as u8, 255])
    }));

    c.bench_function("classify_4000x3000", |b| {
        b.iter(|| classify(black_box(&photo), 100, 2000.0))
    });
}

criterion_group!(benches, bench_format_detection, bench_classification);
criterion_main!(benches);
