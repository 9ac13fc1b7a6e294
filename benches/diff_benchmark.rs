use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::io;

use kontrast::diff::diff_streams;

/// Encode a solid RGBA image, with a square of `changed` pixels in one corner
fn png_bytes(width: u32, height: u32, changed: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            if x < changed && y < changed {
                data.extend_from_slice(&[255, 0, 255, 255]);
            } else {
                data.extend_from_slice(&[240, 240, 240, 255]);
            }
        }
    }

    let mut out = Vec::new();
    let mut encoder = png::Encoder::new(&mut out, width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().unwrap();
    writer.write_image_data(&data).unwrap();
    writer.finish().unwrap();
    out
}

fn benchmark_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_streams");
    for (width, height) in [(360, 640), (1080, 1920)] {
        let golden = png_bytes(width, height, 0);
        let candidate = png_bytes(width, height, 64);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &(golden, candidate),
            |b, (golden, candidate)| {
                b.iter(|| {
                    let report =
                        diff_streams(black_box(&golden[..]), black_box(&candidate[..]), io::sink()).unwrap();
                    assert_eq!(report.mismatched, 64 * 64);
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, benchmark_diff);
criterion_main!(benches);
