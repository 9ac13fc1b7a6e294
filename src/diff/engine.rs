use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use png::{BitDepth, ColorType, Decoder, Encoder, Transformations};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::pixel::Pixel;
use super::{DiffError, DiffResult};

/// Numbers behind one comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    /// Canvas size: the larger of the two images in each dimension
    pub width: u32,
    pub height: u32,
    pub mismatched: u64,
    pub total: u64,
}

impl DiffReport {
    pub fn is_match(&self) -> bool {
        self.mismatched == 0
    }

    pub fn percent(&self) -> String {
        format_percent(self.mismatched, self.total)
    }
}

/// Result of comparing two image paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOutcome {
    Compared(DiffReport),
    /// At least one side had no image; nothing was compared or written
    Missing {
        golden_missing: bool,
        candidate_missing: bool,
    },
}

/// `3` of `200` -> `"1.50%"`
pub fn format_percent(mismatched: u64, total: u64) -> String {
    if total == 0 {
        return format!("{:.2}%", 0.0);
    }
    format!("{:.2}%", mismatched as f64 * 100.0 / total as f64)
}

/// Compare two PNG files and write the difference image to `diff_path`.
///
/// A missing input is not an error: it yields [`DiffOutcome::Missing`] and
/// leaves `diff_path` untouched.
pub fn diff_images(golden: &Path, candidate: &Path, diff_path: &Path) -> DiffResult<DiffOutcome> {
    let golden_missing = !golden.is_file();
    let candidate_missing = !candidate.is_file();
    if golden_missing || candidate_missing {
        return Ok(DiffOutcome::Missing {
            golden_missing,
            candidate_missing,
        });
    }

    let out = BufWriter::new(File::create(diff_path)?);
    let report = diff_streams(
        BufReader::new(File::open(golden)?),
        BufReader::new(File::open(candidate)?),
        out,
    )?;
    debug!(
        "{} vs {}: {} of {} pixels differ",
        golden.display(),
        candidate.display(),
        report.mismatched,
        report.total
    );
    Ok(DiffOutcome::Compared(report))
}

/// Compare two PNG streams row by row, encoding the diff image into `out`.
///
/// Only one scanline of each input is held at a time.
pub fn diff_streams<G, C, W>(golden: G, candidate: C, out: W) -> DiffResult<DiffReport>
where
    G: Read,
    C: Read,
    W: Write,
{
    let mut golden = RowReader::new(golden)?;
    let mut candidate = RowReader::new(candidate)?;

    let width = golden.width.max(candidate.width);
    let height = golden.height.max(candidate.height);
    let common_rows = golden.height.min(candidate.height);
    let canvas_width = width as usize;

    let mut encoder = Encoder::new(out, width, height);
    encoder.set_color(ColorType::Rgba);
    encoder.set_depth(BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    let mut stream = writer.stream_writer()?;

    let mut golden_row = Vec::with_capacity(canvas_width);
    let mut candidate_row = Vec::with_capacity(canvas_width);
    let mut out_row = Vec::with_capacity(canvas_width * 4);
    let mut mismatched = 0u64;

    for _ in 0..common_rows {
        golden.read_row(&mut golden_row)?;
        candidate.read_row(&mut candidate_row)?;
        golden_row.resize(canvas_width, Pixel::EMPTY);
        candidate_row.resize(canvas_width, Pixel::EMPTY);

        out_row.clear();
        for (a, b) in golden_row.iter().zip(&candidate_row) {
            if a == b {
                a.dimmed().write_rgba8(&mut out_row);
            } else {
                mismatched += 1;
                Pixel::RED.write_rgba8(&mut out_row);
            }
        }
        stream.write_all(&out_row)?;
    }

    // Rows only the taller image has
    if height > common_rows {
        out_row.clear();
        for _ in 0..canvas_width {
            Pixel::RED.write_rgba8(&mut out_row);
        }
        for _ in common_rows..height {
            stream.write_all(&out_row)?;
            mismatched += width as u64;
        }
    }

    stream.finish()?;
    writer.finish()?;

    Ok(DiffReport {
        width,
        height,
        mismatched,
        total: width as u64 * height as u64,
    })
}

/// Decodes a PNG one scanline at a time into [`Pixel`]s.
///
/// Adam7 interlaced images cannot be produced row by row, those are decoded
/// into a single buffer first.
struct RowReader<R: Read> {
    width: u32,
    height: u32,
    color: ColorType,
    source: RowSource<R>,
}

enum RowSource<R: Read> {
    Streaming(png::Reader<R>),
    Buffered {
        data: Vec<u8>,
        line_size: usize,
        next: usize,
    },
}

impl<R: Read> RowReader<R> {
    fn new(input: R) -> DiffResult<Self> {
        let mut decoder = Decoder::new(input);
        decoder.set_transformations(Transformations::EXPAND | Transformations::STRIP_16);
        let mut reader = decoder.read_info()?;

        let (color, depth) = reader.output_color_type();
        if depth != BitDepth::Eight || color == ColorType::Indexed {
            return Err(DiffError::Unsupported(format!("{:?} at {:?}", color, depth)));
        }

        let info = reader.info();
        let (width, height) = (info.width, info.height);
        let source = if info.interlaced {
            let mut data = vec![0; reader.output_buffer_size()];
            let frame = reader.next_frame(&mut data)?;
            RowSource::Buffered {
                data,
                line_size: frame.line_size,
                next: 0,
            }
        } else {
            RowSource::Streaming(reader)
        };

        Ok(Self {
            width,
            height,
            color,
            source,
        })
    }

    /// Replace `out` with the next row's pixels
    fn read_row(&mut self, out: &mut Vec<Pixel>) -> DiffResult<()> {
        out.clear();
        let color = self.color;
        match &mut self.source {
            RowSource::Streaming(reader) => {
                let row = reader.next_row()?.ok_or_else(truncated)?;
                decode_row(color, row.data(), out)
            }
            RowSource::Buffered {
                data,
                line_size,
                next,
            } => {
                let start = *next * *line_size;
                let row = data.get(start..start + *line_size).ok_or_else(truncated)?;
                *next += 1;
                decode_row(color, row, out)
            }
        }
    }
}

fn truncated() -> DiffError {
    DiffError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "image ended before its declared height",
    ))
}

fn decode_row(color: ColorType, data: &[u8], out: &mut Vec<Pixel>) -> DiffResult<()> {
    let to_i32 = |v: u8| v as i32;
    match color {
        ColorType::Grayscale => out.extend(data.iter().map(|&v| {
            let v = to_i32(v);
            Pixel::new(v, v, v, 255)
        })),
        ColorType::GrayscaleAlpha => out.extend(data.chunks_exact(2).map(|p| {
            let v = to_i32(p[0]);
            Pixel::new(v, v, v, to_i32(p[1]))
        })),
        ColorType::Rgb => out.extend(
            data.chunks_exact(3)
                .map(|p| Pixel::new(to_i32(p[0]), to_i32(p[1]), to_i32(p[2]), 255)),
        ),
        ColorType::Rgba => out.extend(
            data.chunks_exact(4)
                .map(|p| Pixel::new(to_i32(p[0]), to_i32(p[1]), to_i32(p[2]), to_i32(p[3]))),
        ),
        ColorType::Indexed => {
            return Err(DiffError::Unsupported("indexed color after expansion".into()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encode an RGBA8 image in memory
    fn png_bytes(width: u32, height: u32, pixel: impl Fn(u32, u32) -> [u8; 4]) -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let mut encoder = Encoder::new(&mut bytes, width, height);
            encoder.set_color(ColorType::Rgba);
            encoder.set_depth(BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            let mut data = Vec::with_capacity((width * height * 4) as usize);
            for y in 0..height {
                for x in 0..width {
                    data.extend(pixel(x, y));
                }
            }
            writer.write_image_data(&data).unwrap();
        }
        bytes
    }

    fn decode(bytes: &[u8]) -> (u32, u32, Vec<u8>) {
        let mut reader = Decoder::new(bytes).read_info().unwrap();
        let mut data = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut data).unwrap();
        data.truncate(info.buffer_size());
        (info.width, info.height, data)
    }

    fn pixel_at(data: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * width + x) * 4) as usize;
        [data[i], data[i + 1], data[i + 2], data[i + 3]]
    }

    const RED: [u8; 4] = [255, 0, 0, 255];

    #[test]
    fn test_identical_images_are_dimmed() {
        let image = png_bytes(4, 3, |_, _| [255, 255, 255, 255]);
        let mut out = Vec::new();
        let report = diff_streams(&image[..], &image[..], &mut out).unwrap();

        assert!(report.is_match());
        assert_eq!(report.total, 12);
        let (_, _, data) = decode(&out);
        for chunk in data.chunks(4) {
            assert_eq!(chunk, [191, 191, 191, 159]);
        }
    }

    #[test]
    fn test_single_pixel_difference() {
        let golden = png_bytes(5, 5, |_, _| [10, 20, 30, 255]);
        let candidate = png_bytes(5, 5, |x, y| {
            if (x, y) == (3, 1) {
                [11, 20, 30, 255]
            } else {
                [10, 20, 30, 255]
            }
        });
        let mut out = Vec::new();
        let report = diff_streams(&golden[..], &candidate[..], &mut out).unwrap();
        assert_eq!(report.mismatched, 1);

        let (width, _, data) = decode(&out);
        for y in 0..5 {
            for x in 0..5 {
                let is_red = pixel_at(&data, width, x, y) == RED;
                assert_eq!(is_red, (x, y) == (3, 1), "pixel {},{}", x, y);
            }
        }
    }

    #[test]
    fn test_smaller_candidate_pads_with_red() {
        let golden = png_bytes(10, 10, |_, _| [0, 128, 255, 255]);
        let candidate = png_bytes(8, 6, |_, _| [0, 128, 255, 255]);
        let mut out = Vec::new();
        let report = diff_streams(&golden[..], &candidate[..], &mut out).unwrap();

        assert_eq!((report.width, report.height), (10, 10));
        // 2 columns x 6 rows + 4 full rows
        assert_eq!(report.mismatched, 12 + 40);
        assert_eq!(report.total, 100);

        let (width, height, data) = decode(&out);
        assert_eq!((width, height), (10, 10));
        for y in 0..10 {
            for x in 0..10 {
                let expect_red = y >= 6 || x >= 8;
                assert_eq!(pixel_at(&data, width, x, y) == RED, expect_red, "pixel {},{}", x, y);
            }
        }
    }

    #[test]
    fn test_taller_candidate_counts_extra_rows() {
        let golden = png_bytes(3, 2, |_, _| [1, 2, 3, 255]);
        let candidate = png_bytes(3, 4, |_, _| [1, 2, 3, 255]);
        let report = diff_streams(&golden[..], &candidate[..], io::sink()).unwrap();
        assert_eq!(report.mismatched, 6);
        assert_eq!(report.total, 12);
    }

    #[test]
    fn test_rgb_and_rgba_inputs_compare_equal() {
        let rgba = png_bytes(2, 2, |_, _| [9, 8, 7, 255]);
        let mut rgb = Vec::new();
        {
            let mut encoder = Encoder::new(&mut rgb, 2, 2);
            encoder.set_color(ColorType::Rgb);
            encoder.set_depth(BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&[9u8, 8, 7].repeat(4)).unwrap();
        }
        let report = diff_streams(&rgba[..], &rgb[..], io::sink()).unwrap();
        assert!(report.is_match());
    }

    #[test]
    fn test_diff_into_borrowed_buffer_is_a_complete_png() {
        let image = png_bytes(3, 3, |x, _| [x as u8, 0, 0, 255]);
        let mut out = Vec::new();
        diff_streams(&image[..], &image[..], &mut out).unwrap();

        // IEND chunk type followed by its fixed CRC
        assert!(out.ends_with(&[0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82]));
        assert_eq!(out.windows(4).filter(|w| *w == b"IEND").count(), 1);
        let (width, height, _) = decode(&out);
        assert_eq!((width, height), (3, 3));
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(3, 200), "1.50%");
        assert_eq!(format_percent(0, 200), "0.00%");
        assert_eq!(format_percent(1, 3), "33.33%");
        assert_eq!(format_percent(0, 0), "0.00%");
    }
}
