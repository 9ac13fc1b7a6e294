/// One RGBA pixel.
///
/// Channels are kept as `i32` so blending never wraps; values are only
/// clamped to `0..=255` when a row is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Pixel {
    pub r: i32,
    pub g: i32,
    pub b: i32,
    pub a: i32,
}

impl Pixel {
    /// Padding for the part of the canvas an image does not cover
    pub const EMPTY: Pixel = Pixel::new(0, 0, 0, 0);
    /// Marks a mismatch in the diff image
    pub const RED: Pixel = Pixel::new(255, 0, 0, 255);
    /// Overlay that dims unchanged pixels
    pub const TRANS_BLACK: Pixel = Pixel::new(1, 1, 1, 128);

    pub const fn new(r: i32, g: i32, b: i32, a: i32) -> Self {
        Self { r, g, b, a }
    }

    /// Blend every channel with `other`, see [`blend`]
    pub fn mix_with(self, other: Pixel) -> Pixel {
        Pixel {
            r: blend(self.r, other.r),
            g: blend(self.g, other.g),
            b: blend(self.b, other.b),
            a: blend(self.a, other.a),
        }
    }

    /// Rendering of a pixel both images agree on
    pub fn dimmed(self) -> Pixel {
        self.mix_with(Pixel::TRANS_BLACK)
    }

    /// Append as 8-bit RGBA, clamping each channel
    pub fn write_rgba8(self, out: &mut Vec<u8>) {
        out.extend([
            clamp_channel(self.r),
            clamp_channel(self.g),
            clamp_channel(self.b),
            clamp_channel(self.a),
        ]);
    }
}

/// `a*0.5 - (|a-b| div 2)*(-0.5)`, truncated. The halving of `|a-b|` is integer division.
pub fn blend(a: i32, b: i32) -> i32 {
    ((a as f32 * 0.5) - (((a - b).abs() / 2) as f32 * -0.5)) as i32
}

fn clamp_channel(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}
