//! Dominant-color extraction by median cut.
//!
//! The image is downsampled first so the cost does not depend on the source
//! resolution. Mostly transparent pixels are ignored.

use image::DynamicImage;
use serde::Serialize;

/// Default number of swatches.
pub const DEFAULT_PALETTE_COLORS: usize = 32;

/// Longer edge the image is reduced to before sampling.
const SAMPLE_EDGE: u32 = 256;

/// Pixels with alpha below this are skipped.
const MIN_ALPHA: u8 = 125;

/// A palette entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Swatch {
    pub rgb: [u8; 3],
    /// Number of sampled pixels this swatch stands for.
    pub population: u32,
}

impl Swatch {
    /// `#rrggbb`
    pub fn hex(&self) -> String {
        let [r, g, b] = self.rgb;
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

struct ColorBox {
    pixels: Vec<[u8; 3]>,
}

impl ColorBox {
    /// Widest channel and its range.
    fn widest_channel(&self) -> (usize, u8) {
        (0..3)
            .map(|c| {
                let (min, max) = self
                    .pixels
                    .iter()
                    .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[c]), hi.max(p[c])));
                (c, max.saturating_sub(min))
            })
            .max_by_key(|&(_, range)| range)
            .unwrap_or((0, 0))
    }

    fn can_split(&self) -> bool {
        self.pixels.len() > 1 && self.widest_channel().1 > 0
    }

    fn split(mut self) -> (ColorBox, ColorBox) {
        let (channel, _) = self.widest_channel();
        self.pixels.sort_unstable_by_key(|p| p[channel]);
        // Cut on a value boundary near the median so equal colors stay together.
        let pivot = self.pixels[self.pixels.len() / 2][channel];
        let above = self.pixels.partition_point(|p| p[channel] <= pivot);
        let at = if above < self.pixels.len() {
            above
        } else {
            self.pixels.partition_point(|p| p[channel] < pivot)
        };
        let upper = self.pixels.split_off(at);
        (self, ColorBox { pixels: upper })
    }

    fn swatch(&self) -> Swatch {
        let n = self.pixels.len() as u64;
        let mut sum = [0u64; 3];
        for p in &self.pixels {
            for c in 0..3 {
                sum[c] += u64::from(p[c]);
            }
        }
        Swatch {
            rgb: sum.map(|s| ((s + n / 2) / n.max(1)) as u8),
            population: self.pixels.len() as u32,
        }
    }
}

/// Extract up to `max_colors` dominant colors, most common first.
///
/// Returns an empty palette for fully transparent or empty images.
pub fn generate_palette(image: &DynamicImage, max_colors: usize) -> Vec<Swatch> {
    if max_colors == 0 || image.width() == 0 || image.height() == 0 {
        return Vec::new();
    }
    let sample = if image.width().max(image.height()) > SAMPLE_EDGE {
        image.thumbnail(SAMPLE_EDGE, SAMPLE_EDGE)
    } else {
        image.clone()
    };

    let pixels: Vec<[u8; 3]> = sample
        .to_rgba8()
        .pixels()
        .filter(|p| p.0[3] >= MIN_ALPHA)
        .map(|p| [p.0[0], p.0[1], p.0[2]])
        .collect();
    if pixels.is_empty() {
        return Vec::new();
    }

    let mut boxes = vec![ColorBox { pixels }];
    while boxes.len() < max_colors {
        // Split the most populous box that still has color spread.
        let Some(index) = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.can_split())
            .max_by_key(|(_, b)| b.pixels.len())
            .map(|(i, _)| i)
        else {
            break;
        };
        let (lower, upper) = boxes.swap_remove(index).split();
        boxes.push(lower);
        boxes.push(upper);
    }

    let mut swatches: Vec<Swatch> = boxes.iter().map(ColorBox::swatch).collect();
    swatches.sort_by(|a, b| b.population.cmp(&a.population).then(a.rgb.cmp(&b.rgb)));
    swatches
}
