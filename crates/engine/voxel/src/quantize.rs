//! Color quantization using the median cut algorithm
//!
//! Converters call [`quantize_grid`] to keep a grid within its color limit
//! before it reaches the writer. Buckets are split along the channel with
//! the largest range until the requested number of colors is reached, then
//! every voxel is snapped to the nearest bucket average.

use crate::color::Color;
use crate::grid::VoxelGrid;
use crate::palette::Palette;
use crate::MAX_PALETTE_COLORS;
use std::collections::{BTreeSet, HashMap};

/// Color bucket for median cut
#[derive(Debug, Clone, Default)]
struct ColorBucket {
    colors: Vec<Color>,
}

impl ColorBucket {
    fn len(&self) -> usize {
        self.colors.len()
    }

    fn average_color(&self) -> Color {
        if self.colors.is_empty() {
            return Color::BLACK;
        }

        let mut sum = [0u64; 3];
        for c in &self.colors {
            sum[0] += c.r as u64;
            sum[1] += c.g as u64;
            sum[2] += c.b as u64;
        }

        let n = self.colors.len() as u64;
        let avg = |s: u64| ((s + n / 2) / n) as u8;
        Color::rgb(avg(sum[0]), avg(sum[1]), avg(sum[2]))
    }

    /// Channel (0 = r, 1 = g, 2 = b) with the largest range
    fn largest_range_channel(&self) -> usize {
        let mut mins = [u8::MAX; 3];
        let mut maxs = [u8::MIN; 3];

        for c in &self.colors {
            for (i, v) in c.to_rgb_array().into_iter().enumerate() {
                mins[i] = mins[i].min(v);
                maxs[i] = maxs[i].max(v);
            }
        }

        let ranges = [
            maxs[0].saturating_sub(mins[0]),
            maxs[1].saturating_sub(mins[1]),
            maxs[2].saturating_sub(mins[2]),
        ];

        if ranges[0] >= ranges[1] && ranges[0] >= ranges[2] {
            0
        } else if ranges[1] >= ranges[2] {
            1
        } else {
            2
        }
    }

    fn has_spread(&self) -> bool {
        self.colors
            .first()
            .is_some_and(|first| self.colors.iter().any(|c| c.to_rgb_array() != first.to_rgb_array()))
    }

    /// Split at the median of the largest range channel
    fn split(&mut self) -> Option<ColorBucket> {
        if self.colors.len() < 2 || !self.has_spread() {
            return None;
        }

        let channel = self.largest_range_channel();
        self.colors
            .sort_by_key(|c| (c.to_rgb_array()[channel], *c));

        let mid = self.colors.len() / 2;
        let right = self.colors.split_off(mid);
        Some(ColorBucket { colors: right })
    }
}

/// Reduce `colors` (with multiplicity) to at most `max_colors` representative colors
pub fn median_cut(colors: &[Color], max_colors: usize) -> Palette {
    if colors.is_empty() {
        return Palette::new();
    }

    let max_colors = max_colors.clamp(1, MAX_PALETTE_COLORS);

    let distinct: BTreeSet<Color> = colors.iter().map(|c| c.opaque()).collect();
    if distinct.len() <= max_colors {
        return Palette::from_colors(colors.iter().map(|c| c.opaque()));
    }

    let mut buckets = vec![ColorBucket {
        colors: colors.iter().map(|c| c.opaque()).collect(),
    }];

    while buckets.len() < max_colors {
        let Some(largest) = buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| b.has_spread())
            .max_by_key(|(i, b)| (b.len(), std::cmp::Reverse(*i)))
            .map(|(i, _)| i)
        else {
            break;
        };

        match buckets[largest].split() {
            Some(right) => buckets.push(right),
            None => break,
        }
    }

    Palette::from_colors(buckets.iter().map(ColorBucket::average_color))
}

/// Snap every voxel of `grid` into at most `max_colors` colors
///
/// Returns the palette used, or `None` when the grid already fits.
pub fn quantize_grid(grid: &mut VoxelGrid, max_colors: usize) -> Option<Palette> {
    let max_colors = max_colors.clamp(1, MAX_PALETTE_COLORS);
    if grid.color_count() <= max_colors {
        return None;
    }

    let samples: Vec<Color> = grid.iter().map(|(_, c)| c).collect();
    let palette = median_cut(&samples, max_colors);

    let mut cache: HashMap<Color, Color> = HashMap::new();
    grid.map_colors(|c| *cache.entry(c).or_insert_with(|| palette.nearest(c)));

    tracing::debug!(
        before = samples.len(),
        colors = palette.len(),
        "quantized grid colors"
    );
    Some(palette)
}
