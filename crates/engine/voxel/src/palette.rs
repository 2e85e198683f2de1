//! Ordered color palettes
//!
//! A palette file is an ordinary image: its pixels are read row by row and
//! every new opaque color becomes the next palette entry, up to
//! [`MAX_PALETTE_COLORS`]. Any PNG swatch strip exported from MagicaVoxel
//! (256×1) works.

use crate::color::Color;
use crate::MAX_PALETTE_COLORS;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Palette loading errors
#[derive(Debug, Error)]
pub enum PaletteError {
    #[error("Failed to read palette image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Palette image contains no opaque pixels")]
    Empty,
}

/// Ordered list of distinct colors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<Color>,
}

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a palette from colors, keeping first occurrences in order
    ///
    /// Colors past [`MAX_PALETTE_COLORS`] distinct entries are dropped.
    pub fn from_colors<I>(colors: I) -> Self
    where
        I: IntoIterator<Item = Color>,
    {
        let mut palette = Self::new();
        for color in colors {
            if !palette.push(color) && palette.is_full() {
                break;
            }
        }
        palette
    }

    /// Load a palette from the pixels of an image file
    pub fn from_image_file(path: &Path) -> Result<Self, PaletteError> {
        let image = image::open(path)?.to_rgba8();
        let pixels = image
            .pixels()
            .map(|p| Color::from(p.0))
            .filter(|c| c.a > 0)
            .map(Color::opaque);

        let palette = Self::from_colors(pixels);
        if palette.is_empty() {
            return Err(PaletteError::Empty);
        }

        tracing::debug!(path = %path.display(), colors = palette.len(), "loaded palette image");
        Ok(palette)
    }

    /// Append a color if it is new and there is room; returns whether it was added
    pub fn push(&mut self, color: Color) -> bool {
        if self.is_full() || self.colors.contains(&color) {
            return false;
        }
        self.colors.push(color);
        true
    }

    pub fn is_full(&self) -> bool {
        self.colors.len() >= MAX_PALETTE_COLORS
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    pub fn get(&self, index: usize) -> Option<Color> {
        self.colors.get(index).copied()
    }

    pub fn contains(&self, color: Color) -> bool {
        self.colors.contains(&color)
    }

    pub fn index_of(&self, color: Color) -> Option<usize> {
        self.colors.iter().position(|c| *c == color)
    }

    /// Index of the closest entry in RGB space; ties go to the lower index
    pub fn nearest_index(&self, color: Color) -> Option<usize> {
        self.colors
            .iter()
            .enumerate()
            .min_by_key(|(i, c)| (c.distance_sq(color), *i))
            .map(|(i, _)| i)
    }

    /// Closest palette entry, or the color itself for an empty palette
    pub fn nearest(&self, color: Color) -> Color {
        self.nearest_index(color)
            .map(|i| self.colors[i])
            .unwrap_or(color)
    }

    /// Distinct colors as a set, for membership checks on large grids
    pub fn color_set(&self) -> HashSet<Color> {
        self.colors.iter().copied().collect()
    }
}
