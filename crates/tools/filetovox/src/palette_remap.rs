//! Snap a grid onto a user supplied palette image

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use voxel::palette::PaletteError;
use voxel::{Color, Palette, VoxelGrid};

/// Rewrites every voxel to its nearest entry of a fixed palette
#[derive(Debug, Clone)]
pub struct PaletteRemapper {
    path: PathBuf,
    palette: Palette,
}

impl PaletteRemapper {
    /// Load the palette from the pixels of an image file
    pub fn new(path: impl AsRef<Path>) -> Result<Self, PaletteError> {
        let path = path.as_ref().to_path_buf();
        let palette = Palette::from_image_file(&path)?;
        tracing::debug!(path = %path.display(), colors = palette.len(), "loaded palette");
        Ok(Self { path, palette })
    }

    pub fn from_palette(palette: Palette) -> Self {
        Self {
            path: PathBuf::new(),
            palette,
        }
    }

    /// Replace each voxel color with the nearest palette color
    ///
    /// Afterwards every voxel color is a member of [`PaletteRemapper::palette`].
    pub fn convert(&self, mut grid: VoxelGrid) -> VoxelGrid {
        let mut cache: HashMap<Color, Color> = HashMap::new();
        grid.map_colors(|c| *cache.entry(c).or_insert_with(|| self.palette.nearest(c)));
        grid
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
