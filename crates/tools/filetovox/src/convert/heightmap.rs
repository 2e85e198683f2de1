//! PNG / TIFF heightmap converter

use super::{load_rgba, pixel_color};
use crate::types::ConvertError;
use std::path::PathBuf;
use voxel::{Color, VoxelGrid};

/// Turns one image into a flat layer or a luminance heightmap
///
/// Pixel `(px, py)` maps to column `(x = px, z = py)`. With `heightmap == 1`
/// every opaque pixel is a single voxel; otherwise the column rises to
/// `max(1, round(luma / 255 * heightmap))`.
#[derive(Debug, Clone)]
pub struct ImageConverter {
    pub path: PathBuf,
    pub color_file: Option<PathBuf>,
    pub heightmap: u32,
    pub excavate: bool,
    pub color: bool,
    pub color_limit: usize,
}

impl ImageConverter {
    pub fn produce(&self) -> Result<VoxelGrid, ConvertError> {
        let image = load_rgba(&self.path)?;
        let color_image = match &self.color_file {
            Some(path) => Some(load_rgba(path)?),
            None => None,
        };

        let layers = self.heightmap.max(1);
        let mut grid = VoxelGrid::new();

        for (px, py, pixel) in image.enumerate_pixels() {
            let source = Color::from(pixel.0);
            if source.a == 0 {
                continue;
            }

            let luma = source.luma();
            let height = column_height(luma, layers);
            let color = color_image
                .as_ref()
                .and_then(|img| pixel_color(img, px, py))
                .unwrap_or_else(|| {
                    if self.color || layers == 1 {
                        source.opaque()
                    } else {
                        Color::gray(luma)
                    }
                });

            for y in 0..height {
                grid.set(px, y, py, color);
            }
        }

        if self.excavate {
            grid.excavate();
        }

        tracing::debug!(
            path = %self.path.display(),
            voxels = grid.len(),
            layers,
            "converted image"
        );
        Ok(grid)
    }
}

fn column_height(luma: u8, layers: u32) -> u32 {
    if layers == 1 {
        return 1;
    }
    let scaled = (luma as f32 / 255.0 * layers as f32).round() as u32;
    scaled.max(1)
}
