//! Image stack converter: one image per layer

use super::{load_rgba, pixel_color};
use crate::options::ConversionOptions;
use crate::types::ConvertError;
use std::path::PathBuf;
use voxel::{Color, VoxelGrid};

/// Stacks images bottom to top, image `i` becoming layer `y = i`
#[derive(Debug, Clone)]
pub struct MultiImageConverter {
    pub paths: Vec<PathBuf>,
    pub color_file: Option<PathBuf>,
    pub excavate: bool,
}

impl MultiImageConverter {
    pub fn new(paths: Vec<PathBuf>, options: &ConversionOptions) -> Self {
        Self {
            paths,
            color_file: options.input_color_file.clone(),
            excavate: options.excavate,
        }
    }

    pub fn produce(&self) -> Result<VoxelGrid, ConvertError> {
        let color_image = match &self.color_file {
            Some(path) => Some(load_rgba(path)?),
            None => None,
        };

        let mut grid = VoxelGrid::new();
        for (layer, path) in self.paths.iter().enumerate() {
            let image = load_rgba(path)?;
            for (px, py, pixel) in image.enumerate_pixels() {
                let source = Color::from(pixel.0);
                if source.a == 0 {
                    continue;
                }
                let color = color_image
                    .as_ref()
                    .and_then(|img| pixel_color(img, px, py))
                    .unwrap_or(source.opaque());
                grid.set(px, layer as u32, py, color);
            }
        }

        if self.excavate {
            grid.excavate();
        }

        tracing::debug!(images = self.paths.len(), voxels = grid.len(), "stacked images");
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_layers_follow_order() {
        let dir = tempfile::tempdir().unwrap();
        let red = dir.path().join("red.png");
        let blue = dir.path().join("blue.png");
        RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255])).save(&red).unwrap();
        let mut top = RgbaImage::new(2, 2);
        top.put_pixel(1, 1, Rgba([0, 0, 255, 255]));
        top.save(&blue).unwrap();

        let converter = MultiImageConverter {
            paths: vec![blue.clone(), red.clone()],
            color_file: None,
            excavate: false,
        };
        let grid = converter.produce().unwrap();
        assert_eq!(grid.height(), 2);
        assert_eq!(grid.get(1, 0, 1), Some(Color::rgb(0, 0, 255)));
        assert_eq!(grid.get(0, 1, 0), Some(Color::rgb(255, 0, 0)));
        assert_eq!(grid.len(), 5);
    }

    #[test]
    fn test_unreadable_image_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.png");
        std::fs::write(&bogus, b"not a png").unwrap();

        let converter = MultiImageConverter {
            paths: vec![bogus],
            color_file: None,
            excavate: false,
        };
        assert!(matches!(converter.produce(), Err(ConvertError::Image { .. })));
    }
}
