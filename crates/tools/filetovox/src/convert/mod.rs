//! Format converters
//!
//! Every supported input format has a converter that reads one source and
//! produces a [`VoxelGrid`]. [`Converter`] is the closed set of them; the
//! dispatcher builds one from [`ConversionOptions`] carrying only the fields
//! that format needs.

mod asc;
mod binvox;
mod heightmap;
mod multi_image;
mod point_cloud;
mod qubicle;
mod schematic;
mod vox;

pub use self::asc::AscConverter;
pub use self::binvox::BinvoxConverter;
pub use self::heightmap::ImageConverter;
pub use self::multi_image::MultiImageConverter;
pub use self::point_cloud::{PointCloudConverter, PointCloudFormat};
pub use self::qubicle::QubicleConverter;
pub use self::schematic::SchematicConverter;
pub use self::vox::VoxConverter;

use crate::format::InputFormat;
use crate::options::{is_image_path, ConversionOptions, InputSelection};
use crate::types::{ConfigError, ConversionError, ConvertError};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use voxel::{quantize_grid, Color, RunContext, VoxelGrid, MAX_PALETTE_COLORS};

/// One configured converter per supported input format
#[derive(Debug, Clone)]
pub enum Converter {
    Asc(AscConverter),
    Binvox(BinvoxConverter),
    Csv(PointCloudConverter),
    Ply(PointCloudConverter),
    Xyz(PointCloudConverter),
    Image(ImageConverter),
    Qubicle(QubicleConverter),
    Schematic(SchematicConverter),
    Vox(VoxConverter),
    MultipleImage(MultiImageConverter),
}

impl Converter {
    /// Pick the converter for the configured input
    ///
    /// Returns `Ok(None)` when the input is a file whose extension no
    /// in-process converter handles.
    pub fn dispatch(options: &ConversionOptions) -> Result<Option<Converter>, ConversionError> {
        let selection = options.input_selection().ok_or(ConfigError::MissingInput)?;

        match selection {
            InputSelection::Directory(dir) => {
                let images = collect_images(&dir)?;
                if images.is_empty() {
                    return Err(ConversionError::NoImageFiles(dir));
                }
                tracing::debug!(dir = %dir.display(), count = images.len(), "collected images");
                Ok(Some(Converter::MultipleImage(MultiImageConverter::new(
                    images, options,
                ))))
            }
            InputSelection::Multiple(paths) => {
                let not_images: Vec<String> = paths
                    .iter()
                    .filter(|p| !is_image_path(p))
                    .map(|p| p.display().to_string())
                    .collect();
                if !not_images.is_empty() {
                    return Err(ConversionError::NonImageInputs(not_images));
                }
                if let Some(missing) = paths.iter().find(|p| !p.exists()) {
                    return Err(ConversionError::InputNotFound(missing.clone()));
                }
                Ok(Some(Converter::MultipleImage(MultiImageConverter::new(
                    paths, options,
                ))))
            }
            InputSelection::Single(path) => {
                if !path.exists() {
                    return Err(ConversionError::InputNotFound(path));
                }
                Self::for_file(path, options)
            }
        }
    }

    fn for_file(path: PathBuf, options: &ConversionOptions) -> Result<Option<Converter>, ConversionError> {
        let color_limit = options.effective_color_limit();

        let converter = match InputFormat::classify(&path) {
            InputFormat::Asc => Converter::Asc(AscConverter::new(path)),
            InputFormat::Binvox => Converter::Binvox(BinvoxConverter::new(path)),
            InputFormat::Csv => Converter::Csv(PointCloudConverter::new(
                path,
                PointCloudFormat::Csv,
                options.grid_size,
                color_limit,
            )),
            InputFormat::Ply => Converter::Ply(PointCloudConverter::new(
                path,
                PointCloudFormat::Ply,
                options.grid_size,
                color_limit,
            )),
            InputFormat::Xyz => Converter::Xyz(PointCloudConverter::new(
                path,
                PointCloudFormat::Xyz,
                options.grid_size,
                color_limit,
            )),
            InputFormat::Png | InputFormat::Tif => Converter::Image(ImageConverter {
                path,
                color_file: options.input_color_file.clone(),
                heightmap: options.heightmap.max(1) as u32,
                excavate: options.excavate,
                color: options.color,
                color_limit,
            }),
            InputFormat::Qubicle => Converter::Qubicle(QubicleConverter::new(path)),
            InputFormat::Schematic => {
                Converter::Schematic(SchematicConverter::new(path, options.excavate))
            }
            InputFormat::Vox => Converter::Vox(VoxConverter::new(path)),
            InputFormat::Mesh(mesh) if mesh.is_legacy() => {
                return Err(ConversionError::MeshNoLongerSupported(
                    mesh.name().to_ascii_lowercase(),
                ))
            }
            InputFormat::Mesh(_) | InputFormat::Directory | InputFormat::Unsupported => {
                return Ok(None)
            }
        };
        Ok(Some(converter))
    }

    /// Short name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            Converter::Asc(_) => "ASC",
            Converter::Binvox(_) => "BINVOX",
            Converter::Csv(_) => "CSV",
            Converter::Ply(_) => "PLY",
            Converter::Xyz(_) => "XYZ",
            Converter::Image(_) => "Image",
            Converter::Qubicle(_) => "Qubicle",
            Converter::Schematic(_) => "Schematic",
            Converter::Vox(_) => "VOX",
            Converter::MultipleImage(_) => "Multiple images",
        }
    }

    /// Read the source and produce a grid within the color limit
    pub fn produce(&self, ctx: &RunContext) -> Result<VoxelGrid, ConvertError> {
        let mut grid = match self {
            Converter::Asc(c) => c.produce()?,
            Converter::Binvox(c) => c.produce()?,
            Converter::Csv(c) | Converter::Ply(c) | Converter::Xyz(c) => c.produce()?,
            Converter::Image(c) => c.produce()?,
            Converter::Qubicle(c) => c.produce()?,
            Converter::Schematic(c) => c.produce()?,
            Converter::Vox(c) => c.produce()?,
            Converter::MultipleImage(c) => c.produce()?,
        };

        if !ctx.disable_quantization {
            quantize_grid(&mut grid, self.color_limit());
        }
        Ok(grid)
    }

    fn color_limit(&self) -> usize {
        match self {
            Converter::Csv(c) | Converter::Ply(c) | Converter::Xyz(c) => c.color_limit,
            Converter::Image(c) => c.color_limit,
            _ => MAX_PALETTE_COLORS,
        }
    }
}

/// Recursively collect image files under `dir`, sorted by path
fn collect_images(dir: &Path) -> Result<Vec<PathBuf>, ConversionError> {
    let mut images = Vec::new();
    traverse_directory(dir, &mut images)
        .map_err(|e| ConvertError::io(dir, e))?;
    images.sort();
    Ok(images)
}

fn traverse_directory(dir: &Path, images: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            traverse_directory(&path, images)?;
        } else if is_image_path(&path) {
            images.push(path);
        }
    }
    Ok(())
}

/// Decode an image file to RGBA8
pub(crate) fn load_rgba(path: &Path) -> Result<RgbaImage, ConvertError> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|source| ConvertError::Image {
            path: path.to_path_buf(),
            source,
        })
}

/// Opaque color of the pixel at `(x, y)`, when inside the image and not transparent
pub(crate) fn pixel_color(image: &RgbaImage, x: u32, y: u32) -> Option<Color> {
    if x >= image.width() || y >= image.height() {
        return None;
    }
    let color = Color::from(image.get_pixel(x, y).0);
    (color.a > 0).then(|| color.opaque())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_images_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        for name in ["b.png", "a.PNG", "notes.txt", "sub/c.tif"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let images = collect_images(dir.path()).unwrap();
        let names: Vec<String> = images
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["a.PNG", "b.png", "sub/c.tif"]);
    }

    #[test]
    fn test_dispatch_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.txt");
        std::fs::write(&input, "hello").unwrap();

        let options = ConversionOptions::new(input.to_str().unwrap(), "out.vox");
        assert!(Converter::dispatch(&options).unwrap().is_none());
    }

    #[test]
    fn test_dispatch_legacy_mesh() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("model.OBJ");
        std::fs::write(&input, "v 0 0 0").unwrap();

        let options = ConversionOptions::new(input.to_str().unwrap(), "out.vox");
        let err = Converter::dispatch(&options).unwrap_err();
        assert!(matches!(err, ConversionError::MeshNoLongerSupported(_)));
        assert!(err.to_string().contains("mesh2vox"));
    }

    #[test]
    fn test_dispatch_missing_file() {
        let options = ConversionOptions::new("/definitely/not/here.png", "out.vox");
        assert!(matches!(
            Converter::dispatch(&options),
            Err(ConversionError::InputNotFound(_))
        ));
    }

    #[test]
    fn test_dispatch_fields() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("points.csv");
        std::fs::write(&input, "0,0,0\n").unwrap();

        let options = ConversionOptions {
            grid_size: 64.0,
            color_limit: 0,
            ..ConversionOptions::new(input.to_str().unwrap(), "out.vox")
        };
        match Converter::dispatch(&options).unwrap() {
            Some(Converter::Csv(c)) => {
                assert_eq!(c.grid_size, 64.0);
                assert_eq!(c.color_limit, MAX_PALETTE_COLORS);
            }
            other => panic!("expected CSV converter, got {:?}", other),
        }
    }
}
