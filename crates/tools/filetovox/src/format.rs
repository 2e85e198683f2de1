//! Input format classification

use std::fmt;
use std::path::Path;

/// Extensions the image heightmap and multi-image converters accept
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "tif", "tiff"];

/// Mesh formats handled by the external mesh2vox tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshFormat {
    Glb,
    Gltf,
    Obj,
    Fbx,
    Stl,
    Dae,
    ThreeDs,
}

impl MeshFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        let format = match ext {
            "glb" => MeshFormat::Glb,
            "gltf" => MeshFormat::Gltf,
            "obj" => MeshFormat::Obj,
            "fbx" => MeshFormat::Fbx,
            "stl" => MeshFormat::Stl,
            "dae" => MeshFormat::Dae,
            "3ds" => MeshFormat::ThreeDs,
            _ => return None,
        };
        Some(format)
    }

    pub fn name(self) -> &'static str {
        match self {
            MeshFormat::Glb => "GLB",
            MeshFormat::Gltf => "GLTF",
            MeshFormat::Obj => "OBJ",
            MeshFormat::Fbx => "FBX",
            MeshFormat::Stl => "STL",
            MeshFormat::Dae => "DAE",
            MeshFormat::ThreeDs => "3DS",
        }
    }

    /// Formats the in-process pipeline used to voxelize itself
    pub fn is_legacy(self) -> bool {
        matches!(self, MeshFormat::Obj | MeshFormat::Fbx)
    }
}

/// Closed set of inputs the pipeline knows how to route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputFormat {
    Directory,
    Asc,
    Binvox,
    Csv,
    Ply,
    Png,
    Tif,
    Qubicle,
    Schematic,
    Xyz,
    Vox,
    Mesh(MeshFormat),
    Unsupported,
}

impl InputFormat {
    /// Tag a path by directory status, then by case-insensitive extension
    pub fn classify(path: &Path) -> Self {
        if path.is_dir() {
            return InputFormat::Directory;
        }

        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => return InputFormat::Unsupported,
        };

        match ext.as_str() {
            "asc" => InputFormat::Asc,
            "binvox" => InputFormat::Binvox,
            "csv" => InputFormat::Csv,
            "ply" => InputFormat::Ply,
            "png" => InputFormat::Png,
            "tif" | "tiff" => InputFormat::Tif,
            "qb" => InputFormat::Qubicle,
            "schematic" => InputFormat::Schematic,
            "xyz" => InputFormat::Xyz,
            "vox" => InputFormat::Vox,
            other => MeshFormat::from_extension(other)
                .map(InputFormat::Mesh)
                .unwrap_or(InputFormat::Unsupported),
        }
    }

    /// True for inputs that must go through the external mesh tool
    pub fn requires_delegation(self) -> bool {
        matches!(self, InputFormat::Mesh(_))
    }

    pub fn is_image(self) -> bool {
        matches!(self, InputFormat::Png | InputFormat::Tif)
    }

    pub fn is_legacy_mesh(self) -> bool {
        matches!(self, InputFormat::Mesh(m) if m.is_legacy())
    }

    /// Human label shown by `filetovox detect`
    pub fn describe(self) -> String {
        match self {
            InputFormat::Directory => "Folder (multiple PNG)".to_string(),
            InputFormat::Asc => "ASC (ASCII Grid)".to_string(),
            InputFormat::Binvox => "Binvox".to_string(),
            InputFormat::Csv => "CSV (Point Cloud)".to_string(),
            InputFormat::Ply => "PLY (Point Cloud)".to_string(),
            InputFormat::Png => "PNG (Image/Heightmap)".to_string(),
            InputFormat::Tif => "TIFF (Image/Heightmap)".to_string(),
            InputFormat::Qubicle => "QB (Qubicle)".to_string(),
            InputFormat::Schematic => "Schematic (Minecraft)".to_string(),
            InputFormat::Xyz => "XYZ (Point Cloud)".to_string(),
            InputFormat::Vox => "VOX (MagicaVoxel)".to_string(),
            InputFormat::Mesh(m) => format!("{} (3D Mesh via mesh2vox)", m.name()),
            InputFormat::Unsupported => "Unknown format".to_string(),
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
