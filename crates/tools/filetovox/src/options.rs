//! Conversion options and their validation

use crate::format::IMAGE_EXTENSIONS;
use crate::log::LogSink;
use crate::types::ConfigError;
use std::path::{Path, PathBuf};
use voxel::{RunContext, MAX_WORLD_LENGTH};

/// Container suffix every output path ends with
pub const VOX_EXTENSION: &str = ".vox";

/// Default mesh2vox voxel resolution
pub const DEFAULT_MESH_RESOLUTION: i32 = 80;

/// Every parameter of one conversion request
///
/// Built once by a front end and never mutated by the pipeline. Numeric
/// fields keep the signed types users type in so that out-of-range values
/// reach [`ConversionOptions::validate`] instead of failing to parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOptions {
    /// Input path, a directory, or a `;`-separated list of image paths
    pub input_path: Option<String>,
    pub output_path: Option<String>,
    /// Image whose pixels color a heightmap
    pub input_color_file: Option<PathBuf>,
    /// Palette image the output colors are snapped to
    pub input_palette_file: Option<PathBuf>,

    /// Remove voxels with no face touching air
    pub excavate: bool,
    /// Keep the source pixel colors on heightmaps
    pub color: bool,
    pub disable_quantization: bool,
    pub debug: bool,

    /// Longest point cloud axis, in voxels
    pub grid_size: f32,
    /// Heightmap layers (1 = flat)
    pub heightmap: i32,
    /// Maximum distinct colors a converter may emit
    pub color_limit: i32,
    /// Edge length of the models the writer emits
    pub chunk_size: i32,

    pub mesh_resolution: i32,
    pub mesh2vox_script: Option<PathBuf>,
    pub mesh2vox_python: Option<String>,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            input_path: None,
            output_path: None,
            input_color_file: None,
            input_palette_file: None,
            excavate: false,
            color: false,
            disable_quantization: false,
            debug: false,
            grid_size: 10.0,
            heightmap: 1,
            color_limit: 256,
            chunk_size: 128,
            mesh_resolution: DEFAULT_MESH_RESOLUTION,
            mesh2vox_script: None,
            mesh2vox_python: None,
        }
    }
}

/// Which dispatch branch an input string selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSelection {
    /// One file
    Single(PathBuf),
    /// Several `;`-separated paths, in the given order
    Multiple(Vec<PathBuf>),
    /// An existing directory
    Directory(PathBuf),
}

impl ConversionOptions {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input_path: Some(input.into()),
            output_path: Some(output.into()),
            ..Default::default()
        }
    }

    /// Check every option before any file is opened
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_paths()?;

        if !(10.0..=MAX_WORLD_LENGTH as f32).contains(&self.grid_size) {
            return Err(ConfigError::GridSize {
                value: self.grid_size,
                max: MAX_WORLD_LENGTH,
            });
        }
        if self.heightmap < 1 {
            return Err(ConfigError::HeightMap(self.heightmap));
        }
        if !(0..=256).contains(&self.color_limit) {
            return Err(ConfigError::ColorLimit(self.color_limit));
        }
        if self.chunk_size <= 10 || self.chunk_size > 256 {
            return Err(ConfigError::ChunkSize(self.chunk_size));
        }
        Ok(())
    }

    /// The subset of checks the mesh2vox branch needs
    pub fn validate_paths(&self) -> Result<(), ConfigError> {
        if self.input().is_none() {
            return Err(ConfigError::MissingInput);
        }
        if self.output().is_none() {
            return Err(ConfigError::MissingOutput);
        }
        Ok(())
    }

    /// Non-empty input string
    pub fn input(&self) -> Option<&str> {
        self.input_path.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Non-empty output string
    pub fn output(&self) -> Option<&str> {
        self.output_path.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Resolve the input string into a dispatch branch
    pub fn input_selection(&self) -> Option<InputSelection> {
        let input = self.input()?;

        let parts: Vec<&str> = input
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if parts.len() > 1 {
            return Some(InputSelection::Multiple(
                parts.into_iter().map(PathBuf::from).collect(),
            ));
        }

        let path = PathBuf::from(parts.first().copied().unwrap_or(input));
        if path.is_dir() {
            Some(InputSelection::Directory(path))
        } else {
            Some(InputSelection::Single(path))
        }
    }

    /// Normalized output path (see [`format_output_destination`])
    pub fn output_destination(&self) -> Option<PathBuf> {
        self.output().map(|o| PathBuf::from(format_output_destination(o)))
    }

    /// Per-run settings handed to converters and the writer
    pub fn run_context(&self) -> RunContext {
        RunContext::new(self.chunk_size.clamp(1, 256) as u32)
            .with_debug(self.debug)
            .with_disable_quantization(self.disable_quantization)
    }

    /// Effective color limit: 0 and values above 255 mean "as many as the container holds"
    pub fn effective_color_limit(&self) -> usize {
        match self.color_limit {
            n if n <= 0 => voxel::MAX_PALETTE_COLORS,
            n => (n as usize).min(voxel::MAX_PALETTE_COLORS),
        }
    }

    /// Log the options that differ from their defaults
    pub fn display_arguments(&self, log: &dyn LogSink) {
        log.log(&format!("[INFO] FileToVox v{}", env!("CARGO_PKG_VERSION")));

        if let Some(input) = &self.input_path {
            log.log(&format!("[INFO] Specified input path: {}", input));
        }
        if let Some(output) = &self.output_path {
            log.log(&format!("[INFO] Specified output path: {}", output));
        }
        if let Some(color_file) = &self.input_color_file {
            log.log(&format!("[INFO] Specified input color file: {}", color_file.display()));
        }
        if let Some(palette) = &self.input_palette_file {
            log.log(&format!("[INFO] Specified palette file: {}", palette.display()));
        }
        if self.color_limit != 256 {
            log.log(&format!("[INFO] Specified color limit: {}", self.color_limit));
        }
        if self.grid_size != 10.0 {
            log.log(&format!("[INFO] Specified grid size: {}", self.grid_size));
        }
        if self.chunk_size != 128 {
            log.log(&format!("[INFO] Specified chunk size: {}", self.chunk_size));
        }
        if self.excavate {
            log.log("[INFO] Enabled option: excavate");
        }
        if self.color {
            log.log("[INFO] Enabled option: color");
        }
        if self.heightmap != 1 {
            log.log(&format!("[INFO] Enabled option: heightmap (value={})", self.heightmap));
        }
        if self.debug {
            log.log("[INFO] Enabled option: debug");
        }
        if self.disable_quantization {
            log.log("[INFO] Enabled option: disable-quantization");
        }
        if let Some(destination) = self.output_destination() {
            log.log(&format!(
                "[INFO] Specified output path: {}",
                absolute(&destination).display()
            ));
        }
    }
}

/// Strip every trailing `.vox` (any case) and append exactly one
///
/// Idempotent: formatting an already formatted path returns it unchanged.
pub fn format_output_destination(output: &str) -> String {
    let mut stem = output;
    while stem.len() >= VOX_EXTENSION.len()
        && stem.is_char_boundary(stem.len() - VOX_EXTENSION.len())
        && stem[stem.len() - VOX_EXTENSION.len()..].eq_ignore_ascii_case(VOX_EXTENSION)
    {
        stem = &stem[..stem.len() - VOX_EXTENSION.len()];
    }
    format!("{}{}", stem, VOX_EXTENSION)
}

/// Default output for an input: same path with a `.vox` extension
pub fn default_output_for(input: &Path) -> PathBuf {
    input.with_extension("vox")
}

/// True when the path has one of the image extensions multi-image input accepts
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Absolute form of `path` without touching the filesystem
pub fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
