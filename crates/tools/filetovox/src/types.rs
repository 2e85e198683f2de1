//! Error and outcome types for the conversion pipeline
//!
//! The taxonomy follows the stages of a run:
//!
//! 1. [`ConfigError`] - option checks, before any file is touched
//! 2. [`ConversionError`] - input resolution, codec, bounds and write failures
//! 3. [`MeshError`] - the external mesh2vox process
//!
//! Cancellation is not an error: it is a [`ConversionOutcome`] of its own.

use std::path::PathBuf;
use thiserror::Error;
use voxel::{VoxError, MAX_WORLD_HEIGHT, MAX_WORLD_LENGTH, MAX_WORLD_WIDTH};

/// Invalid conversion options
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("[ERROR] Missing required option: --input")]
    MissingInput,

    #[error("[ERROR] Missing required option: --output")]
    MissingOutput,

    #[error("[ERROR] --grid-size argument must be greater than 10 and smaller than {max} (got {value})")]
    GridSize { value: f32, max: u32 },

    #[error("[ERROR] --heightmap argument must be positive (got {0})")]
    HeightMap(i32),

    #[error("[ERROR] --color-limit argument must be between 0 and 256 (got {0})")]
    ColorLimit(i32),

    #[error("[ERROR] --chunk-size argument must be between 10 and 256 (got {0})")]
    ChunkSize(i32),
}

/// Format-specific codec failures raised while producing a grid
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Unsupported {format} variant in {}: {message}", path.display())]
    Unsupported {
        format: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error(transparent)]
    Vox(#[from] VoxError),
}

impl ConvertError {
    pub fn parse(path: &std::path::Path, message: impl Into<String>) -> Self {
        ConvertError::Parse {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Failures of the in-process pipeline
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("[ERROR] File not found at: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("[ERROR] Unsupported file extension: {0}")]
    UnsupportedExtension(String),

    #[error("[ERROR] Voxelization of 3D models is no longer done in FileToVox but with mesh2vox ({0}). Configure the mesh2vox script and convert the mesh through it")]
    MeshNoLongerSupported(String),

    #[error("[ERROR] No image files found in: {}", .0.display())]
    NoImageFiles(PathBuf),

    #[error("[ERROR] Multiple inputs must all be images (.png, .tif); not images: {}", .0.join(", "))]
    NonImageInputs(Vec<String>),

    #[error("[ERROR] {0}")]
    Convert(#[from] ConvertError),

    #[error("[ERROR] Model is too big ({width}x{length}x{height})! MagicaVoxel can't support model bigger than {max_width}x{max_length}x{max_height}")]
    GridTooLarge {
        width: u32,
        length: u32,
        height: u32,
        max_width: u32,
        max_length: u32,
        max_height: u32,
    },

    #[error("[ERROR] Failed to load palette: {0}")]
    Palette(#[from] voxel::palette::PaletteError),

    #[error("[ERROR] Failed to write output: {0}")]
    Write(#[source] VoxError),
}

impl ConversionError {
    pub fn grid_too_large(width: u32, length: u32, height: u32) -> Self {
        ConversionError::GridTooLarge {
            width,
            length,
            height,
            max_width: MAX_WORLD_WIDTH,
            max_length: MAX_WORLD_LENGTH,
            max_height: MAX_WORLD_HEIGHT,
        }
    }
}

/// Failures of the external mesh2vox stage
#[derive(Debug, Error)]
pub enum MeshError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("[ERROR] mesh2vox.py not found at: {0}")]
    ScriptNotFound(String),

    #[error("[ERROR] Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("[ERROR] Failed to create output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[ERROR] Failed to run mesh2vox: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("[ERROR] Failed to supervise mesh2vox: {0}")]
    Supervise(#[source] std::io::Error),

    #[error("[ERROR] mesh2vox exited with code {0}")]
    ExitCode(i32),

    #[error("[ERROR] mesh2vox was terminated by a signal")]
    Terminated,

    #[error("[ERROR] mesh2vox finished but produced no output at {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("[ERROR] Failed to move output to {}: {source}", path.display())]
    Rename {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, ConversionError>;

/// Final status of one conversion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// The container file was written
    Succeeded { output: PathBuf },
    /// The run stopped on an error; the reason was logged
    Failed { reason: String },
    /// The run was cancelled by the caller
    Cancelled,
}

impl ConversionOutcome {
    pub fn failed(reason: impl ToString) -> Self {
        ConversionOutcome::Failed {
            reason: reason.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Succeeded { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConversionOutcome::Cancelled)
    }
}
