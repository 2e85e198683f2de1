// Input/Output: MagicaVoxel .vox container

pub mod reader;
pub mod writer;

use std::path::PathBuf;
use thiserror::Error;

pub use reader::VoxReader;
pub use writer::{VoxWriter, WriteSummary};

/// `.vox` container errors
#[derive(Debug, Error)]
pub enum VoxError {
    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode .vox data: {0}")]
    Encode(#[from] std::io::Error),

    #[error("Failed to parse .vox file: {0}")]
    Parse(String),

    #[error("No models found in .vox file")]
    NoModels,

    #[error("Model uses {count} colors but a .vox palette holds at most {max}")]
    TooManyColors { count: usize, max: usize },

    #[error("Chunk size must be between 1 and {max}, got {size}")]
    InvalidChunkSize { size: u32, max: u32 },
}
