//! MagicaVoxel `.vox` re-import

use crate::types::ConvertError;
use std::path::PathBuf;
use voxel::{VoxReader, VoxelGrid};

/// Reads an existing `.vox` file, merging every model through its scene graph
#[derive(Debug, Clone)]
pub struct VoxConverter {
    pub path: PathBuf,
}

impl VoxConverter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn produce(&self) -> Result<VoxelGrid, ConvertError> {
        Ok(VoxReader::new().load_model(&self.path)?)
    }
}
