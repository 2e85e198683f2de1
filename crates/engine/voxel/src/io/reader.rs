//! `.vox` reader
//!
//! Parses a file with `dot_vox` and flattens its scene graph into one
//! [`VoxelGrid`]. Transform translations (`_t`) are applied; rotations are
//! not. Files without a scene graph place every model at the origin.

use super::VoxError;
use crate::color::Color;
use crate::grid::VoxelGrid;
use dot_vox::{DotVoxData, SceneNode};
use glam::IVec3;
use std::path::Path;

/// Guards against malformed (cyclic) scene graphs
const MAX_SCENE_DEPTH: usize = 64;

/// Loads `.vox` files into a [`VoxelGrid`]
#[derive(Debug, Default, Clone, Copy)]
pub struct VoxReader;

impl VoxReader {
    pub fn new() -> Self {
        Self
    }

    /// Read and flatten the file at `path`
    pub fn load_model(&self, path: &Path) -> Result<VoxelGrid, VoxError> {
        let bytes = std::fs::read(path).map_err(|source| VoxError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_bytes(&bytes)
    }

    /// Flatten `.vox` bytes
    pub fn load_bytes(&self, bytes: &[u8]) -> Result<VoxelGrid, VoxError> {
        let data = dot_vox::load_bytes(bytes).map_err(|e| VoxError::Parse(e.to_string()))?;
        convert_dotvox_to_grid(&data)
    }
}

fn convert_dotvox_to_grid(data: &DotVoxData) -> Result<VoxelGrid, VoxError> {
    if data.models.is_empty() {
        return Err(VoxError::NoModels);
    }

    let placements = model_placements(data);
    let mut voxels = Vec::new();

    for (model_id, translation) in placements {
        let Some(model) = data.models.get(model_id) else {
            tracing::warn!(model_id, "scene references a missing model");
            continue;
        };

        // MagicaVoxel centers the model on its transform
        let half = IVec3::new(
            (model.size.x / 2) as i32,
            (model.size.y / 2) as i32,
            (model.size.z / 2) as i32,
        );
        let Some(origin) = translation.checked_sub(half) else {
            return Err(VoxError::Parse(format!(
                "model {} translation out of range",
                model_id
            )));
        };

        for v in &model.voxels {
            let color = data
                .palette
                .get(v.i as usize)
                .map(|c| Color::rgba(c.r, c.g, c.b, c.a))
                .unwrap_or(Color::WHITE);

            // MagicaVoxel's Z becomes our Y (up), its Y becomes our Z
            let world = origin
                .checked_add(IVec3::new(v.x as i32, v.y as i32, v.z as i32))
                .ok_or_else(|| {
                    VoxError::Parse(format!("model {} voxel position out of range", model_id))
                })?;
            voxels.push((IVec3::new(world.x, world.z, world.y), color));
        }
    }

    Ok(VoxelGrid::from_signed(voxels))
}

/// (model index, accumulated translation) for every shape in the scene
fn model_placements(data: &DotVoxData) -> Vec<(usize, IVec3)> {
    let mut placements = Vec::new();
    if !data.scenes.is_empty() {
        walk_scene(&data.scenes, 0, IVec3::ZERO, 0, &mut placements);
    }

    if placements.is_empty() {
        placements = (0..data.models.len()).map(|i| (i, IVec3::ZERO)).collect();
    }
    placements
}

fn walk_scene(
    scenes: &[SceneNode],
    node: u32,
    offset: IVec3,
    depth: usize,
    out: &mut Vec<(usize, IVec3)>,
) {
    if depth > MAX_SCENE_DEPTH {
        return;
    }
    let Some(scene_node) = scenes.get(node as usize) else {
        return;
    };

    match scene_node {
        SceneNode::Transform { frames, child, .. } => {
            let translation = frames
                .first()
                .and_then(|frame| frame.attributes.get("_t"))
                .and_then(|t| parse_translation(t))
                .unwrap_or(IVec3::ZERO);
            walk_scene(scenes, *child, offset.saturating_add(translation), depth + 1, out);
        }
        SceneNode::Group { children, .. } => {
            for child in children {
                walk_scene(scenes, *child, offset, depth + 1, out);
            }
        }
        SceneNode::Shape { models, .. } => {
            for model in models {
                out.push((model.model_id as usize, offset));
            }
        }
    }
}

fn parse_translation(value: &str) -> Option<IVec3> {
    let mut parts = value.split_whitespace().map(|p| p.parse::<i32>().ok());
    let x = parts.next()??;
    let y = parts.next()??;
    let z = parts.next()??;
    Some(IVec3::new(x, y, z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_translation() {
        assert_eq!(parse_translation("1 -2 30"), Some(IVec3::new(1, -2, 30)));
        assert_eq!(parse_translation("1 2"), None);
        assert_eq!(parse_translation("a b c"), None);
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let err = VoxReader::new().load_bytes(b"not a vox file").unwrap_err();
        assert!(matches!(err, VoxError::Parse(_)));
    }
}
