//! Chunked `.vox` writer
//!
//! MagicaVoxel models are limited to 256 voxels per axis, so a grid is split
//! into cubes of `chunk_size` and every non-empty cube becomes one model. A
//! scene graph (`nTRN` → `nGRP` → `nTRN`/`nSHP` per model) places the models
//! back at their original offsets.
//!
//! Layout written:
//!
//! ```text
//! "VOX " 150
//! MAIN
//! ├─ SIZE / XYZI      × models
//! ├─ nTRN (root, id 0)
//! ├─ nGRP (id 1)
//! ├─ nTRN / nSHP      × models (ids 2k+2, 2k+3)
//! └─ RGBA (256 slots, slot k = voxel index k+1)
//! ```

use super::VoxError;
use crate::color::Color;
use crate::context::{RunContext, MAX_CHUNK_SIZE};
use crate::grid::VoxelGrid;
use crate::palette::Palette;
use crate::{MAX_PALETTE_COLORS, MAX_PALETTE_SIZE};
use byteorder::{LittleEndian, WriteBytesExt};
use glam::{IVec3, UVec3};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

const VOX_VERSION: i32 = 150;

/// Statistics about a written file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub path: PathBuf,
    pub models: usize,
    pub voxels: usize,
    pub colors: usize,
    pub bytes: usize,
}

/// One chunk-sized model ready for encoding
struct ModelChunk {
    /// Model size in MagicaVoxel axes (x, y = length, z = height)
    size: UVec3,
    /// Minimum corner in MagicaVoxel axes
    origin: UVec3,
    voxels: Vec<[u8; 4]>,
}

impl ModelChunk {
    /// `_t` translation: MagicaVoxel centers a model on its transform
    fn translation(&self) -> IVec3 {
        self.origin.as_ivec3() + (self.size / 2).as_ivec3()
    }
}

/// Writes a [`VoxelGrid`] as a MagicaVoxel `.vox` file
pub struct VoxWriter<'a> {
    ctx: &'a RunContext,
}

impl<'a> VoxWriter<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    /// Encode `grid` and write it to `path`
    ///
    /// With `palette`, every voxel color is looked up in it (nearest entry
    /// when absent). Without one, the palette is the grid's distinct colors
    /// in sorted order. The file is assembled in memory first, so a failed
    /// encode never leaves a partial file behind.
    pub fn write_model(
        &self,
        path: &Path,
        palette: Option<&Palette>,
        grid: &VoxelGrid,
    ) -> Result<WriteSummary, VoxError> {
        let (bytes, models, colors) = self.encode_with_stats(palette, grid)?;

        std::fs::write(path, &bytes).map_err(|source| VoxError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!(
            path = %path.display(),
            models,
            voxels = grid.len(),
            bytes = bytes.len(),
            "wrote .vox file"
        );

        Ok(WriteSummary {
            path: path.to_path_buf(),
            models,
            voxels: grid.len(),
            colors,
            bytes: bytes.len(),
        })
    }

    /// Encode `grid` into `.vox` bytes
    pub fn encode(&self, palette: Option<&Palette>, grid: &VoxelGrid) -> Result<Vec<u8>, VoxError> {
        self.encode_with_stats(palette, grid).map(|(bytes, _, _)| bytes)
    }

    fn encode_with_stats(
        &self,
        palette: Option<&Palette>,
        grid: &VoxelGrid,
    ) -> Result<(Vec<u8>, usize, usize), VoxError> {
        let chunk_size = self.ctx.chunk_size;
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(VoxError::InvalidChunkSize {
                size: chunk_size,
                max: MAX_CHUNK_SIZE,
            });
        }

        let palette = resolve_palette(palette, grid)?;
        let indices = color_indices(&palette, grid);
        let chunks = split_into_chunks(grid, chunk_size, &indices);

        let mut children = Vec::new();
        for chunk in &chunks {
            write_chunk(&mut children, b"SIZE", &size_content(chunk)?, &[])?;
            write_chunk(&mut children, b"XYZI", &xyzi_content(chunk)?, &[])?;
        }
        write_scene_graph(&mut children, &chunks)?;
        write_chunk(&mut children, b"RGBA", &rgba_content(&palette)?, &[])?;

        let mut out = Vec::with_capacity(children.len() + 20);
        out.write_all(b"VOX ")?;
        out.write_i32::<LittleEndian>(VOX_VERSION)?;
        write_chunk(&mut out, b"MAIN", &[], &children)?;

        Ok((out, chunks.len(), palette.len()))
    }
}

fn resolve_palette(palette: Option<&Palette>, grid: &VoxelGrid) -> Result<Palette, VoxError> {
    if let Some(palette) = palette {
        return Ok(palette.clone());
    }

    let colors = grid.colors();
    if colors.len() > MAX_PALETTE_COLORS {
        return Err(VoxError::TooManyColors {
            count: colors.len(),
            max: MAX_PALETTE_COLORS,
        });
    }
    Ok(Palette::from_colors(colors))
}

/// Map each grid color to its 1-based `.vox` color index
fn color_indices(palette: &Palette, grid: &VoxelGrid) -> HashMap<Color, u8> {
    grid.colors()
        .into_iter()
        .map(|color| {
            let slot = palette
                .index_of(color)
                .or_else(|| palette.nearest_index(color))
                .unwrap_or(0);
            (color, (slot + 1).min(MAX_PALETTE_COLORS) as u8)
        })
        .collect()
}

fn split_into_chunks(
    grid: &VoxelGrid,
    chunk_size: u32,
    indices: &HashMap<Color, u8>,
) -> Vec<ModelChunk> {
    // Keyed by chunk coordinate in MagicaVoxel axes
    let mut buckets: BTreeMap<(u32, u32, u32), Vec<[u8; 4]>> = BTreeMap::new();
    for (pos, color) in grid.iter() {
        let key = (pos.x / chunk_size, pos.z / chunk_size, pos.y / chunk_size);
        let index = indices.get(&color).copied().unwrap_or(1);
        buckets.entry(key).or_default().push([
            (pos.x % chunk_size) as u8,
            (pos.z % chunk_size) as u8,
            (pos.y % chunk_size) as u8,
            index,
        ]);
    }

    if buckets.is_empty() {
        return vec![ModelChunk {
            size: UVec3::ONE,
            origin: UVec3::ZERO,
            voxels: Vec::new(),
        }];
    }

    let extent = UVec3::new(grid.width(), grid.length(), grid.height());
    buckets
        .into_iter()
        .map(|((cx, cy, cz), voxels)| {
            let origin = UVec3::new(cx, cy, cz) * chunk_size;
            let size = (extent - origin).min(UVec3::splat(chunk_size));
            ModelChunk {
                size,
                origin,
                voxels,
            }
        })
        .collect()
}

fn write_chunk(
    out: &mut Vec<u8>,
    id: &[u8; 4],
    content: &[u8],
    children: &[u8],
) -> std::io::Result<()> {
    out.write_all(id)?;
    out.write_i32::<LittleEndian>(content.len() as i32)?;
    out.write_i32::<LittleEndian>(children.len() as i32)?;
    out.write_all(content)?;
    out.write_all(children)
}

fn size_content(chunk: &ModelChunk) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(12);
    buf.write_i32::<LittleEndian>(chunk.size.x as i32)?;
    buf.write_i32::<LittleEndian>(chunk.size.y as i32)?;
    buf.write_i32::<LittleEndian>(chunk.size.z as i32)?;
    Ok(buf)
}

fn xyzi_content(chunk: &ModelChunk) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(4 + chunk.voxels.len() * 4);
    buf.write_i32::<LittleEndian>(chunk.voxels.len() as i32)?;
    for voxel in &chunk.voxels {
        buf.write_all(voxel)?;
    }
    Ok(buf)
}

fn rgba_content(palette: &Palette) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(MAX_PALETTE_SIZE * 4);
    for slot in 0..MAX_PALETTE_SIZE {
        let c = palette.get(slot).unwrap_or(Color::BLACK);
        buf.write_all(&[c.r, c.g, c.b, c.a])?;
    }
    Ok(buf)
}

fn write_string(buf: &mut Vec<u8>, s: &str) -> std::io::Result<()> {
    buf.write_i32::<LittleEndian>(s.len() as i32)?;
    buf.write_all(s.as_bytes())
}

fn write_dict(buf: &mut Vec<u8>, entries: &[(&str, &str)]) -> std::io::Result<()> {
    buf.write_i32::<LittleEndian>(entries.len() as i32)?;
    for (key, value) in entries {
        write_string(buf, key)?;
        write_string(buf, value)?;
    }
    Ok(())
}

fn transform_node(
    node_id: i32,
    child_id: i32,
    layer_id: i32,
    translation: Option<IVec3>,
) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.write_i32::<LittleEndian>(node_id)?;
    write_dict(&mut buf, &[])?;
    buf.write_i32::<LittleEndian>(child_id)?;
    buf.write_i32::<LittleEndian>(-1)?; // reserved
    buf.write_i32::<LittleEndian>(layer_id)?;
    buf.write_i32::<LittleEndian>(1)?; // frames
    match translation {
        Some(t) => {
            let value = format!("{} {} {}", t.x, t.y, t.z);
            write_dict(&mut buf, &[("_t", value.as_str())])?;
        }
        None => write_dict(&mut buf, &[])?,
    }
    Ok(buf)
}

fn write_scene_graph(out: &mut Vec<u8>, chunks: &[ModelChunk]) -> std::io::Result<()> {
    write_chunk(out, b"nTRN", &transform_node(0, 1, -1, None)?, &[])?;

    let mut group = Vec::new();
    group.write_i32::<LittleEndian>(1)?;
    write_dict(&mut group, &[])?;
    group.write_i32::<LittleEndian>(chunks.len() as i32)?;
    for k in 0..chunks.len() {
        group.write_i32::<LittleEndian>(2 + 2 * k as i32)?;
    }
    write_chunk(out, b"nGRP", &group, &[])?;

    for (k, chunk) in chunks.iter().enumerate() {
        let transform_id = 2 + 2 * k as i32;
        let shape_id = transform_id + 1;

        let transform = transform_node(transform_id, shape_id, 0, Some(chunk.translation()))?;
        write_chunk(out, b"nTRN", &transform, &[])?;

        let mut shape = Vec::new();
        shape.write_i32::<LittleEndian>(shape_id)?;
        write_dict(&mut shape, &[])?;
        shape.write_i32::<LittleEndian>(1)?; // models
        shape.write_i32::<LittleEndian>(k as i32)?;
        write_dict(&mut shape, &[])?;
        write_chunk(out, b"nSHP", &shape, &[])?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_and_main(bytes: &[u8]) -> (&[u8], i32, &[u8]) {
        (&bytes[0..4], i32::from_le_bytes(bytes[4..8].try_into().unwrap()), &bytes[8..12])
    }

    #[test]
    fn test_encode_header() {
        let mut grid = VoxelGrid::new();
        grid.set(0, 0, 0, Color::WHITE);
        let ctx = RunContext::default();
        let bytes = VoxWriter::new(&ctx).encode(None, &grid).unwrap();

        let (magic, version, main) = header_and_main(&bytes);
        assert_eq!(magic, b"VOX ");
        assert_eq!(version, 150);
        assert_eq!(main, b"MAIN");
        let children = i32::from_le_bytes(bytes[16..20].try_into().unwrap());
        assert_eq!(children as usize, bytes.len() - 20);
    }

    #[test]
    fn test_chunks_split_along_each_axis() {
        let mut grid = VoxelGrid::new();
        grid.set(0, 0, 0, Color::WHITE);
        grid.set(15, 0, 0, Color::WHITE);
        grid.set(0, 15, 0, Color::WHITE);
        grid.set(0, 0, 15, Color::WHITE);

        let indices = color_indices(&Palette::from_colors([Color::WHITE]), &grid);
        let chunks = split_into_chunks(&grid, 10, &indices);
        assert_eq!(chunks.len(), 4);

        // Last chunk along x is clipped to the grid extent
        let x_chunk = chunks.iter().find(|c| c.origin == UVec3::new(10, 0, 0)).unwrap();
        assert_eq!(x_chunk.size, UVec3::new(6, 10, 10));

        // Grid height maps to MagicaVoxel z
        let up_chunk = chunks.iter().find(|c| c.origin == UVec3::new(0, 0, 10)).unwrap();
        assert_eq!(up_chunk.voxels, vec![[0, 0, 5, 1]]);
    }

    #[test]
    fn test_too_many_colors_rejected() {
        let mut grid = VoxelGrid::new();
        for i in 0..300u32 {
            grid.set(i, 0, 0, Color::rgb((i % 256) as u8, (i / 256) as u8, 0));
        }
        let ctx = RunContext::default();
        let err = VoxWriter::new(&ctx).encode(None, &grid).unwrap_err();
        assert!(matches!(err, VoxError::TooManyColors { count: 300, .. }));
    }

    #[test]
    fn test_invalid_chunk_size_rejected() {
        let ctx = RunContext::new(0);
        let err = VoxWriter::new(&ctx).encode(None, &VoxelGrid::new()).unwrap_err();
        assert!(matches!(err, VoxError::InvalidChunkSize { size: 0, .. }));
    }

    #[test]
    fn test_explicit_palette_indices() {
        let palette = Palette::from_colors([Color::rgb(1, 1, 1), Color::rgb(200, 0, 0)]);
        let mut grid = VoxelGrid::new();
        grid.set(0, 0, 0, Color::rgb(200, 0, 0));
        let indices = color_indices(&palette, &grid);
        assert_eq!(indices[&Color::rgb(200, 0, 0)], 2);
    }
}
