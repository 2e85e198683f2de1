//! Binvox converter

use crate::types::ConvertError;
use std::path::{Path, PathBuf};
use voxel::{Color, VoxelGrid};

#[derive(Debug, Clone)]
pub struct BinvoxConverter {
    pub path: PathBuf,
}

impl BinvoxConverter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn produce(&self) -> Result<VoxelGrid, ConvertError> {
        let bytes = std::fs::read(&self.path).map_err(|e| ConvertError::io(&self.path, e))?;
        decode(&self.path, &bytes)
    }
}

/// Decode a `#binvox 1` file into white voxels
///
/// Voxels are run-length encoded as `(value, count)` byte pairs over the
/// linear index `(x * nz + z) * ny + y`, with y (up) varying fastest.
pub fn decode(path: &Path, bytes: &[u8]) -> Result<VoxelGrid, ConvertError> {
    let mut offset = 0;
    let mut next_line = || -> Option<String> {
        let rest = bytes.get(offset..)?;
        let end = rest.iter().position(|&b| b == b'\n')?;
        offset += end + 1;
        Some(String::from_utf8_lossy(&rest[..end]).trim().to_string())
    };

    let magic = next_line().unwrap_or_default();
    if !magic.starts_with("#binvox") {
        return Err(ConvertError::parse(path, "missing #binvox header"));
    }

    let mut dims = None;
    loop {
        let line = next_line().ok_or_else(|| ConvertError::parse(path, "missing data section"))?;
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("dim") => {
                let values: Vec<u32> = tokens
                    .map(|t| t.parse())
                    .collect::<Result<_, _>>()
                    .map_err(|_| ConvertError::parse(path, format!("bad dim line {:?}", line)))?;
                match values.as_slice() {
                    [d, h, w] => dims = Some((*d as usize, *h as usize, *w as usize)),
                    _ => return Err(ConvertError::parse(path, format!("bad dim line {:?}", line))),
                }
            }
            Some("data") => break,
            // translate and scale only place the model in world space
            _ => {}
        }
    }

    let (nx, ny, nz) = dims.ok_or_else(|| ConvertError::parse(path, "missing dim line"))?;
    let total = nx
        .checked_mul(ny)
        .and_then(|n| n.checked_mul(nz))
        .ok_or_else(|| ConvertError::parse(path, format!("dimensions too large: {}x{}x{}", nx, ny, nz)))?;
    let data = &bytes[offset..];

    let mut grid = VoxelGrid::new();
    let mut index = 0usize;
    for pair in data.chunks_exact(2) {
        let (value, count) = (pair[0], pair[1] as usize);
        let end = (index + count).min(total);
        if value != 0 {
            for i in index..end {
                let y = i % ny;
                let z = (i / ny) % nz;
                let x = i / (ny * nz);
                grid.set(x as u32, y as u32, z as u32, Color::WHITE);
            }
        }
        index = end;
        if index >= total {
            break;
        }
    }

    if index < total {
        tracing::warn!(path = %path.display(), decoded = index, total, "binvox data ended early");
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binvox(dim: usize, runs: &[(u8, u8)]) -> Vec<u8> {
        let mut bytes = format!(
            "#binvox 1\ndim {d} {d} {d}\ntranslate 0 0 0\nscale 1\ndata\n",
            d = dim
        )
        .into_bytes();
        for (value, count) in runs {
            bytes.push(*value);
            bytes.push(*count);
        }
        bytes
    }

    #[test]
    fn test_oversized_dims_are_rejected() {
        let bytes = b"#binvox 1\ndim 4000000000 4000000000 4000000000\ndata\n\x01\x01";
        let err = decode(Path::new("huge.binvox"), bytes).unwrap_err();
        assert!(err.to_string().contains("dimensions too large"), "{}", err);
    }

    #[test]
    fn test_decode_runs() {
        // 2x2x2: first voxel set, rest empty
        let bytes = binvox(2, &[(1, 1), (0, 7)]);
        let grid = decode(Path::new("a.binvox"), &bytes).unwrap();
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.get(0, 0, 0), Some(Color::WHITE));
    }

    #[test]
    fn test_y_varies_fastest() {
        let bytes = binvox(2, &[(0, 1), (1, 1), (0, 1), (1, 1), (0, 4)]);
        let grid = decode(Path::new("a.binvox"), &bytes).unwrap();
        assert!(grid.contains(0, 1, 0));
        assert!(grid.contains(0, 1, 1));
        assert_eq!(grid.len(), 2);
    }

    #[test]
    fn test_full_cube() {
        let bytes = binvox(3, &[(1, 27)]);
        let grid = decode(Path::new("a.binvox"), &bytes).unwrap();
        assert_eq!(grid.len(), 27);
        assert_eq!((grid.width(), grid.height(), grid.length()), (3, 3, 3));
    }

    #[test]
    fn test_bad_header() {
        assert!(decode(Path::new("a.binvox"), b"hello\n").is_err());
    }
}
