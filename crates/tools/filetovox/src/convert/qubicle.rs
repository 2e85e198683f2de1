//! Qubicle binary (`.qb`) converter

use crate::types::ConvertError;
use byteorder::{LittleEndian, ReadBytesExt};
use glam::IVec3;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use voxel::{Color, VoxelGrid};

/// Run marker: next two words are a count and a color
const CODEFLAG: u32 = 2;
/// End of one z slice in compressed data
const NEXTSLICEFLAG: u32 = 6;

#[derive(Debug, Clone)]
pub struct QubicleConverter {
    pub path: PathBuf,
}

impl QubicleConverter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn produce(&self) -> Result<VoxelGrid, ConvertError> {
        let bytes = std::fs::read(&self.path).map_err(|e| ConvertError::io(&self.path, e))?;
        decode(&self.path, &bytes)
    }
}

#[derive(Debug, Clone, Copy)]
struct QbHeader {
    bgra: bool,
    right_handed: bool,
    compressed: bool,
    matrix_count: u32,
}

struct Matrix {
    size: [u32; 3],
    position: IVec3,
}

/// Decode every matrix and merge them at their positions
pub fn decode(path: &Path, bytes: &[u8]) -> Result<VoxelGrid, ConvertError> {
    let mut cursor = Cursor::new(bytes);
    let truncated = |_: std::io::Error| ConvertError::parse(path, "unexpected end of data");

    let _version = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    let color_format = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    let z_axis = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    let compressed = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    let _visibility_mask = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    let matrix_count = cursor.read_u32::<LittleEndian>().map_err(truncated)?;

    let header = QbHeader {
        bgra: color_format == 1,
        right_handed: z_axis == 1,
        compressed: compressed == 1,
        matrix_count,
    };

    let mut voxels: Vec<(IVec3, Color)> = Vec::new();
    for _ in 0..header.matrix_count {
        let matrix = read_matrix_header(&mut cursor).map_err(truncated)?;
        let [sx, sy, sz] = matrix.size;
        if sx.saturating_mul(sy).saturating_mul(sz) > 4096 * 4096 * 64 {
            return Err(ConvertError::parse(path, format!("matrix too large: {:?}", matrix.size)));
        }

        let mut place = |x: u32, y: u32, z: u32, raw: u32| -> Result<(), ConvertError> {
            let color = decode_color(raw, header.bgra);
            if color.a == 0 {
                return Ok(());
            }
            // left-handed files mirror z
            let z = if header.right_handed { z } else { sz - 1 - z };
            let local = IVec3::new(x as i32, y as i32, z as i32);
            let pos = matrix.position.checked_add(local).ok_or_else(|| {
                ConvertError::parse(
                    path,
                    format!("matrix position {} out of range", matrix.position),
                )
            })?;
            voxels.push((pos, color.opaque()));
            Ok(())
        };

        if header.compressed {
            for z in 0..sz {
                let mut index = 0u32;
                loop {
                    let data = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                    if data == NEXTSLICEFLAG {
                        break;
                    }
                    let (count, raw) = if data == CODEFLAG {
                        let count = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                        (count, cursor.read_u32::<LittleEndian>().map_err(truncated)?)
                    } else {
                        (1, data)
                    };
                    for _ in 0..count {
                        let (x, y) = (index % sx.max(1), index / sx.max(1));
                        if y < sy {
                            place(x, y, z, raw)?;
                        }
                        index += 1;
                    }
                }
            }
        } else {
            for z in 0..sz {
                for y in 0..sy {
                    for x in 0..sx {
                        let raw = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                        place(x, y, z, raw)?;
                    }
                }
            }
        }
    }

    tracing::debug!(matrices = header.matrix_count, voxels = voxels.len(), "decoded qubicle");
    Ok(VoxelGrid::from_signed(voxels))
}

fn read_matrix_header(cursor: &mut Cursor<&[u8]>) -> std::io::Result<Matrix> {
    let name_len = cursor.read_u8()? as usize;
    let mut name = vec![0u8; name_len];
    cursor.read_exact(&mut name)?;

    let size = [
        cursor.read_u32::<LittleEndian>()?,
        cursor.read_u32::<LittleEndian>()?,
        cursor.read_u32::<LittleEndian>()?,
    ];
    let position = IVec3::new(
        cursor.read_i32::<LittleEndian>()?,
        cursor.read_i32::<LittleEndian>()?,
        cursor.read_i32::<LittleEndian>()?,
    );
    Ok(Matrix { size, position })
}

/// Colors are stored as 4 bytes, RGBA or BGRA
fn decode_color(raw: u32, bgra: bool) -> Color {
    let [b0, b1, b2, a] = raw.to_le_bytes();
    if bgra {
        Color::rgba(b2, b1, b0, a)
    } else {
        Color::rgba(b0, b1, b2, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn header(compressed: bool, right_handed: bool, matrices: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        for v in [0x0101_0000u32, 0, right_handed as u32, compressed as u32, 0, matrices] {
            bytes.write_u32::<LittleEndian>(v).unwrap();
        }
        bytes
    }

    fn matrix_header(bytes: &mut Vec<u8>, size: [u32; 3], pos: [i32; 3]) {
        bytes.push(1);
        bytes.push(b'm');
        for s in size {
            bytes.write_u32::<LittleEndian>(s).unwrap();
        }
        for p in pos {
            bytes.write_i32::<LittleEndian>(p).unwrap();
        }
    }

    fn rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
        u32::from_le_bytes([r, g, b, a])
    }

    #[test]
    fn test_uncompressed_matrix() {
        let mut bytes = header(false, true, 1);
        matrix_header(&mut bytes, [2, 1, 1], [0, 0, 0]);
        bytes.write_u32::<LittleEndian>(rgba(255, 0, 0, 255)).unwrap();
        bytes.write_u32::<LittleEndian>(0).unwrap();

        let grid = decode(Path::new("a.qb"), &bytes).unwrap();
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.get(0, 0, 0), Some(Color::rgb(255, 0, 0)));
    }

    #[test]
    fn test_compressed_runs() {
        let mut bytes = header(true, true, 1);
        matrix_header(&mut bytes, [2, 2, 1], [0, 0, 0]);
        for word in [CODEFLAG, 3, rgba(0, 255, 0, 255), 0, NEXTSLICEFLAG] {
            bytes.write_u32::<LittleEndian>(word).unwrap();
        }

        let grid = decode(Path::new("a.qb"), &bytes).unwrap();
        assert_eq!(grid.len(), 3);
        assert!(grid.contains(0, 0, 0));
        assert!(grid.contains(1, 0, 0));
        assert!(grid.contains(0, 1, 0));
        assert!(!grid.contains(1, 1, 0));
    }

    #[test]
    fn test_matrices_merge_at_positions() {
        let mut bytes = header(false, true, 2);
        matrix_header(&mut bytes, [1, 1, 1], [0, 0, 0]);
        bytes.write_u32::<LittleEndian>(rgba(1, 2, 3, 255)).unwrap();
        matrix_header(&mut bytes, [1, 1, 1], [3, 0, -2]);
        bytes.write_u32::<LittleEndian>(rgba(4, 5, 6, 255)).unwrap();

        let grid = decode(Path::new("a.qb"), &bytes).unwrap();
        // min corner shifted to the origin
        assert_eq!(grid.get(0, 0, 2), Some(Color::rgb(1, 2, 3)));
        assert_eq!(grid.get(3, 0, 0), Some(Color::rgb(4, 5, 6)));
    }

    #[test]
    fn test_bgra_and_left_handed() {
        let mut bytes = header(false, false, 1);
        bytes[4] = 1; // BGRA
        matrix_header(&mut bytes, [1, 1, 2], [0, 0, 0]);
        bytes.write_u32::<LittleEndian>(rgba(10, 20, 30, 255)).unwrap();
        bytes.write_u32::<LittleEndian>(rgba(40, 50, 60, 255)).unwrap();

        let grid = decode(Path::new("a.qb"), &bytes).unwrap();
        assert_eq!(grid.get(0, 0, 1), Some(Color::rgb(30, 20, 10)));
        assert_eq!(grid.get(0, 0, 0), Some(Color::rgb(60, 50, 40)));
    }

    #[test]
    fn test_position_overflow_is_parse_error() {
        let mut bytes = header(false, true, 1);
        matrix_header(&mut bytes, [2, 1, 1], [i32::MAX, 0, 0]);
        bytes.write_u32::<LittleEndian>(rgba(255, 0, 0, 255)).unwrap();
        bytes.write_u32::<LittleEndian>(rgba(255, 0, 0, 255)).unwrap();

        let err = decode(Path::new("far.qb"), &bytes).unwrap_err();
        assert!(matches!(err, ConvertError::Parse { .. }));
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_truncated() {
        let bytes = header(false, true, 1);
        assert!(decode(Path::new("a.qb"), &bytes).is_err());
    }
}
