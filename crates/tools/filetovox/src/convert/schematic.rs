//! MCEdit `.schematic` converter
//!
//! Schematics are gzip-compressed NBT. Only the classic layout is read:
//! `Width`, `Height`, `Length` shorts plus `Blocks` and `Data` byte arrays
//! indexed by `(y * Length + z) * Width + x`.

use crate::types::ConvertError;
use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use voxel::{Color, VoxelGrid};

#[derive(Debug, Clone)]
pub struct SchematicConverter {
    pub path: PathBuf,
    pub excavate: bool,
}

impl SchematicConverter {
    pub fn new(path: PathBuf, excavate: bool) -> Self {
        Self { path, excavate }
    }

    pub fn produce(&self) -> Result<VoxelGrid, ConvertError> {
        let file = std::fs::File::open(&self.path).map_err(|e| ConvertError::io(&self.path, e))?;
        let mut bytes = Vec::new();
        GzDecoder::new(file)
            .read_to_end(&mut bytes)
            .map_err(|e| ConvertError::parse(&self.path, format!("gzip: {}", e)))?;

        let mut grid = decode(&self.path, &bytes)?;
        if self.excavate {
            grid.excavate();
        }
        Ok(grid)
    }
}

/// Decoded NBT value
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<u8>),
    String(String),
    List(Vec<Tag>),
    Compound(HashMap<String, Tag>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl Tag {
    fn as_short(&self) -> Option<i16> {
        match self {
            Tag::Short(v) => Some(*v),
            _ => None,
        }
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Tag::ByteArray(v) => Some(v),
            _ => None,
        }
    }
}

/// Read the named root compound of an uncompressed NBT stream
pub fn read_nbt(mut reader: impl Read) -> io::Result<(String, Tag)> {
    let id = reader.read_u8()?;
    if id != 10 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("root tag is {} instead of a compound", id),
        ));
    }
    let name = read_string(&mut reader)?;
    let tag = read_payload(&mut reader, id, 0)?;
    Ok((name, tag))
}

fn read_string(reader: &mut impl Read) -> io::Result<String> {
    let len = reader.read_u16::<BigEndian>()? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn read_len(reader: &mut impl Read) -> io::Result<usize> {
    let len = reader.read_i32::<BigEndian>()?;
    usize::try_from(len).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative length"))
}

fn read_payload(reader: &mut impl Read, id: u8, depth: usize) -> io::Result<Tag> {
    if depth > 512 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "NBT nesting too deep"));
    }

    let tag = match id {
        1 => Tag::Byte(reader.read_i8()?),
        2 => Tag::Short(reader.read_i16::<BigEndian>()?),
        3 => Tag::Int(reader.read_i32::<BigEndian>()?),
        4 => Tag::Long(reader.read_i64::<BigEndian>()?),
        5 => Tag::Float(reader.read_f32::<BigEndian>()?),
        6 => Tag::Double(reader.read_f64::<BigEndian>()?),
        7 => {
            let len = read_len(reader)?;
            let mut buf = Vec::new();
            (&mut *reader).take(len as u64).read_to_end(&mut buf)?;
            if buf.len() != len {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
            Tag::ByteArray(buf)
        }
        8 => Tag::String(read_string(reader)?),
        9 => {
            let item = reader.read_u8()?;
            let len = read_len(reader)?;
            let mut items = Vec::new();
            for _ in 0..len {
                items.push(read_payload(reader, item, depth + 1)?);
            }
            Tag::List(items)
        }
        10 => {
            let mut entries = HashMap::new();
            loop {
                let child = reader.read_u8()?;
                if child == 0 {
                    break;
                }
                let name = read_string(reader)?;
                entries.insert(name, read_payload(reader, child, depth + 1)?);
            }
            Tag::Compound(entries)
        }
        11 => {
            let len = read_len(reader)?;
            let mut values = Vec::new();
            for _ in 0..len {
                values.push(reader.read_i32::<BigEndian>()?);
            }
            Tag::IntArray(values)
        }
        12 => {
            let len = read_len(reader)?;
            let mut values = Vec::new();
            for _ in 0..len {
                values.push(reader.read_i64::<BigEndian>()?);
            }
            Tag::LongArray(values)
        }
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown tag id {}", other),
            ))
        }
    };
    Ok(tag)
}

/// Decode an uncompressed schematic NBT stream
pub fn decode(path: &Path, bytes: &[u8]) -> Result<VoxelGrid, ConvertError> {
    let (_, root) = read_nbt(bytes).map_err(|e| ConvertError::parse(path, format!("NBT: {}", e)))?;
    let Tag::Compound(root) = root else {
        return Err(ConvertError::parse(path, "root is not a compound"));
    };

    let dim = |key: &str| -> Result<usize, ConvertError> {
        root.get(key)
            .and_then(Tag::as_short)
            .map(|v| v as u16 as usize)
            .ok_or_else(|| ConvertError::parse(path, format!("missing {}", key)))
    };
    let (width, height, length) = (dim("Width")?, dim("Height")?, dim("Length")?);

    if root.contains_key("Palette") && !root.contains_key("Blocks") {
        return Err(ConvertError::Unsupported {
            format: "schematic",
            path: path.to_path_buf(),
            message: "Sponge palette schematics".to_string(),
        });
    }

    let blocks = root
        .get("Blocks")
        .and_then(Tag::as_bytes)
        .ok_or_else(|| ConvertError::parse(path, "missing Blocks"))?;
    let data = root.get("Data").and_then(Tag::as_bytes).unwrap_or(&[]);

    let volume = width * height * length;
    if blocks.len() < volume {
        return Err(ConvertError::parse(
            path,
            format!("Blocks holds {} entries, expected {}", blocks.len(), volume),
        ));
    }

    let mut grid = VoxelGrid::new();
    for y in 0..height {
        for z in 0..length {
            for x in 0..width {
                let index = (y * length + z) * width + x;
                let meta = data.get(index).copied().unwrap_or(0);
                if let Some(color) = block_color(blocks[index], meta) {
                    grid.set(x as u32, y as u32, z as u32, color);
                }
            }
        }
    }

    tracing::debug!(width, height, length, voxels = grid.len(), "decoded schematic");
    Ok(grid)
}

/// Wool, stained clay and stained glass colors by data value
const DYE_COLORS: [Color; 16] = [
    Color::rgb(233, 236, 236),
    Color::rgb(240, 118, 19),
    Color::rgb(189, 68, 179),
    Color::rgb(58, 175, 217),
    Color::rgb(248, 198, 39),
    Color::rgb(112, 185, 25),
    Color::rgb(237, 141, 172),
    Color::rgb(62, 68, 71),
    Color::rgb(142, 142, 134),
    Color::rgb(21, 137, 145),
    Color::rgb(121, 42, 172),
    Color::rgb(53, 57, 157),
    Color::rgb(114, 71, 40),
    Color::rgb(84, 109, 27),
    Color::rgb(161, 39, 34),
    Color::rgb(20, 21, 25),
];

/// Representative color of a legacy block id, `None` for air
pub fn block_color(id: u8, data: u8) -> Option<Color> {
    let color = match id {
        0 => return None,
        1 => Color::rgb(125, 125, 125),
        2 => Color::rgb(95, 159, 53),
        3 => Color::rgb(134, 96, 67),
        4 => Color::rgb(122, 122, 122),
        5 => Color::rgb(157, 128, 79),
        7 => Color::rgb(84, 84, 84),
        8 | 9 => Color::rgb(47, 67, 244),
        10 | 11 => Color::rgb(207, 92, 20),
        12 => Color::rgb(219, 207, 163),
        13 => Color::rgb(136, 126, 126),
        14 => Color::rgb(143, 140, 125),
        15 => Color::rgb(136, 130, 127),
        16 => Color::rgb(115, 115, 115),
        17 => Color::rgb(102, 81, 51),
        18 => Color::rgb(60, 110, 40),
        20 => Color::rgb(175, 213, 219),
        24 => Color::rgb(216, 203, 155),
        35 | 95 | 159 | 171 => DYE_COLORS[(data & 0x0f) as usize],
        41 => Color::rgb(249, 236, 78),
        42 => Color::rgb(219, 219, 219),
        45 => Color::rgb(146, 99, 86),
        48 => Color::rgb(90, 108, 90),
        49 => Color::rgb(20, 18, 29),
        57 => Color::rgb(97, 219, 213),
        79 => Color::rgb(160, 188, 255),
        80 => Color::rgb(239, 251, 251),
        82 => Color::rgb(158, 164, 176),
        87 => Color::rgb(111, 54, 52),
        89 => Color::rgb(143, 118, 69),
        98 => Color::rgb(122, 121, 122),
        112 => Color::rgb(44, 21, 26),
        121 => Color::rgb(221, 223, 165),
        133 => Color::rgb(81, 217, 117),
        152 => Color::rgb(171, 27, 9),
        155 => Color::rgb(236, 233, 226),
        172 => Color::rgb(150, 92, 66),
        // stable fallback so unknown ids stay distinguishable
        other => {
            let h = (other as u32).wrapping_mul(2_654_435_761);
            Color::rgb((h >> 24) as u8, (h >> 16) as u8, (h >> 8) as u8)
        }
    };
    Some(color)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn named(out: &mut Vec<u8>, id: u8, name: &str) {
        out.push(id);
        out.write_u16::<BigEndian>(name.len() as u16).unwrap();
        out.extend_from_slice(name.as_bytes());
    }

    fn schematic(w: i16, h: i16, l: i16, blocks: &[u8], data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        named(&mut out, 10, "Schematic");
        for (key, value) in [("Width", w), ("Height", h), ("Length", l)] {
            named(&mut out, 2, key);
            out.write_i16::<BigEndian>(value).unwrap();
        }
        named(&mut out, 8, "Materials");
        out.write_u16::<BigEndian>(5).unwrap();
        out.extend_from_slice(b"Alpha");
        for (key, bytes) in [("Blocks", blocks), ("Data", data)] {
            named(&mut out, 7, key);
            out.write_i32::<BigEndian>(bytes.len() as i32).unwrap();
            out.extend_from_slice(bytes);
        }
        named(&mut out, 9, "Entities");
        out.push(10);
        out.write_i32::<BigEndian>(0).unwrap();
        out.push(0);
        out
    }

    #[test]
    fn test_decode_layout() {
        // 2 wide, 2 high, 1 long: stone at (0,0,0), red wool at (1,1,0)
        let blocks = [1, 0, 0, 35];
        let data = [0, 0, 0, 14];
        let grid = decode(Path::new("a.schematic"), &schematic(2, 2, 1, &blocks, &data)).unwrap();
        assert_eq!(grid.len(), 2);
        assert_eq!(grid.get(0, 0, 0), Some(Color::rgb(125, 125, 125)));
        assert_eq!(grid.get(1, 1, 0), Some(DYE_COLORS[14]));
    }

    #[test]
    fn test_missing_blocks() {
        let mut out = Vec::new();
        named(&mut out, 10, "Schematic");
        for key in ["Width", "Height", "Length"] {
            named(&mut out, 2, key);
            out.write_i16::<BigEndian>(1).unwrap();
        }
        out.push(0);
        assert!(decode(Path::new("a.schematic"), &out).is_err());
    }

    #[test]
    fn test_produce_gzip_with_excavate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.schematic");
        let blocks = vec![1u8; 27];
        let raw = schematic(3, 3, 3, &blocks, &[]);

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let grid = SchematicConverter::new(path.clone(), false).produce().unwrap();
        assert_eq!(grid.len(), 27);
        let hollow = SchematicConverter::new(path, true).produce().unwrap();
        assert_eq!(hollow.len(), 26);
    }

    #[test]
    fn test_air_is_empty() {
        assert_eq!(block_color(0, 0), None);
        assert_eq!(block_color(35, 0), Some(DYE_COLORS[0]));
        assert_eq!(block_color(200, 0), block_color(200, 3));
    }
}
