//! Point cloud converters (CSV, XYZ, PLY)
//!
//! All three formats are read into a flat list of points, then voxelized the
//! same way: the bounding box is scaled so its longest axis spans
//! `grid_size` voxels, source `z` becomes grid `y` (up), and points sharing a
//! voxel average their colors.

use crate::types::ConvertError;
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use glam::Vec3;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use voxel::{Color, VoxelGrid, VoxelPos};

/// Source layout of a point cloud file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointCloudFormat {
    /// `x,y,z[,r,g,b]` per line, optional header
    Csv,
    /// Whitespace separated `x y z [r g b]`
    Xyz,
    /// Stanford PLY vertex element (ascii or binary)
    Ply,
}

#[derive(Debug, Clone)]
pub struct PointCloudConverter {
    pub path: PathBuf,
    pub format: PointCloudFormat,
    pub grid_size: f32,
    pub color_limit: usize,
}

/// One sample of the cloud
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub position: Vec3,
    pub color: Color,
}

impl PointCloudConverter {
    pub fn new(path: PathBuf, format: PointCloudFormat, grid_size: f32, color_limit: usize) -> Self {
        Self {
            path,
            format,
            grid_size,
            color_limit,
        }
    }

    pub fn produce(&self) -> Result<VoxelGrid, ConvertError> {
        let points = match self.format {
            PointCloudFormat::Csv | PointCloudFormat::Xyz => {
                let text = std::fs::read_to_string(&self.path)
                    .map_err(|e| ConvertError::io(&self.path, e))?;
                parse_delimited(&self.path, &text, self.format)?
            }
            PointCloudFormat::Ply => {
                let bytes =
                    std::fs::read(&self.path).map_err(|e| ConvertError::io(&self.path, e))?;
                parse_ply(&self.path, &bytes)?
            }
        };

        if points.is_empty() {
            return Err(ConvertError::parse(&self.path, "no points found"));
        }

        let grid = voxelize(&points, self.grid_size);
        tracing::debug!(
            path = %self.path.display(),
            points = points.len(),
            voxels = grid.len(),
            "voxelized point cloud"
        );
        Ok(grid)
    }
}

/// Scale points into a grid whose longest axis spans `grid_size` voxels
pub fn voxelize(points: &[Point], grid_size: f32) -> VoxelGrid {
    let (min, max) = points.iter().fold(
        (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
        |(lo, hi), p| (lo.min(p.position), hi.max(p.position)),
    );

    let cells = grid_size.floor().max(1.0);
    let longest = (max - min).max_element();
    let scale = if longest > 0.0 { cells / longest } else { 0.0 };

    // sums of r, g, b and the sample count per voxel
    let mut buckets: BTreeMap<VoxelPos, [u64; 4]> = BTreeMap::new();
    for point in points {
        let local = ((point.position - min) * scale)
            .floor()
            .clamp(Vec3::ZERO, Vec3::splat(cells - 1.0));
        // z-up source into y-up grid
        let pos = VoxelPos::new(local.x as u32, local.z as u32, local.y as u32);

        let bucket = buckets.entry(pos).or_insert([0; 4]);
        bucket[0] += point.color.r as u64;
        bucket[1] += point.color.g as u64;
        bucket[2] += point.color.b as u64;
        bucket[3] += 1;
    }

    buckets
        .into_iter()
        .map(|(pos, [r, g, b, n])| {
            let avg = |sum: u64| ((sum + n / 2) / n) as u8;
            (pos, Color::rgb(avg(r), avg(g), avg(b)))
        })
        .collect()
}

fn parse_delimited(
    path: &Path,
    text: &str,
    format: PointCloudFormat,
) -> Result<Vec<Point>, ConvertError> {
    match format {
        PointCloudFormat::Csv => parse_csv(path, text),
        _ => parse_xyz(path, text),
    }
}

fn parse_csv(path: &Path, text: &str) -> Result<Vec<Point>, ConvertError> {
    // some exporters use ';' where ',' is the decimal separator
    let delimiter = match text.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some(first) if first.contains(';') && !first.contains(',') => b';',
        _ => b',',
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut rows = RowParser::new(path);
    for record in reader.records() {
        let record = record.map_err(|e| ConvertError::parse(path, format!("CSV: {}", e)))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
        rows.push(line, record.iter())?;
    }
    Ok(rows.points)
}

fn parse_xyz(path: &Path, text: &str) -> Result<Vec<Point>, ConvertError> {
    let mut rows = RowParser::new(path);
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        rows.push(line_no + 1, line.split_whitespace())?;
    }
    Ok(rows.points)
}

/// Turns `x y z [r g b]` rows into points; a non numeric first row is a header
struct RowParser<'a> {
    path: &'a Path,
    points: Vec<Point>,
    seen_row: bool,
}

impl<'a> RowParser<'a> {
    fn new(path: &'a Path) -> Self {
        Self {
            path,
            points: Vec::new(),
            seen_row: false,
        }
    }

    fn push<'f>(
        &mut self,
        line: usize,
        fields: impl Iterator<Item = &'f str>,
    ) -> Result<(), ConvertError> {
        let fields: Vec<&str> = fields.collect();
        let first_row = !self.seen_row;
        self.seen_row = true;

        let values = match fields.iter().map(|f| f.parse::<f32>()).collect::<Result<Vec<_>, _>>() {
            Ok(values) => values,
            Err(_) if first_row => return Ok(()),
            Err(_) => {
                return Err(ConvertError::parse(
                    self.path,
                    format!("line {}: expected numbers, got {:?}", line, fields.join(" ")),
                ))
            }
        };

        if values.len() < 3 {
            return Err(ConvertError::parse(
                self.path,
                format!("line {}: expected at least x, y and z", line),
            ));
        }

        let color = if values.len() >= 6 {
            Color::rgb(
                channel(values[3]),
                channel(values[4]),
                channel(values[5]),
            )
        } else {
            Color::WHITE
        };

        self.points.push(Point {
            position: Vec3::new(values[0], values[1], values[2]),
            color,
        });
        Ok(())
    }
}

fn channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlyEncoding {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ScalarType {
    fn parse(name: &str) -> Option<Self> {
        let ty = match name {
            "char" | "int8" => ScalarType::I8,
            "uchar" | "uint8" => ScalarType::U8,
            "short" | "int16" => ScalarType::I16,
            "ushort" | "uint16" => ScalarType::U16,
            "int" | "int32" => ScalarType::I32,
            "uint" | "uint32" => ScalarType::U32,
            "float" | "float32" => ScalarType::F32,
            "double" | "float64" => ScalarType::F64,
            _ => return None,
        };
        Some(ty)
    }

    fn size(self) -> usize {
        match self {
            ScalarType::I8 | ScalarType::U8 => 1,
            ScalarType::I16 | ScalarType::U16 => 2,
            ScalarType::I32 | ScalarType::U32 | ScalarType::F32 => 4,
            ScalarType::F64 => 8,
        }
    }

    fn is_float(self) -> bool {
        matches!(self, ScalarType::F32 | ScalarType::F64)
    }

    fn read<B: ByteOrder>(self, cursor: &mut Cursor<&[u8]>) -> std::io::Result<f64> {
        Ok(match self {
            ScalarType::I8 => cursor.read_i8()? as f64,
            ScalarType::U8 => cursor.read_u8()? as f64,
            ScalarType::I16 => cursor.read_i16::<B>()? as f64,
            ScalarType::U16 => cursor.read_u16::<B>()? as f64,
            ScalarType::I32 => cursor.read_i32::<B>()? as f64,
            ScalarType::U32 => cursor.read_u32::<B>()? as f64,
            ScalarType::F32 => cursor.read_f32::<B>()? as f64,
            ScalarType::F64 => cursor.read_f64::<B>()?,
        })
    }
}

#[derive(Debug, Clone)]
enum PlyProperty {
    Scalar { name: String, ty: ScalarType },
    List { count: ScalarType, item: ScalarType },
}

#[derive(Debug, Clone)]
struct PlyElement {
    name: String,
    count: usize,
    properties: Vec<PlyProperty>,
}

impl PlyElement {
    fn scalar_index(&self, names: &[&str]) -> Option<(usize, ScalarType)> {
        self.properties.iter().enumerate().find_map(|(i, p)| match p {
            PlyProperty::Scalar { name, ty } if names.contains(&name.as_str()) => Some((i, *ty)),
            _ => None,
        })
    }

    fn has_lists(&self) -> bool {
        self.properties
            .iter()
            .any(|p| matches!(p, PlyProperty::List { .. }))
    }

    /// Advance past one binary row, reading list lengths as needed
    fn skip_row<B: ByteOrder>(&self, cursor: &mut Cursor<&[u8]>) -> std::io::Result<()> {
        for property in &self.properties {
            let bytes = match property {
                PlyProperty::Scalar { ty, .. } => ty.size(),
                PlyProperty::List { count, item } => count.read::<B>(cursor)? as usize * item.size(),
            };
            let mut skip = vec![0u8; bytes];
            cursor.read_exact(&mut skip)?;
        }
        Ok(())
    }
}

struct PlyHeader {
    encoding: PlyEncoding,
    elements: Vec<PlyElement>,
    body_offset: usize,
}

fn parse_ply_header(path: &Path, bytes: &[u8]) -> Result<PlyHeader, ConvertError> {
    const END: &[u8] = b"end_header";
    let end = bytes
        .windows(END.len())
        .position(|w| w == END)
        .ok_or_else(|| ConvertError::parse(path, "missing end_header"))?;
    let mut body_offset = end + END.len();
    if bytes.get(body_offset) == Some(&b'\r') {
        body_offset += 1;
    }
    if bytes.get(body_offset) == Some(&b'\n') {
        body_offset += 1;
    }

    let header = String::from_utf8_lossy(&bytes[..end]);
    let mut lines = header.lines().map(str::trim);
    if lines.next() != Some("ply") {
        return Err(ConvertError::parse(path, "missing ply magic"));
    }

    let mut encoding = None;
    let mut elements: Vec<PlyElement> = Vec::new();

    for line in lines {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["format", kind, ..] => {
                encoding = Some(match *kind {
                    "ascii" => PlyEncoding::Ascii,
                    "binary_little_endian" => PlyEncoding::BinaryLittleEndian,
                    "binary_big_endian" => PlyEncoding::BinaryBigEndian,
                    other => {
                        return Err(ConvertError::Unsupported {
                            format: "PLY",
                            path: path.to_path_buf(),
                            message: format!("encoding {}", other),
                        })
                    }
                });
            }
            ["element", name, count] => {
                let count = count
                    .parse()
                    .map_err(|_| ConvertError::parse(path, format!("bad element count {:?}", count)))?;
                elements.push(PlyElement {
                    name: name.to_string(),
                    count,
                    properties: Vec::new(),
                });
            }
            ["property", "list", count, item, _name] => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| ConvertError::parse(path, "property before element"))?;
                let (count, item) = ScalarType::parse(count)
                    .zip(ScalarType::parse(item))
                    .ok_or_else(|| ConvertError::parse(path, format!("bad list property {:?}", line)))?;
                element.properties.push(PlyProperty::List { count, item });
            }
            ["property", ty, name] => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| ConvertError::parse(path, "property before element"))?;
                let ty = ScalarType::parse(ty)
                    .ok_or_else(|| ConvertError::parse(path, format!("bad property type {:?}", ty)))?;
                element.properties.push(PlyProperty::Scalar {
                    name: name.to_string(),
                    ty,
                });
            }
            _ => {} // comment, obj_info
        }
    }

    let encoding = encoding.ok_or_else(|| ConvertError::parse(path, "missing format line"))?;
    Ok(PlyHeader {
        encoding,
        elements,
        body_offset,
    })
}

fn parse_ply(path: &Path, bytes: &[u8]) -> Result<Vec<Point>, ConvertError> {
    let header = parse_ply_header(path, bytes)?;
    let body = &bytes[header.body_offset..];

    match header.encoding {
        PlyEncoding::Ascii => read_ply_ascii(path, &header, body),
        PlyEncoding::BinaryLittleEndian => read_ply_binary::<LittleEndian>(path, &header, body),
        PlyEncoding::BinaryBigEndian => read_ply_binary::<BigEndian>(path, &header, body),
    }
}

/// Column layout of the vertex element
struct VertexLayout {
    xyz: [usize; 3],
    rgb: Option<([usize; 3], bool)>,
}

impl VertexLayout {
    fn of(path: &Path, element: &PlyElement) -> Result<Self, ConvertError> {
        let find = |names: &[&str]| element.scalar_index(names);
        let (x, y, z) = match (find(&["x"]), find(&["y"]), find(&["z"])) {
            (Some(x), Some(y), Some(z)) => (x.0, y.0, z.0),
            _ => return Err(ConvertError::parse(path, "vertex element lacks x, y or z")),
        };

        let rgb = match (
            find(&["red", "r", "diffuse_red"]),
            find(&["green", "g", "diffuse_green"]),
            find(&["blue", "b", "diffuse_blue"]),
        ) {
            (Some(r), Some(g), Some(b)) => Some(([r.0, g.0, b.0], r.1.is_float())),
            _ => None,
        };

        Ok(Self { xyz: [x, y, z], rgb })
    }

    fn point(&self, row: &[f64]) -> Point {
        let position = Vec3::new(
            row[self.xyz[0]] as f32,
            row[self.xyz[1]] as f32,
            row[self.xyz[2]] as f32,
        );
        let color = match self.rgb {
            Some((idx, normalized)) => {
                let c = |i: usize| {
                    let v = if normalized { row[i] * 255.0 } else { row[i] };
                    channel(v as f32)
                };
                Color::rgb(c(idx[0]), c(idx[1]), c(idx[2]))
            }
            None => Color::WHITE,
        };
        Point { position, color }
    }
}

fn read_ply_ascii(path: &Path, header: &PlyHeader, body: &[u8]) -> Result<Vec<Point>, ConvertError> {
    let text = String::from_utf8_lossy(body);
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let mut points = Vec::new();

    for element in &header.elements {
        if element.name != "vertex" {
            for _ in 0..element.count {
                lines.next();
            }
            continue;
        }

        let layout = VertexLayout::of(path, element)?;
        for i in 0..element.count {
            let line = lines
                .next()
                .ok_or_else(|| ConvertError::parse(path, format!("vertex {} missing", i)))?;
            let row: Vec<f64> = line
                .split_whitespace()
                .take(element.properties.len())
                .map(|t| t.parse::<f64>())
                .collect::<Result<_, _>>()
                .map_err(|_| ConvertError::parse(path, format!("vertex {}: bad number", i)))?;
            if row.len() < element.properties.len() || element.has_lists() {
                return Err(ConvertError::parse(path, format!("vertex {}: bad row", i)));
            }
            points.push(layout.point(&row));
        }
        break;
    }

    Ok(points)
}

fn read_ply_binary<B: ByteOrder>(
    path: &Path,
    header: &PlyHeader,
    body: &[u8],
) -> Result<Vec<Point>, ConvertError> {
    let mut cursor = Cursor::new(body);
    let mut points = Vec::new();
    let truncated = |_: std::io::Error| ConvertError::parse(path, "unexpected end of data");

    for element in &header.elements {
        if element.name != "vertex" {
            for _ in 0..element.count {
                element.skip_row::<B>(&mut cursor).map_err(truncated)?;
            }
            continue;
        }

        if element.has_lists() {
            return Err(ConvertError::Unsupported {
                format: "PLY",
                path: path.to_path_buf(),
                message: "list properties in the vertex element".to_string(),
            });
        }

        let layout = VertexLayout::of(path, element)?;
        let mut row = vec![0.0f64; element.properties.len()];
        for _ in 0..element.count {
            for (slot, property) in row.iter_mut().zip(&element.properties) {
                if let PlyProperty::Scalar { ty, .. } = property {
                    *slot = ty.read::<B>(&mut cursor).map_err(truncated)?;
                }
            }
            points.push(layout.point(&row));
        }
        break;
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn point(x: f32, y: f32, z: f32, color: Color) -> Point {
        Point {
            position: Vec3::new(x, y, z),
            color,
        }
    }

    #[test]
    fn test_voxelize_scales_longest_axis() {
        let points = vec![
            point(0.0, 0.0, 0.0, Color::WHITE),
            point(100.0, 0.0, 50.0, Color::WHITE),
        ];
        let grid = voxelize(&points, 20.0);
        assert_eq!(grid.width(), 20);
        // source z is up
        assert_eq!(grid.height(), 11);
        assert_eq!(grid.length(), 1);
    }

    #[test]
    fn test_voxelize_averages_colors() {
        let points = vec![
            point(0.0, 0.0, 0.0, Color::rgb(100, 0, 0)),
            point(0.01, 0.0, 0.0, Color::rgb(200, 0, 0)),
            point(10.0, 0.0, 0.0, Color::rgb(0, 0, 255)),
        ];
        let grid = voxelize(&points, 10.0);
        assert_eq!(grid.get(0, 0, 0), Some(Color::rgb(150, 0, 0)));
        assert_eq!(grid.get(9, 0, 0), Some(Color::rgb(0, 0, 255)));
        assert_eq!(grid.len(), 2);
    }

    #[test]
    fn test_voxelize_single_point() {
        let grid = voxelize(&[point(5.0, 5.0, 5.0, Color::WHITE)], 10.0);
        assert_eq!(grid.len(), 1);
        assert!(grid.contains(0, 0, 0));
    }

    #[test]
    fn test_parse_csv_with_header() {
        let text = "x,y,z,r,g,b\n0,0,0,255,0,0\n\n1.5,2,3,0,255,0\n";
        let points = parse_delimited(Path::new("a.csv"), text, PointCloudFormat::Csv).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].color, Color::rgb(255, 0, 0));
        assert_eq!(points[1].position, Vec3::new(1.5, 2.0, 3.0));
    }

    #[test]
    fn test_parse_csv_semicolons() {
        let text = "1;2;3\n4;5;6;10;20;30\n";
        let points = parse_delimited(Path::new("a.csv"), text, PointCloudFormat::Csv).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].color, Color::rgb(10, 20, 30));
    }

    #[test]
    fn test_parse_csv_reports_line() {
        let text = "0,0,0\n1,2\n";
        let err = parse_delimited(Path::new("a.csv"), text, PointCloudFormat::Csv).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{}", err);
    }

    #[test]
    fn test_parse_xyz_without_colors() {
        let text = "# comment\n1 2 3\n4 5 6\n";
        let points = parse_delimited(Path::new("a.xyz"), text, PointCloudFormat::Xyz).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].color, Color::WHITE);
    }

    #[test]
    fn test_parse_rejects_garbage_after_data() {
        let text = "1 2 3\nfoo bar baz\n";
        let err = parse_delimited(Path::new("a.xyz"), text, PointCloudFormat::Xyz).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_ply_ascii() {
        let ply = "ply\nformat ascii 1.0\ncomment test\nelement vertex 2\n\
                   property float x\nproperty float y\nproperty float z\n\
                   property uchar red\nproperty uchar green\nproperty uchar blue\n\
                   element face 0\nproperty list uchar int vertex_indices\nend_header\n\
                   0 0 0 255 0 0\n1 1 1 0 0 255\n";
        let points = parse_ply(Path::new("a.ply"), ply.as_bytes()).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].color, Color::rgb(255, 0, 0));
        assert_eq!(points[1].position, Vec3::ONE);
    }

    fn binary_ply<B: ByteOrder>(encoding: &str) -> Vec<u8> {
        let mut bytes = format!(
            "ply\nformat {} 1.0\nelement vertex 2\nproperty float x\nproperty float y\n\
             property float z\nproperty uchar red\nproperty uchar green\nproperty uchar blue\nend_header\n",
            encoding
        )
        .into_bytes();
        for (p, c) in [([0.0f32, 0.0, 0.0], [10u8, 20, 30]), ([2.0, 4.0, 8.0], [40, 50, 60])] {
            for v in p {
                bytes.write_f32::<B>(v).unwrap();
            }
            bytes.extend_from_slice(&c);
        }
        bytes
    }

    #[test]
    fn test_parse_ply_binary_both_endians() {
        for bytes in [
            binary_ply::<LittleEndian>("binary_little_endian"),
            binary_ply::<BigEndian>("binary_big_endian"),
        ] {
            let points = parse_ply(Path::new("a.ply"), &bytes).unwrap();
            assert_eq!(points.len(), 2);
            assert_eq!(points[1].position, Vec3::new(2.0, 4.0, 8.0));
            assert_eq!(points[1].color, Color::rgb(40, 50, 60));
        }
    }

    #[test]
    fn test_parse_ply_truncated() {
        let mut bytes = binary_ply::<LittleEndian>("binary_little_endian");
        bytes.truncate(bytes.len() - 5);
        assert!(parse_ply(Path::new("a.ply"), &bytes).is_err());
    }

    #[test]
    fn test_produce_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.csv");
        std::fs::write(&path, "0,0,0\n9,9,9\n").unwrap();
        let converter = PointCloudConverter::new(path, PointCloudFormat::Csv, 10.0, 255);
        let grid = converter.produce().unwrap();
        assert_eq!(grid.len(), 2);
        assert!(grid.contains(9, 9, 9));
    }

    #[test]
    fn test_empty_cloud_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.xyz");
        std::fs::write(&path, "\n").unwrap();
        let converter = PointCloudConverter::new(path, PointCloudFormat::Xyz, 10.0, 255);
        assert!(matches!(converter.produce(), Err(ConvertError::Parse { .. })));
    }
}
