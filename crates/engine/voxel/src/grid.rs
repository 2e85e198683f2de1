//! Sparse voxel grid shared by converters and the writer

use crate::color::Color;
use glam::IVec3;
use std::collections::{BTreeMap, BTreeSet};

/// Integer voxel coordinate (Y-up)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VoxelPos {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl VoxelPos {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }
}

/// Sparse colored voxel grid
///
/// Voxels are kept in coordinate order, so iterating a grid (and therefore
/// writing it) is deterministic. Extents are `max + 1` on each axis and grow
/// as voxels are added; an empty grid has zero extents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoxelGrid {
    voxels: BTreeMap<VoxelPos, Color>,
    width: u32,
    height: u32,
    length: u32,
}

impl VoxelGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a grid from signed positions, shifting the minimum corner to the origin
    pub fn from_signed<I>(voxels: I) -> Self
    where
        I: IntoIterator<Item = (IVec3, Color)>,
    {
        let voxels: Vec<(IVec3, Color)> = voxels.into_iter().collect();
        let min = voxels
            .iter()
            .fold(IVec3::splat(i32::MAX), |acc, (p, _)| acc.min(*p));

        // i64 so spans wider than i32::MAX do not overflow
        let offset = |v: i32, m: i32| (i64::from(v) - i64::from(m)) as u32;

        let mut grid = Self::new();
        for (pos, color) in voxels {
            grid.set(
                offset(pos.x, min.x),
                offset(pos.y, min.y),
                offset(pos.z, min.z),
                color,
            );
        }
        grid
    }

    /// Insert or replace a voxel
    pub fn set(&mut self, x: u32, y: u32, z: u32, color: Color) {
        self.width = self.width.max(x.saturating_add(1));
        self.height = self.height.max(y.saturating_add(1));
        self.length = self.length.max(z.saturating_add(1));
        self.voxels.insert(VoxelPos::new(x, y, z), color);
    }

    pub fn get(&self, x: u32, y: u32, z: u32) -> Option<Color> {
        self.voxels.get(&VoxelPos::new(x, y, z)).copied()
    }

    pub fn contains(&self, x: u32, y: u32, z: u32) -> bool {
        self.voxels.contains_key(&VoxelPos::new(x, y, z))
    }

    /// Extent along x
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Extent along y (up)
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Extent along z
    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    /// Voxels in coordinate order
    pub fn iter(&self) -> impl Iterator<Item = (VoxelPos, Color)> + '_ {
        self.voxels.iter().map(|(p, c)| (*p, *c))
    }

    /// Distinct colors in sorted order
    pub fn colors(&self) -> BTreeSet<Color> {
        self.voxels.values().copied().collect()
    }

    pub fn color_count(&self) -> usize {
        self.colors().len()
    }

    /// Rewrite every voxel color through `f`
    pub fn map_colors<F>(&mut self, mut f: F)
    where
        F: FnMut(Color) -> Color,
    {
        for color in self.voxels.values_mut() {
            *color = f(*color);
        }
    }

    /// Remove every voxel whose six face neighbors are all filled
    ///
    /// Leaves only voxels with at least one face touching air. Extents are
    /// unchanged: a voxel on the outer bound always touches air.
    pub fn excavate(&mut self) {
        let buried: Vec<VoxelPos> = self
            .voxels
            .keys()
            .filter(|p| self.is_buried(**p))
            .copied()
            .collect();

        for pos in buried {
            self.voxels.remove(&pos);
        }
    }

    fn is_buried(&self, p: VoxelPos) -> bool {
        if p.x == 0 || p.y == 0 || p.z == 0 {
            return false;
        }
        if p.x == u32::MAX || p.y == u32::MAX || p.z == u32::MAX {
            return false;
        }
        let neighbors = [
            (p.x - 1, p.y, p.z),
            (p.x + 1, p.y, p.z),
            (p.x, p.y - 1, p.z),
            (p.x, p.y + 1, p.z),
            (p.x, p.y, p.z - 1),
            (p.x, p.y, p.z + 1),
        ];
        neighbors
            .iter()
            .all(|&(x, y, z)| self.contains(x, y, z))
    }

    /// True when every extent is within the given maxima
    pub fn fits_within(&self, max_width: u32, max_length: u32, max_height: u32) -> bool {
        self.width <= max_width && self.length <= max_length && self.height <= max_height
    }
}

impl FromIterator<(VoxelPos, Color)> for VoxelGrid {
    fn from_iter<T: IntoIterator<Item = (VoxelPos, Color)>>(iter: T) -> Self {
        let mut grid = VoxelGrid::new();
        for (p, c) in iter {
            grid.set(p.x, p.y, p.z, c);
        }
        grid
    }
}
