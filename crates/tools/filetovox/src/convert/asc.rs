//! ESRI ASCII grid converter

use crate::types::ConvertError;
use std::path::{Path, PathBuf};
use voxel::{Color, VoxelGrid};

#[derive(Debug, Clone)]
pub struct AscConverter {
    pub path: PathBuf,
}

/// Parsed elevation raster, row 0 being the northern edge
#[derive(Debug, Clone, PartialEq)]
pub struct AscGrid {
    pub ncols: usize,
    pub nrows: usize,
    pub nodata: Option<f32>,
    /// Row-major values, `None` for NODATA cells
    pub cells: Vec<Option<f32>>,
}

impl AscGrid {
    pub fn parse(path: &Path, text: &str) -> Result<Self, ConvertError> {
        let mut ncols = None;
        let mut nrows = None;
        let mut nodata = None;
        let mut tokens = text.split_whitespace().peekable();

        // header: key value pairs until the first number
        while let Some(key) = tokens.peek().copied() {
            if key.parse::<f32>().is_ok() {
                break;
            }
            tokens.next();
            let value = tokens
                .next()
                .ok_or_else(|| ConvertError::parse(path, format!("missing value for {}", key)))?;
            let bad = || ConvertError::parse(path, format!("bad value for {}: {:?}", key, value));

            match key.to_ascii_lowercase().as_str() {
                "ncols" => ncols = Some(value.parse::<usize>().map_err(|_| bad())?),
                "nrows" => nrows = Some(value.parse::<usize>().map_err(|_| bad())?),
                "nodata_value" => nodata = Some(value.parse::<f32>().map_err(|_| bad())?),
                // xllcorner, yllcorner, cellsize: placement only
                _ => {}
            }
        }

        let ncols = ncols.ok_or_else(|| ConvertError::parse(path, "missing ncols"))?;
        let nrows = nrows.ok_or_else(|| ConvertError::parse(path, "missing nrows"))?;

        let mut cells = Vec::with_capacity(ncols * nrows);
        for token in tokens.take(ncols * nrows) {
            let value: f32 = token
                .parse()
                .map_err(|_| ConvertError::parse(path, format!("bad cell value {:?}", token)))?;
            cells.push((Some(value) != nodata).then_some(value));
        }
        if cells.len() < ncols * nrows {
            return Err(ConvertError::parse(
                path,
                format!("expected {} cells, found {}", ncols * nrows, cells.len()),
            ));
        }

        Ok(Self {
            ncols,
            nrows,
            nodata,
            cells,
        })
    }

    /// Cell value, `None` for NODATA
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        self.cells[row * self.ncols + col]
    }

    /// Build the terrain: one column per cell, hollow below the neighbors
    pub fn to_grid(&self) -> VoxelGrid {
        let min = self
            .cells
            .iter()
            .flatten()
            .fold(f32::MAX, |acc, v| acc.min(*v));

        let tops: Vec<Option<u32>> = self
            .cells
            .iter()
            .map(|c| c.map(|v| (v - min).round().max(0.0) as u32))
            .collect();
        let top_at = |col: isize, row: isize| -> Option<u32> {
            if col < 0 || row < 0 || col as usize >= self.ncols || row as usize >= self.nrows {
                return None;
            }
            tops[row as usize * self.ncols + col as usize]
        };
        let max_top = tops.iter().flatten().copied().max().unwrap_or(0);

        let mut grid = VoxelGrid::new();
        for row in 0..self.nrows {
            for col in 0..self.ncols {
                let Some(top) = top_at(col as isize, row as isize) else {
                    continue;
                };
                let (c, r) = (col as isize, row as isize);
                // open edges and NODATA neighbors expose the column to the ground
                let bottom = [(c - 1, r), (c + 1, r), (c, r - 1), (c, r + 1)]
                    .iter()
                    .map(|&(nc, nr)| top_at(nc, nr).unwrap_or(0))
                    .min()
                    .unwrap_or(0)
                    .min(top);

                for y in bottom..=top {
                    grid.set(col as u32, y, row as u32, height_color(y, max_top));
                }
            }
        }
        grid
    }
}

fn height_color(y: u32, max_top: u32) -> Color {
    if max_top == 0 {
        return Color::gray(128);
    }
    let level = 32 + (y as u64 * 223 / max_top as u64) as u32;
    Color::gray(level.min(255) as u8)
}

impl AscConverter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn produce(&self) -> Result<VoxelGrid, ConvertError> {
        let text =
            std::fs::read_to_string(&self.path).map_err(|e| ConvertError::io(&self.path, e))?;
        let asc = AscGrid::parse(&self.path, &text)?;
        if asc.cells.iter().all(Option::is_none) {
            return Err(ConvertError::parse(&self.path, "every cell is NODATA"));
        }
        Ok(asc.to_grid())
    }
}
