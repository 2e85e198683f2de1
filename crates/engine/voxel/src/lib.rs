//! Voxel data model for FileToVox
//!
//! This crate holds everything that sits between a format converter and the
//! MagicaVoxel `.vox` container:
//!
//! - [`VoxelGrid`]: sparse, deterministic (x, y, z) → [`Color`] map, Y-up
//! - [`Palette`]: ordered, bounded color list, loadable from an image
//! - [`quantize`]: median cut reduction of a grid's colors
//! - [`RunContext`]: per-run settings consumed by converters and the writer
//! - [`io`]: chunked `.vox` writer and scene-graph aware reader
//!
//! ## Coordinate System
//!
//! The grid is Y-up: `x` spans the width, `z` the length and `y` the height.
//! MagicaVoxel is Z-up, so the writer and reader swap Y and Z at the
//! container boundary.
//!
//! ## Quick Start
//!
//! ```no_run
//! use voxel::{Color, RunContext, VoxelGrid};
//! use voxel::io::VoxWriter;
//! use std::path::Path;
//!
//! let mut grid = VoxelGrid::new();
//! grid.set(0, 0, 0, Color::rgb(255, 0, 0));
//! grid.set(1, 0, 0, Color::rgb(0, 255, 0));
//!
//! let ctx = RunContext::default();
//! VoxWriter::new(&ctx)
//!     .write_model(Path::new("out.vox"), None, &grid)
//!     .expect("write failed");
//! ```

pub mod color;
pub mod context;
pub mod grid;
pub mod io;
pub mod palette;
pub mod quantize;

pub use color::Color;
pub use context::RunContext;
pub use grid::{VoxelGrid, VoxelPos};
pub use io::{VoxError, VoxReader, VoxWriter, WriteSummary};
pub use palette::Palette;
pub use quantize::{median_cut, quantize_grid};

/// Maximum model width (x) MagicaVoxel accepts in one scene
pub const MAX_WORLD_WIDTH: u32 = 2000;

/// Maximum model length (z in grid space, y in MagicaVoxel space)
pub const MAX_WORLD_LENGTH: u32 = 2000;

/// Maximum model height (y in grid space, z in MagicaVoxel space)
pub const MAX_WORLD_HEIGHT: u32 = 1000;

/// Number of slots in a `.vox` palette chunk
pub const MAX_PALETTE_SIZE: usize = 256;

/// Colors a `.vox` file can address; slot index 0 is reserved for "empty"
pub const MAX_PALETTE_COLORS: usize = MAX_PALETTE_SIZE - 1;
