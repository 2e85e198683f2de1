//! FileToVox: convert heightmaps, point clouds, voxel and schematic files to
//! MagicaVoxel `.vox`
//!
//! # Pipeline
//!
//! ```text
//! ConversionOptions ─ validate ─┬─ Converter::dispatch ─ produce ─ bounds ─ [palette] ─ VoxWriter
//!                               └─ MeshConversionService (mesh2vox child process)
//! ```
//!
//! Progress is reported as text lines through a [`LogSink`]; the final
//! status of a request is a [`ConversionOutcome`].
//!
//! # Example
//!
//! ```no_run
//! use filetovox::{convert, CancelToken, ConversionOptions};
//!
//! let options = ConversionOptions::new("terrain.png", "terrain.vox");
//! let log = |line: &str| println!("{}", line);
//! let outcome = convert(options, &log, &CancelToken::new());
//! assert!(outcome.is_success());
//! ```

pub mod convert;
pub mod format;
pub mod log;
pub mod mesh;
pub mod options;
pub mod palette_remap;
pub mod service;
pub mod settings;
pub mod types;

pub use convert::Converter;
pub use format::{InputFormat, MeshFormat};
pub use log::{ChannelSink, LogSink, MemorySink, NullSink};
pub use mesh::{CancelToken, MeshConversionService, MeshStage};
pub use options::{format_output_destination, ConversionOptions, InputSelection};
pub use palette_remap::PaletteRemapper;
pub use service::{convert, ConversionService};
pub use settings::Settings;
pub use types::{ConfigError, ConversionError, ConversionOutcome, ConvertError, MeshError, Result};
