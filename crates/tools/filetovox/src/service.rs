//! Conversion orchestration
//!
//! [`convert`] is the single entry point front ends call. It routes mesh
//! inputs to [`MeshConversionService`] and everything else through
//! [`ConversionService`]: dispatch, produce, bounds check, optional palette
//! remap, write, and an optional debug read-back.

use crate::convert::Converter;
use crate::format::InputFormat;
use crate::log::LogSink;
use crate::mesh::{CancelToken, MeshConversionService};
use crate::options::{format_output_destination, ConversionOptions, InputSelection};
use crate::palette_remap::PaletteRemapper;
use crate::types::{ConfigError, ConversionError, ConversionOutcome, Result};
use std::path::{Path, PathBuf};
use voxel::{RunContext, VoxReader, VoxWriter, VoxelGrid};
use voxel::{MAX_WORLD_HEIGHT, MAX_WORLD_LENGTH, MAX_WORLD_WIDTH};

/// Run one conversion request, picking the in-process or mesh2vox branch
pub fn convert(options: ConversionOptions, log: &dyn LogSink, cancel: &CancelToken) -> ConversionOutcome {
    if cancel.is_cancelled() {
        log.log("[INFO] Conversion cancelled.");
        return ConversionOutcome::Cancelled;
    }

    if requires_delegation(&options) {
        if let Err(e) = options.validate_paths() {
            log.log(&e.to_string());
            return ConversionOutcome::failed(e);
        }
        return MeshConversionService::new(options, log).run(cancel);
    }

    ConversionService::new(options, log).run()
}

/// True when the input is a single mesh file handled by mesh2vox
///
/// The legacy pair (`.obj`, `.fbx`) is also delegated here; only a direct
/// call to the in-process dispatcher reports them as no longer supported.
pub fn requires_delegation(options: &ConversionOptions) -> bool {
    match options.input_selection() {
        Some(InputSelection::Single(path)) => InputFormat::classify(&path).requires_delegation(),
        _ => false,
    }
}

/// In-process pipeline for one request
pub struct ConversionService<'a> {
    options: ConversionOptions,
    log: &'a dyn LogSink,
}

impl<'a> ConversionService<'a> {
    pub fn new(options: ConversionOptions, log: &'a dyn LogSink) -> Self {
        Self { options, log }
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    pub fn validate_options(&self) -> std::result::Result<(), ConfigError> {
        self.options.validate()
    }

    pub fn display_arguments(&self) {
        self.options.display_arguments(self.log);
    }

    /// Run the pipeline, logging the failure reason if any
    pub fn run(&self) -> ConversionOutcome {
        match self.try_run() {
            Ok(output) => ConversionOutcome::Succeeded { output },
            Err(e) => {
                self.log.log(&e.to_string());
                tracing::debug!(error = ?e, "conversion failed");
                ConversionOutcome::failed(e)
            }
        }
    }

    /// Run the pipeline and return the written path
    pub fn try_run(&self) -> Result<PathBuf> {
        self.validate_options()?;
        self.display_arguments();

        let ctx = self.options.run_context();
        let converter = Converter::dispatch(&self.options)?.ok_or_else(|| {
            let input = self.options.input().unwrap_or_default();
            let ext = Path::new(input)
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_else(|| input.to_string());
            ConversionError::UnsupportedExtension(ext)
        })?;

        self.log
            .log(&format!("[INFO] Started conversion ({})...", converter.name()));
        let grid = converter.produce(&ctx)?;
        self.write_grid(&ctx, grid)
    }

    /// Validate the grid against the container limits and write it
    pub fn write_grid(&self, ctx: &RunContext, grid: VoxelGrid) -> Result<PathBuf> {
        self.log.log(&format!("[INFO] Vox Width: {}", grid.width()));
        self.log.log(&format!("[INFO] Vox Length: {}", grid.length()));
        self.log.log(&format!("[INFO] Vox Height: {}", grid.height()));

        if !grid.fits_within(MAX_WORLD_WIDTH, MAX_WORLD_LENGTH, MAX_WORLD_HEIGHT) {
            return Err(ConversionError::grid_too_large(
                grid.width(),
                grid.length(),
                grid.height(),
            ));
        }

        let output = self.options.output().ok_or(ConfigError::MissingOutput)?;
        let destination = PathBuf::from(format_output_destination(output));

        let writer = VoxWriter::new(ctx);
        let summary = match &self.options.input_palette_file {
            Some(palette_path) => {
                let remapper = PaletteRemapper::new(palette_path)?;
                let grid = remapper.convert(grid);
                writer.write_model(&destination, Some(remapper.palette()), &grid)
            }
            None => writer.write_model(&destination, None, &grid),
        }
        .map_err(ConversionError::Write)?;

        self.log.log(&format!(
            "[INFO] Wrote {} voxels in {} models ({} colors) to {}",
            summary.voxels,
            summary.models,
            summary.colors,
            summary.path.display()
        ));

        if ctx.debug {
            self.run_debug(&destination);
        }
        Ok(destination)
    }

    /// Read the written file back; problems are reported, not fatal
    pub fn run_debug(&self, path: &Path) {
        match VoxReader::new().load_model(path) {
            Ok(grid) => self.log.log(&format!(
                "[INFO] Debug read-back: {} voxels ({}x{}x{})",
                grid.len(),
                grid.width(),
                grid.length(),
                grid.height()
            )),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "debug read-back failed");
                self.log.log(&format!("[WARNING] Debug read-back failed: {}", e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemorySink;
    use voxel::Color;

    #[test]
    fn test_validation_failure_is_logged() {
        let sink = MemorySink::new();
        let options = ConversionOptions {
            chunk_size: 5,
            ..ConversionOptions::new("in.png", "out.vox")
        };
        let outcome = ConversionService::new(options, &sink).run();
        assert!(matches!(outcome, ConversionOutcome::Failed { .. }));
        assert!(sink.contains("[ERROR] --chunk-size"));
    }

    #[test]
    fn test_write_grid_normalizes_destination() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("model.vox.vox");
        let sink = MemorySink::new();
        let options = ConversionOptions::new("unused.png", output.to_str().unwrap());
        let service = ConversionService::new(options, &sink);

        let mut grid = VoxelGrid::new();
        grid.set(0, 0, 0, Color::WHITE);
        let written = service.write_grid(&RunContext::default(), grid).unwrap();

        assert_eq!(written, dir.path().join("model.vox"));
        assert!(written.exists());
        assert!(sink.contains("[INFO] Vox Width: 1"));
    }

    #[test]
    fn test_debug_readback_logs() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("debug");
        let sink = MemorySink::new();
        let options = ConversionOptions {
            debug: true,
            ..ConversionOptions::new("unused.png", output.to_str().unwrap())
        };
        let service = ConversionService::new(options, &sink);

        let mut grid = VoxelGrid::new();
        grid.set(2, 1, 0, Color::WHITE);
        let ctx = service.options().run_context();
        service.write_grid(&ctx, grid).unwrap();
        assert!(sink.contains("Debug read-back: 1 voxels"));
    }

    #[test]
    fn test_cancel_before_start() {
        let sink = MemorySink::new();
        let token = CancelToken::new();
        token.cancel();
        let outcome = convert(ConversionOptions::new("a.png", "b.vox"), &sink, &token);
        assert_eq!(outcome, ConversionOutcome::Cancelled);
    }

    #[test]
    fn test_mesh_input_is_delegated() {
        assert!(requires_delegation(&ConversionOptions::new("m.GLB", "o.vox")));
        assert!(requires_delegation(&ConversionOptions::new("m.obj", "o.vox")));
        assert!(!requires_delegation(&ConversionOptions::new("m.png", "o.vox")));
        assert!(!requires_delegation(&ConversionOptions::new("a.glb;b.glb", "o.vox")));
    }
}
