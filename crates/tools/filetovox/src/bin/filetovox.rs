//! FileToVox CLI - convert files to MagicaVoxel .vox
//!
//! Command-line front end for the conversion pipeline and the mesh2vox
//! integration settings.

use anyhow::Context;
use clap::{Parser, Subcommand};
use filetovox::options::default_output_for;
use filetovox::{CancelToken, ConversionOptions, ConversionOutcome, InputFormat, Settings};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "filetovox")]
#[command(
    author,
    version,
    about = "Convert heightmaps, point clouds, voxel and schematic files to MagicaVoxel .vox"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a file, a folder of images or a ';' separated image list
    Convert {
        /// Input file, folder, or list of images separated by ';'
        #[arg(short, long)]
        input: String,

        /// Output .vox path (default: input with a .vox extension)
        #[arg(short, long)]
        output: Option<String>,

        /// Keep the image colors on heightmaps
        #[arg(short, long)]
        color: bool,

        /// Image whose pixels color the heightmap
        #[arg(long)]
        color_from_file: Option<PathBuf>,

        /// Maximum number of colors (0-256)
        #[arg(long, default_value_t = 256, allow_negative_numbers = true)]
        color_limit: i32,

        /// Size of the models written to the .vox file (11-256)
        #[arg(long, default_value_t = 128, allow_negative_numbers = true)]
        chunk_size: i32,

        /// Remove voxels with no face touching air
        #[arg(short, long)]
        excavate: bool,

        /// Number of heightmap layers (1 = flat)
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        heightmap: i32,

        /// Palette image the output colors are snapped to
        #[arg(short, long)]
        palette: Option<PathBuf>,

        /// Voxels along the longest axis of a point cloud (10-2000)
        #[arg(long, default_value_t = 10.0, allow_negative_numbers = true)]
        grid_size: f32,

        /// Read the output back after writing it
        #[arg(short, long)]
        debug: bool,

        /// Keep every source color (fails above 255 colors)
        #[arg(long)]
        disable_quantization: bool,

        /// mesh2vox voxel resolution (default: from settings)
        #[arg(long)]
        mesh_resolution: Option<i32>,

        /// Path to mesh2vox.py (default: from settings)
        #[arg(long)]
        mesh2vox_script: Option<PathBuf>,

        /// Python interpreter for mesh2vox (default: from settings)
        #[arg(long)]
        mesh2vox_python: Option<String>,
    },

    /// Show which converter handles a path
    Detect {
        /// File or folder to inspect
        path: PathBuf,
    },

    /// Show or update the persisted mesh2vox settings
    Settings {
        /// Path to mesh2vox.py
        #[arg(long)]
        mesh2vox_script: Option<PathBuf>,

        /// Python interpreter for mesh2vox
        #[arg(long)]
        mesh2vox_python: Option<String>,

        /// Default mesh2vox voxel resolution
        #[arg(long)]
        mesh_resolution: Option<i32>,
    },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            output,
            color,
            color_from_file,
            color_limit,
            chunk_size,
            excavate,
            heightmap,
            palette,
            grid_size,
            debug,
            disable_quantization,
            mesh_resolution,
            mesh2vox_script,
            mesh2vox_python,
        } => {
            init_tracing(debug);
            let settings = Settings::load();

            let output = output.unwrap_or_else(|| {
                default_output_for(Path::new(first_input(&input)))
                    .to_string_lossy()
                    .into_owned()
            });

            let options = ConversionOptions {
                input_path: Some(input),
                output_path: Some(output),
                input_color_file: color_from_file,
                input_palette_file: palette,
                excavate,
                color,
                disable_quantization,
                debug,
                grid_size,
                heightmap,
                color_limit,
                chunk_size,
                mesh_resolution: mesh_resolution.unwrap_or(settings.mesh_resolution),
                mesh2vox_script: mesh2vox_script.or(settings.mesh2vox_script),
                mesh2vox_python: mesh2vox_python.or(settings.mesh2vox_python),
            };

            let outcome = run_conversion(options).await?;
            match outcome {
                ConversionOutcome::Succeeded { .. } => {}
                ConversionOutcome::Failed { .. } | ConversionOutcome::Cancelled => {
                    std::process::exit(1);
                }
            }
        }

        Commands::Detect { path } => {
            init_tracing(false);
            let format = InputFormat::classify(&path);
            println!("Path:    {}", path.display());
            println!("Format:  {}", format.describe());
            println!(
                "Route:   {}",
                if format.requires_delegation() {
                    "mesh2vox (external)"
                } else if format == InputFormat::Unsupported {
                    "none"
                } else {
                    "built-in converter"
                }
            );
        }

        Commands::Settings {
            mesh2vox_script,
            mesh2vox_python,
            mesh_resolution,
        } => {
            init_tracing(false);
            let mut settings = Settings::load();
            let changed =
                mesh2vox_script.is_some() || mesh2vox_python.is_some() || mesh_resolution.is_some();

            if let Some(script) = mesh2vox_script {
                settings.mesh2vox_script = Some(script);
            }
            if let Some(python) = mesh2vox_python {
                settings.mesh2vox_python = Some(python);
            }
            if let Some(resolution) = mesh_resolution {
                settings.mesh_resolution = resolution.clamp(1, 256);
            }

            if changed {
                let path = settings.save().context("Failed to save settings")?;
                println!("Saved settings to {}", path.display());
            } else if let Some(path) = Settings::config_path() {
                println!("Settings file: {}", path.display());
            }

            let or_unset = |value: Option<String>| value.unwrap_or_else(|| "(not set)".to_string());
            println!();
            println!(
                "  mesh2vox script:  {}",
                or_unset(settings.mesh2vox_script.map(|p| p.display().to_string()))
            );
            println!("  mesh2vox python:  {}", or_unset(settings.mesh2vox_python));
            println!("  mesh resolution:  {}", settings.mesh_resolution);
        }
    }

    Ok(())
}

/// Run the conversion on a blocking worker; Ctrl-C requests cancellation
async fn run_conversion(options: ConversionOptions) -> anyhow::Result<ConversionOutcome> {
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")?
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    progress.set_message("Converting...");
    progress.enable_steady_tick(Duration::from_millis(100));

    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let worker_progress = progress.clone();
    let mut task = tokio::task::spawn_blocking(move || {
        let log = move |line: &str| worker_progress.println(line);
        filetovox::convert(options, &log, &worker_cancel)
    });

    let outcome = tokio::select! {
        joined = &mut task => joined?,
        _ = tokio::signal::ctrl_c() => {
            progress.set_message("Cancelling...");
            cancel.cancel();
            task.await?
        }
    };

    match &outcome {
        ConversionOutcome::Succeeded { output } => {
            progress.finish_with_message(format!("Converted → {}", output.display()));
        }
        ConversionOutcome::Failed { .. } => progress.abandon_with_message("Conversion failed"),
        ConversionOutcome::Cancelled => progress.abandon_with_message("Conversion cancelled"),
    }
    Ok(outcome)
}

/// First entry of a `;` separated input list
fn first_input(input: &str) -> &str {
    input
        .split(';')
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(input)
}
