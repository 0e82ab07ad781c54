//! armature-export - offline skeletal animation converter
//!
//! Imports animations from glTF files and writes them as runtime (or raw)
//! animation archives, following a JSON configuration. Also exports glTF
//! skins as skeleton archives.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use armature_export::{AnimationConverter, ConvertOptions, EndianMode, GltfImporter, skeleton};

#[derive(Parser)]
#[command(name = "armature-export")]
#[command(about = "Skeletal animation export tool")]
#[command(version)]
struct Cli {
    /// Logging verbosity (RUST_LOG overrides it when set)
    #[arg(long, value_enum, default_value_t = LogLevel::Standard, global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    /// Errors only
    Silent,
    Standard,
    Verbose,
}

impl LogLevel {
    fn level(self) -> Level {
        match self {
            LogLevel::Silent => Level::ERROR,
            LogLevel::Standard => Level::INFO,
            LogLevel::Verbose => Level::DEBUG,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Convert the animations of a source file
    Animation(AnimationArgs),

    /// Export a skeleton archive from a glTF skin
    Skeleton {
        /// Input glTF/GLB file
        input: PathBuf,

        /// Output skeleton archive (default: input with .skel extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skin index (default: first skin)
        #[arg(short, long)]
        skin: Option<usize>,

        /// Write the raw joint hierarchy instead of the built skeleton
        #[arg(long)]
        raw: bool,

        /// Byte order of the archive
        #[arg(long, value_enum, default_value_t = EndianMode::Native)]
        endian: EndianMode,

        /// List available skins instead of exporting
        #[arg(long)]
        list: bool,
    },
}

#[derive(Args)]
struct AnimationArgs {
    /// Source animation file (glTF/GLB)
    #[arg(long)]
    file: PathBuf,

    /// Skeleton archive, raw or built
    #[arg(long)]
    skeleton: PathBuf,

    /// Configuration as an inline JSON document
    #[arg(long, default_value = "{}", conflicts_with = "config_file")]
    config: String,

    /// Configuration read from a JSON file
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// Byte order of the output archives
    #[arg(long, value_enum, default_value_t = EndianMode::Native)]
    endian: EndianMode,

    /// Sampling rate in hertz, 0 keeps authored linear keys
    #[arg(long, default_value_t = 0.0, value_parser = parse_sampling_rate)]
    sampling_rate: f32,
}

fn parse_sampling_rate(value: &str) -> Result<f32, String> {
    let rate: f32 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    if !rate.is_finite() || rate < 0.0 {
        return Err(format!("sampling rate must be a finite value >= 0, got {value}"));
    }
    Ok(rate)
}

fn run_animation(args: AnimationArgs) -> Result<bool> {
    let config = match &args.config_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration: {:?}", path))?,
        None => args.config,
    };
    let options = ConvertOptions {
        file: args.file,
        skeleton: args.skeleton,
        config,
        endian: args.endian,
        sampling_rate: args.sampling_rate,
    };

    let report = AnimationConverter::new(GltfImporter).convert(&options)?;
    let failures = report.failures().count();
    if failures > 0 {
        tracing::error!(
            "{} of {} animations failed to export",
            failures,
            report.exports.len()
        );
        return Ok(false);
    }
    tracing::info!(
        "Exported {} animations ({} discarded)",
        report.exports.len(),
        report.discarded.len()
    );
    Ok(true)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(cli.log_level.level().into()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let success = match cli.command {
        Commands::Animation(args) => run_animation(args)?,

        Commands::Skeleton {
            input,
            output,
            skin,
            raw,
            endian,
            list,
        } => {
            if list {
                skeleton::list_skins(&input)?;
            } else {
                let output = output.unwrap_or_else(|| input.with_extension("skel"));
                tracing::info!("Exporting skeleton {:?} -> {:?}", input, output);
                skeleton::convert_gltf_skeleton(&input, &output, skin, raw, endian.resolve())?;
                tracing::info!("Done!");
            }
            true
        }
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
