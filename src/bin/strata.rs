//! Binary entry point for the strata CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Detect the formats inside an image
//! strata analyze disk.raw
//!
//! # List the partitions of the first detected volume system
//! strata list disk.raw
//!
//! # SHA-256 of one partition's data stream
//! strata hash disk.raw --partition 1
//! ```

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use sha2::{Digest, Sha256};

use strata::analyzer::FormatAnalysis;
use strata::definitions::FormatCategory;
use strata::error::{StrataError, StrataResult};
use strata::output::{
    emit_response, AnalyzeResponse, ErrorResponse, HashResponse, ListResponse, PartitionInfo,
};
use strata::path::{PathSpec, PathSpecFactory};
use strata::resolver::ResolverContext;
use strata::vfs::{FileObjectRef, SeekFrom};

// ============================================================================
// CLI Structure
// ============================================================================

/// Inspect layered storage media images.
#[derive(Parser)]
#[command(name = "strata", version, about = "Inspect layered storage media images")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Emit responses as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    /// Log level for tracing output.
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Detect the formats inside an image.
    Analyze {
        /// Path to the image file.
        image: PathBuf,
    },
    /// List the partitions of the first detected volume system.
    List {
        /// Path to the image file.
        image: PathBuf,
    },
    /// SHA-256 of the image, or of one partition's data stream.
    Hash {
        /// Path to the image file.
        image: PathBuf,
        /// 1-based partition number (as in p1).
        #[arg(long)]
        partition: Option<u32>,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.global.log_level);

    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if cli.global.json {
                let response = ErrorResponse::new(err.to_string());
                let _ = emit_response(&response, &mut io::stdout());
                let _ = io::stdout().flush();
            } else {
                eprintln!("strata: {}", err);
            }
            ExitCode::from(exit_code(&err))
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Map an error to a CLI exit code.
fn exit_code(err: &StrataError) -> u8 {
    match err {
        StrataError::PathSpec { .. } | StrataError::NotSupported { .. } => 2,
        StrataError::BackEnd { .. }
        | StrataError::Access { .. }
        | StrataError::MountPoint { .. }
        | StrataError::KeyChain { .. }
        | StrataError::NotRegistered { .. } => 3,
        _ => 10,
    }
}

/// Execute the CLI command.
fn execute(cli: &Cli) -> StrataResult<()> {
    match &cli.command {
        Command::Analyze { image } => execute_analyze(&cli.global, image),
        Command::List { image } => execute_list(&cli.global, image),
        Command::Hash { image, partition } => execute_hash(&cli.global, image, *partition),
    }
}

// ============================================================================
// Command Executors
// ============================================================================

/// Build the root `OS` path spec for an image file.
fn os_spec(image: &Path) -> StrataResult<Arc<PathSpec>> {
    PathSpecFactory::global().new_path_spec(
        "OS",
        &[("location", image.to_string_lossy().as_ref().into())],
        None,
    )
}

/// Open the image and run the analyzer over it.
fn analyze_image(image: &Path, context: &mut ResolverContext) -> StrataResult<FormatAnalysis> {
    let spec = os_spec(image)?;
    let resolver = strata::default_resolver();
    let handle = resolver.open_file_object(&spec, context)?;
    let analysis = {
        let mut file_object = handle.borrow_mut();
        strata::default_analyzer().analyze(file_object.as_mut())?
    };
    resolver.close_file_object(&spec, context)?;
    Ok(analysis)
}

/// Execute the analyze command.
fn execute_analyze(global: &GlobalArgs, image: &Path) -> StrataResult<()> {
    let mut context = ResolverContext::new();
    let analysis = analyze_image(image, &mut context)?;

    if global.json {
        let response = AnalyzeResponse::new(image.to_string_lossy(), analysis);
        emit_response(&response, &mut io::stdout())
            .map_err(|err| StrataError::back_end(err.to_string()))?;
    } else if analysis.is_empty() {
        println!("no known formats detected");
    } else {
        for group in analysis.groups() {
            println!(
                "{}: {}",
                group.category,
                group.type_indicators.join(", ")
            );
        }
    }
    Ok(())
}

/// The first volume system the analyzer detected.
fn detect_volume_system(analysis: &FormatAnalysis) -> StrataResult<String> {
    analysis
        .type_indicators(FormatCategory::VolumeSystem)
        .first()
        .cloned()
        .ok_or_else(|| StrataError::back_end("no volume system detected"))
}

/// Build `OS -> RAW -> <scheme>` path spec for the volume system layer.
fn volume_spec(
    image: &Path,
    scheme: &str,
    attributes: &[(&str, strata::path::AttributeValue)],
) -> StrataResult<Arc<PathSpec>> {
    let factory = PathSpecFactory::global();
    let raw = factory.new_path_spec("RAW", &[], Some(os_spec(image)?))?;
    factory.new_path_spec(scheme, attributes, Some(raw))
}

/// Execute the list command.
fn execute_list(global: &GlobalArgs, image: &Path) -> StrataResult<()> {
    let mut context = ResolverContext::new();
    let analysis = analyze_image(image, &mut context)?;
    let scheme = detect_volume_system(&analysis)?;

    let fs_spec = volume_spec(image, &scheme, &[("location", "/".into())])?;
    let file_system = strata::default_resolver().open_file_system(&fs_spec, &mut context)?;
    let root = file_system.get_root_file_entry()?;
    let partitions: Vec<PartitionInfo> = root
        .sub_file_entries()
        .map(|entry| PartitionInfo {
            name: entry.name(),
            size: entry.size(),
        })
        .collect();

    if global.json {
        let response = ListResponse::new(image.to_string_lossy(), scheme.as_str(), partitions);
        emit_response(&response, &mut io::stdout())
            .map_err(|err| StrataError::back_end(err.to_string()))?;
    } else {
        println!("{} volume system, {} partitions", scheme, partitions.len());
        for partition in &partitions {
            println!("  {}  {} bytes", partition.name, partition.size);
        }
    }
    Ok(())
}

/// Execute the hash command.
fn execute_hash(global: &GlobalArgs, image: &Path, partition: Option<u32>) -> StrataResult<()> {
    let mut context = ResolverContext::new();

    let handle: FileObjectRef = match partition {
        None => {
            let spec = os_spec(image)?;
            strata::default_resolver().open_file_object(&spec, &mut context)?
        }
        Some(0) => {
            return Err(StrataError::path_spec("partition numbers are 1-based"));
        }
        Some(number) => {
            let analysis = analyze_image(image, &mut context)?;
            let scheme = detect_volume_system(&analysis)?;
            let fs_spec = volume_spec(image, &scheme, &[("location", "/".into())])?;
            let file_system =
                strata::default_resolver().open_file_system(&fs_spec, &mut context)?;
            let entry_spec = volume_spec(
                image,
                &scheme,
                &[("entry_index", u64::from(number - 1).into())],
            )?;
            let entry = file_system
                .get_file_entry_by_path_spec(&entry_spec)?
                .ok_or_else(|| {
                    StrataError::back_end(format!("no partition p{} in this image", number))
                })?;
            entry.get_file_object()?.ok_or_else(|| {
                StrataError::back_end(format!("partition p{} has no data stream", number))
            })?
        }
    };

    let mut hasher = Sha256::new();
    let mut bytes = 0u64;
    {
        let mut file_object = handle.borrow_mut();
        file_object.seek(SeekFrom::Start(0))?;
        let mut chunk = vec![0u8; 64 * 1024];
        loop {
            let read = file_object.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            hasher.update(&chunk[..read]);
            bytes += read as u64;
        }
    }
    let digest = hex::encode(hasher.finalize());

    if global.json {
        let response = HashResponse::new(
            image.to_string_lossy(),
            partition.map(|number| format!("p{}", number)),
            digest.as_str(),
            bytes,
        );
        emit_response(&response, &mut io::stdout())
            .map_err(|err| StrataError::back_end(err.to_string()))?;
    } else {
        println!("{}  {}", digest, image.display());
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
