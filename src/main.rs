//! Command line front end for the batch conversion pipeline

use clap::{Parser, ValueEnum};
use pixelboost::modules::backup::BackupManager;
use pixelboost::modules::batch_log::LogManager;
use pixelboost::modules::converter::{ConversionOptions, ImageFormat};
use pixelboost::modules::file_utils::is_supported_input;
use pixelboost::modules::orchestrator::{start_batch_process, SubscriptionTier};
use pixelboost::progress::LogReporter;
use pixelboost::state::AppState;
use std::path::PathBuf;

/// Batch image conversion with backup and history logging
#[derive(Parser)]
#[command(name = "pixelboost", version, about)]
struct Cli {
    /// Input image files
    #[arg(required = true)]
    files: Vec<String>,

    /// Output directory for converted files
    #[arg(short, long)]
    output: String,

    /// Target format (webp, avif, jpg, png, gif, bmp, tiff)
    #[arg(short, long, default_value = "webp", value_parser = parse_format)]
    format: ImageFormat,

    /// Quality 0-100
    #[arg(short, long, default_value_t = 80)]
    quality: u8,

    /// Resize width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Resize height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Stretch to the exact target size instead of fitting inside it
    #[arg(long)]
    stretch: bool,

    /// Compression effort 0-9
    #[arg(long)]
    compression_level: Option<u8>,

    /// Backup directory (defaults to ~/PixelBoost/backup)
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    /// Log directory (defaults to ~/PixelBoost/logs)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Subscription tier limiting the batch size
    #[arg(long, value_enum, default_value_t = TierArg::Pro)]
    tier: TierArg,
}

#[derive(Clone, Copy, ValueEnum)]
enum TierArg {
    Free,
    Basic,
    Pro,
}

impl From<TierArg> for SubscriptionTier {
    fn from(tier: TierArg) -> Self {
        match tier {
            TierArg::Free => Self::Free,
            TierArg::Basic => Self::Basic,
            TierArg::Pro => Self::Pro,
        }
    }
}

fn parse_format(s: &str) -> Result<ImageFormat, String> {
    s.parse::<ImageFormat>().map_err(|e| e.to_string())
}

#[allow(clippy::print_stdout)]
#[tokio::main]
async fn main() -> Result<(), String> {
    env_logger::init();
    let cli = Cli::parse();

    if let Some(file) = cli
        .files
        .iter()
        .find(|f| !is_supported_input(std::path::Path::new(f)))
    {
        return Err(format!("unsupported input file: {file}"));
    }

    let tier = SubscriptionTier::from(cli.tier);
    if !tier.allows(cli.files.len()) {
        return Err(format!(
            "batch of {} file(s) exceeds the limit of {} for this tier",
            cli.files.len(),
            tier.max_batch_size()
        ));
    }

    let backup = match cli.backup_dir {
        Some(dir) => BackupManager::new(dir),
        None => BackupManager::default_location()?,
    };
    let log = match cli.log_dir {
        Some(dir) => LogManager::new(dir),
        None => LogManager::default_location()?,
    };

    let options = ConversionOptions {
        format: cli.format,
        quality: cli.quality,
        width: cli.width,
        height: cli.height,
        maintain_aspect_ratio: !cli.stretch,
        compression_level: cli.compression_level,
    };

    let state = AppState::new();
    let summary = start_batch_process(
        &state,
        &backup,
        &log,
        &cli.files,
        &cli.output,
        &options,
        &LogReporter,
    )
    .await?;

    println!("{}", summary.message);
    for item in &summary.progress.items {
        match &item.error {
            Some(error) => println!("  FAILED {} ({error})", item.input_path),
            None => println!("  ok     {} -> {}", item.input_path, item.output_path),
        }
    }

    Ok(())
}
