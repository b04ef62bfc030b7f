use anyhow::Result;
use clap::Parser;
use log::{error, info};
use loudnorm_batch::cli::{self, CommonArgs, OUTPUT_DIR_NAME, SOURCE_DIR_NAME};
use loudnorm_batch::{
    CancellationToken, Encoding, LoudnessTargets, NormalizationOptions, normalize_folder_loudness,
};

/// Normalize every file below `mp3s/` to broadcast loudness, mirrored into `normalized/` as mp3
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// target loudness range in LU
    #[arg(long, default_value_t = LoudnessTargets::default().loudness_range)]
    lra: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    cli::init_logger();

    let cli = Cli::parse();
    let base_dir = cli.common.base_dir()?;

    // --- Configuration ---
    let options = NormalizationOptions {
        input_dir: base_dir.join(SOURCE_DIR_NAME),
        output_dir: base_dir.join(OUTPUT_DIR_NAME),
        only: cli.common.file.clone(),
        targets: LoudnessTargets {
            integrated_lufs: cli.common.target_lufs,
            true_peak_db: cli.common.true_peak,
            loudness_range: cli.lra,
            ..LoudnessTargets::default()
        },
        encoding: Encoding::default(),
        num_threads: cli.common.num_threads(),
    };
    let cancel = CancellationToken::new();
    let ffmpeg = cli.common.ffmpeg(options.encoding, &cancel);

    info!("Starting loudness normalization with options:");
    info!("  Input Directory: {:?}", options.input_dir);
    info!("  Output Directory: {:?}", options.output_dir);
    info!(
        "  Target: {:.1} LUFS / {:.1} dBTP / {:.1} LU",
        options.targets.integrated_lufs, options.targets.true_peak_db, options.targets.loudness_range
    );
    cli.common.log_common(&base_dir);
    info!("---");

    tokio::spawn(cli::cancel_when(cli::shutdown_signal(), cancel.clone()));
    let result =
        tokio::task::spawn_blocking(move || normalize_folder_loudness(&options, &ffmpeg, &cancel))
            .await?;

    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            error!("Normalization failed: {}", e);
            Err(e)?
        }
    }
}
