use anyhow::Result;
use clap::Parser;
use log::{error, info};
use loudnorm_batch::cli::{self, CommonArgs, OUTPUT_DIR_NAME, SOURCE_DIR_NAME};
use loudnorm_batch::{
    CancellationToken, Encoding, LoudnessTargets, VerificationOptions, verify_folder_loudness,
};

/// Check that normalized files meet the broadcast loudness target
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// analyze the original files in `mp3s/` instead of `normalized/`
    #[arg(long)]
    source: bool,

    /// accepted loudness deviation in LU
    #[arg(long, default_value_t = LoudnessTargets::default().tolerance_lu)]
    tolerance: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    cli::init_logger();

    let cli = Cli::parse();
    let base_dir = cli.common.base_dir()?;

    let options = VerificationOptions {
        source_dir: base_dir.join(SOURCE_DIR_NAME),
        normalized_dir: base_dir.join(OUTPUT_DIR_NAME),
        check_source: cli.source,
        only: cli.common.file.clone(),
        targets: LoudnessTargets {
            integrated_lufs: cli.common.target_lufs,
            true_peak_db: cli.common.true_peak,
            tolerance_lu: cli.tolerance,
            ..LoudnessTargets::default()
        },
        num_threads: cli.common.num_threads(),
    };
    let cancel = CancellationToken::new();
    let ffmpeg = cli.common.ffmpeg(Encoding::default(), &cancel);

    info!("Starting loudness verification with options:");
    info!(
        "  Checking: {}",
        if options.check_source { "source" } else { "normalized" }
    );
    info!(
        "  Target: {:.1} LUFS ±{:.1} / {:.1} dBTP",
        options.targets.integrated_lufs, options.targets.tolerance_lu, options.targets.true_peak_db
    );
    cli.common.log_common(&base_dir);
    info!("---");

    tokio::spawn(cli::cancel_when(cli::shutdown_signal(), cancel.clone()));
    let check_source = options.check_source;
    let result =
        tokio::task::spawn_blocking(move || verify_folder_loudness(&options, &ffmpeg, &cancel))
            .await?;

    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            error!("Verification failed: {}", e);
            if let Some(hint) = cli::verification_hint(&e, check_source) {
                println!("{}", hint);
            }
            Err(e)?
        }
    }
}
