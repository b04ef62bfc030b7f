use crate::ffmpeg::Ffmpeg;
use crate::{CancellationToken, Encoding, Error, LoudnessTargets};
use anyhow::{Context, Result};
use clap::Args;
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;

/// Directory below the base dir holding the originals.
pub const SOURCE_DIR_NAME: &str = "mp3s";
/// Directory below the base dir receiving the normalized files.
pub const OUTPUT_DIR_NAME: &str = "normalized";

/// Options both programs accept.
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// file name or path suffix, process only this file
    pub file: Option<String>,

    /// directory holding `mp3s/` and `normalized/`, default to the directory of this executable
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// ffmpeg executable
    #[arg(long, default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// kill an ffmpeg run after this many seconds, 0 to wait forever
    #[arg(long, default_value_t = 1800)]
    pub timeout: u64,

    /// number of files processed at once
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,

    /// target integrated loudness in LUFS
    #[arg(long, default_value_t = LoudnessTargets::default().integrated_lufs, allow_negative_numbers = true)]
    pub target_lufs: f64,

    /// true peak ceiling in dBTP
    #[arg(long, default_value_t = LoudnessTargets::default().true_peak_db, allow_negative_numbers = true)]
    pub true_peak: f64,
}

impl CommonArgs {
    /// Resolves the base directory, falling back to the executable's location.
    pub fn base_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.base_dir {
            return Ok(dir.clone());
        }
        let exe = std::env::current_exe().context("cannot locate the running executable")?;
        exe.parent()
            .map(|p| p.to_path_buf())
            .context("executable has no parent directory")
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }

    pub fn num_threads(&self) -> Option<usize> {
        Some(self.jobs.max(1))
    }

    /// The ffmpeg adapter every stage of the run shares.
    pub fn ffmpeg(&self, encoding: Encoding, cancel: &CancellationToken) -> Ffmpeg {
        Ffmpeg::new(&self.ffmpeg)
            .with_encoding(encoding)
            .with_timeout(self.timeout())
            .with_cancel_token(cancel.clone())
    }

    pub fn log_common(&self, base_dir: &std::path::Path) {
        info!("  Base Directory: {:?}", base_dir);
        info!("  ffmpeg: {:?}", self.ffmpeg);
        match self.timeout() {
            Some(t) => info!("  Timeout: {}s per invocation", t.as_secs()),
            None => info!("  Timeout: none"),
        }
        info!("  Jobs: {}", self.jobs.max(1));
        if let Some(file) = &self.file {
            info!("  Single File: {}", file);
        }
    }
}

pub fn init_logger() {
    _ = pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .parse_default_env()
        .try_init();
}

/// Follow-up advice printed after a fatal verifier error.
pub fn verification_hint(error: &Error, check_source: bool) -> Option<&'static str> {
    match error {
        Error::MissingDirectory { .. } if !check_source => Some("Run the normalizer first."),
        _ => None,
    }
}

/// Resolves on Ctrl+C, or on SIGTERM where that exists.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping");
        },
        _ = terminate => {
            info!("Received terminate signal, stopping");
        },
    }
}

/// Cancels `cancel` once `shutdown` resolves. In-flight ffmpeg runs are
/// killed, pending files are counted as cancelled and the summary still prints.
pub async fn cancel_when(shutdown: impl Future<Output = ()>, cancel: CancellationToken) {
    shutdown.await;
    cancel.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_cancels_the_run() {
        let cancel = CancellationToken::new();
        cancel_when(std::future::ready(()), cancel.clone()).await;
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn pending_shutdown_leaves_the_run_alone() {
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(cancel_when(std::future::pending(), cancel.clone()));
        tokio::task::yield_now().await;
        assert!(!cancel.is_cancelled());
        watcher.abort();
    }

    #[test]
    fn missing_output_dir_suggests_normalizing() {
        let missing = Error::MissingDirectory {
            role: "Normalized",
            path: PathBuf::from("normalized"),
        };
        assert_eq!(
            verification_hint(&missing, false),
            Some("Run the normalizer first.")
        );
        assert_eq!(verification_hint(&missing, true), None);
        assert_eq!(
            verification_hint(&Error::InvalidFileType("a.txt".into()), false),
            None
        );
    }

    #[test]
    fn zero_timeout_disables_the_deadline() {
        let args = CommonArgs {
            file: None,
            base_dir: None,
            ffmpeg: PathBuf::from("ffmpeg"),
            timeout: 0,
            jobs: 0,
            target_lufs: -16.0,
            true_peak: -1.0,
        };
        assert_eq!(args.timeout(), None);
        assert_eq!(args.num_threads(), Some(1));
    }
}
