use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

/// Failure to run the external tool to completion.
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error while waiting for the external tool: {0}")]
    Io(#[from] std::io::Error),
    #[error("external tool did not finish within {0:?}, killed")]
    Timeout(Duration),
    #[error("cancelled, external tool killed")]
    Cancelled,
}

/// Reasons a loudness measurement could not be obtained. Always non-fatal:
/// the normalizer falls back to single-pass mode, the verifier counts an
/// analysis failure.
#[derive(thiserror::Error, Debug)]
pub enum MeasurementError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("no JSON block found in the diagnostic output")]
    NoJsonBlock,
    #[error("measurement JSON holds no loudness statistics")]
    EmptyReport,
    #[error("malformed measurement JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum WritingError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("external tool exited with {status}: {stderr}")]
    ExitStatus { status: ExitStatus, stderr: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort the whole run.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{role} directory '{}' not found", .path.display())]
    MissingDirectory { role: &'static str, path: PathBuf },
    #[error("'{0}' is not an audio file (mp3, m4a, mp4, wav, flac, aac, ogg, wma)")]
    InvalidFileType(String),
    #[error("file '{query}' not found in {}", .root.display())]
    FileNotFound { query: String, root: PathBuf },
    #[error("'{query}' matches {} files, give a relative path: {}", .candidates.len(), display_all(.candidates))]
    AmbiguousMatch {
        query: String,
        candidates: Vec<PathBuf>,
    },
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn display_all(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
