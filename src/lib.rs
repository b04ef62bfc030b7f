/// Module for error handling
pub mod error;
/// Module for driving the external media tool
pub mod ffmpeg;
/// Module for parsing loudness measurements
pub mod measurement;
/// Module for broadcast compliance checks
pub mod compliance;
/// Module for terminal progress and summaries
pub mod report;
/// Batch normalization
pub mod normalize;
/// Batch verification
pub mod verify;
/// Command line plumbing shared by the binaries
#[cfg(feature = "bin")]
pub mod cli;

pub use crate::compliance::{ComplianceResult, check_compliance};
pub use crate::error::{Error, MeasurementError, ToolError, WritingError};
pub use crate::ffmpeg::{Ffmpeg, LoudnessTool, LoudnormFilter};
pub use crate::measurement::MeasurementRecord;
pub use crate::normalize::normalize_folder_loudness;
pub use crate::report::RunCounters;
pub use crate::verify::verify_folder_loudness;
pub use tokio_util::sync::CancellationToken;

use log::{info, warn};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use strum_macros::Display;
use walkdir::WalkDir;

/// Extension every normalized output is written with, whatever the input container.
pub const OUTPUT_EXTENSION: &str = "mp3";

/// Name prefix of in-progress outputs. Discovery never returns such files.
pub const TEMP_FILE_PREFIX: &str = ".loudnorm-";

/// Represents supported audio file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    M4a,
    Mp4,
    Wav,
    Flac,
    Aac,
    Ogg,
    Wma,
}

impl AudioFormat {
    /// Returns a list of supported file extensions
    #[inline]
    pub fn supported_extensions() -> &'static [&'static str] {
        &["mp3", "m4a", "mp4", "wav", "flac", "aac", "ogg", "wma"]
    }

    /// Creates an AudioFormat from a file path based on its extension, ignoring case
    #[inline]
    pub fn from_path(value: impl AsRef<Path>) -> Option<Self> {
        Some(
            match value
                .as_ref()
                .extension()
                .unwrap_or_default()
                .to_string_lossy()
                .to_lowercase()
                .as_ref()
            {
                "mp3" => Self::Mp3,
                "m4a" => Self::M4a,
                "mp4" => Self::Mp4,
                "wav" => Self::Wav,
                "flac" => Self::Flac,
                "aac" => Self::Aac,
                "ogg" => Self::Ogg,
                "wma" => Self::Wma,
                _ => return None,
            },
        )
    }
}

/// Loudness profile shared by every stage of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessTargets {
    /// Target integrated loudness in LUFS
    pub integrated_lufs: f64,
    /// True peak ceiling in dBTP
    pub true_peak_db: f64,
    /// Target loudness range in LU
    pub loudness_range: f64,
    /// Accepted deviation from `integrated_lufs` when verifying, in LU
    pub tolerance_lu: f64,
}

impl Default for LoudnessTargets {
    fn default() -> Self {
        LoudnessTargets {
            integrated_lufs: -16.0,
            true_peak_db: -1.0,
            loudness_range: 7.0,
            tolerance_lu: 0.5,
        }
    }
}

/// Output encoding settings passed to the external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding {
    pub sample_rate: u32,
    pub bitrate_kbps: u32,
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding {
            sample_rate: 44_100,
            bitrate_kbps: 192,
        }
    }
}

/// Configuration options for audio normalization process
#[derive(Debug, Clone)]
pub struct NormalizationOptions {
    /// Input directory containing audio files to process
    pub input_dir: PathBuf,
    /// Output directory, mirroring the layout of `input_dir`
    pub output_dir: PathBuf,
    /// Restrict the run to one file, matched by name or path suffix
    pub only: Option<String>,
    pub targets: LoudnessTargets,
    pub encoding: Encoding,
    /// Number of files processed at once. `None` or 1 keeps the run sequential.
    pub num_threads: Option<usize>,
}

impl Default for NormalizationOptions {
    fn default() -> Self {
        NormalizationOptions {
            input_dir: PathBuf::from("mp3s"),
            output_dir: PathBuf::from("normalized"),
            only: None,
            targets: LoudnessTargets::default(),
            encoding: Encoding::default(),
            num_threads: None,
        }
    }
}

/// Configuration options for the verification pass
#[derive(Debug, Clone)]
pub struct VerificationOptions {
    /// Directory holding the original files
    pub source_dir: PathBuf,
    /// Directory holding the normalized files
    pub normalized_dir: PathBuf,
    /// Check the originals instead of the normalized outputs
    pub check_source: bool,
    pub only: Option<String>,
    pub targets: LoudnessTargets,
    pub num_threads: Option<usize>,
}

impl Default for VerificationOptions {
    fn default() -> Self {
        VerificationOptions {
            source_dir: PathBuf::from("mp3s"),
            normalized_dir: PathBuf::from("normalized"),
            check_source: false,
            only: None,
            targets: LoudnessTargets::default(),
            num_threads: None,
        }
    }
}

/// Represents an audio file to be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFile {
    pub path: PathBuf,
    pub format: AudioFormat,
}

impl AudioFile {
    fn from_path(path: &Path) -> Option<Self> {
        AudioFormat::from_path(path).map(|format| AudioFile {
            path: path.to_path_buf(),
            format,
        })
    }

    /// Path relative to `root`, for display
    pub fn relative_to<'a>(&'a self, root: &Path) -> &'a Path {
        self.path.strip_prefix(root).unwrap_or(&self.path)
    }
}

/// Finds all supported audio files below `input_dir`, sorted by full path.
///
/// The caller checks that `input_dir` exists.
pub fn find_audio_files(input_dir: impl AsRef<Path>) -> Vec<AudioFile> {
    let mut audio_files: Vec<AudioFile> = walk_files(input_dir.as_ref())
        .filter_map(|path| AudioFile::from_path(&path))
        .collect();
    audio_files.sort_by(|a, b| a.path.as_os_str().cmp(b.path.as_os_str()));
    audio_files
}

/// Resolves a single-file query below `root`.
///
/// A file matches when its name equals the query's file name or its path ends
/// with the query. With `rewrite_extension` the query is also tried with that
/// extension, which is how a source name finds its normalized output. Several
/// matches are only accepted when exactly one of them is the query taken as a
/// path relative to `root`.
pub fn find_single_file(
    root: impl AsRef<Path>,
    query: &str,
    rewrite_extension: Option<&str>,
) -> Result<AudioFile, Error> {
    let root = root.as_ref();
    if AudioFormat::from_path(query).is_none() {
        return Err(Error::InvalidFileType(query.to_string()));
    }

    let mut wanted = vec![PathBuf::from(query)];
    if let Some(ext) = rewrite_extension {
        let rewritten = Path::new(query).with_extension(ext);
        if !wanted.contains(&rewritten) {
            wanted.push(rewritten);
        }
    }

    let mut matches: Vec<AudioFile> = walk_files(root)
        .filter(|path| {
            wanted.iter().any(|w| {
                path.file_name().is_some_and(|name| Some(name) == w.file_name())
                    || path.ends_with(w)
            })
        })
        .filter_map(|path| AudioFile::from_path(&path))
        .collect();
    matches.sort_by(|a, b| a.path.as_os_str().cmp(b.path.as_os_str()));

    match matches.len() {
        0 => Err(Error::FileNotFound {
            query: query.to_string(),
            root: root.to_path_buf(),
        }),
        1 => Ok(matches.remove(0)),
        _ => {
            let mut exact: Vec<AudioFile> = matches
                .iter()
                .filter(|m| wanted.iter().any(|w| m.relative_to(root) == w.as_path()))
                .cloned()
                .collect();
            if exact.len() == 1 {
                Ok(exact.remove(0))
            } else {
                Err(Error::AmbiguousMatch {
                    query: query.to_string(),
                    candidates: matches.into_iter().map(|m| m.path).collect(),
                })
            }
        }
    }
}

/// Mirrors `input` from `input_dir` into `output_dir`, with the extension
/// rewritten to [`OUTPUT_EXTENSION`]. Touches nothing on disk.
pub fn mapped_output_path(
    input: impl AsRef<Path>,
    input_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
) -> Option<PathBuf> {
    let relative = pathdiff::diff_paths(input.as_ref(), input_dir.as_ref())?;
    Some(
        output_dir
            .as_ref()
            .join(relative)
            .with_extension(OUTPUT_EXTENSION),
    )
}

/// Like [`mapped_output_path`], and creates the missing parent directories.
pub fn create_output_path(
    input: impl AsRef<Path>,
    input_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
) -> Result<PathBuf, Error> {
    let input = input.as_ref();
    let output_path =
        mapped_output_path(input, input_dir, output_dir).ok_or_else(|| Error::Io {
            path: input.to_path_buf(),
            source: std::io::Error::other("Failed to calculate relative path"),
        })?;

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    Ok(output_path)
}

/// Applies `process` to every file, in order. More than one thread runs the
/// files on a dedicated rayon pool of that size; results keep input order.
pub(crate) fn process_files<T, F>(
    files: &[AudioFile],
    num_threads: Option<usize>,
    process: F,
) -> Result<Vec<T>, Error>
where
    T: Send,
    F: Fn(&AudioFile) -> T + Sync + Send,
{
    match num_threads {
        Some(n) if n > 1 => {
            info!("Using {} threads for processing.", n);
            let pool = rayon::ThreadPoolBuilder::new().num_threads(n).build()?;
            Ok(pool.install(|| files.par_iter().map(&process).collect()))
        }
        _ => Ok(files.iter().map(&process).collect()),
    }
}

fn walk_files(root: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| !e.file_name().to_string_lossy().starts_with(TEMP_FILE_PREFIX))
        .map(|e| e.into_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_path_ignores_case() {
        assert_eq!(AudioFormat::from_path("a/B.FLAC"), Some(AudioFormat::Flac));
        assert_eq!(AudioFormat::from_path("song.Wma"), Some(AudioFormat::Wma));
        assert_eq!(AudioFormat::from_path("notes.txt"), None);
        assert_eq!(AudioFormat::from_path("noext"), None);
    }

    #[test]
    fn format_display_matches_extension() {
        for ext in AudioFormat::supported_extensions() {
            let format = AudioFormat::from_path(format!("x.{ext}")).unwrap();
            assert_eq!(format.to_string(), *ext);
        }
    }

    #[test]
    fn mapped_output_path_mirrors_and_rewrites_extension() {
        let out = mapped_output_path("mp3s/sub/b.flac", "mp3s", "normalized").unwrap();
        assert_eq!(out, PathBuf::from("normalized/sub/b.mp3"));

        let out = mapped_output_path("mp3s/a.MP3", "mp3s", "normalized").unwrap();
        assert_eq!(out, PathBuf::from("normalized/a.mp3"));
    }

    #[test]
    fn broadcast_profile_defaults() {
        let t = LoudnessTargets::default();
        assert_eq!(t.integrated_lufs, -16.0);
        assert_eq!(t.true_peak_db, -1.0);
        assert_eq!(t.loudness_range, 7.0);
        assert_eq!(t.tolerance_lu, 0.5);
    }
}
