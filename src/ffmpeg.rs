//! Adapter around the external media tool.
//!
//! Loudness measurement, filtering and encoding all happen inside ffmpeg's
//! `loudnorm` filter. This module only builds command lines, runs them with a
//! deadline and a cancellation token, and hands the diagnostic text to
//! [`crate::measurement`].

use crate::error::{MeasurementError, ToolError, WritingError};
use crate::measurement::{MeasurementRecord, parse_measurement};
use crate::{CancellationToken, Encoding, LoudnessTargets};
use log::debug;
use std::ffi::OsString;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lines of diagnostic output kept when reporting a failed run.
const STDERR_TAIL_LINES: usize = 8;

/// Parameter string for the `loudnorm` audio filter.
#[derive(Debug, Clone, PartialEq)]
pub enum LoudnormFilter {
    /// Measurement with the filter's own default targets
    Analysis,
    /// First pass: measure against the given targets
    TargetedAnalysis(LoudnessTargets),
    /// Dynamic normalization without prior measurement
    SinglePass(LoudnessTargets),
    /// Second pass: linear gain from the first pass statistics
    Linear(LoudnessTargets, MeasurementRecord),
}

impl LoudnormFilter {
    /// Filter for the apply pass, depending on whether a measurement exists.
    pub fn for_normalization(
        targets: &LoudnessTargets,
        measurement: Option<&MeasurementRecord>,
    ) -> Self {
        match measurement {
            Some(m) => LoudnormFilter::Linear(*targets, *m),
            None => LoudnormFilter::SinglePass(*targets),
        }
    }
}

fn write_targets(f: &mut fmt::Formatter<'_>, t: &LoudnessTargets) -> fmt::Result {
    // `{:?}` keeps the trailing ".0" of whole numbers (-16.0, not -16)
    write!(
        f,
        "loudnorm=I={:?}:TP={:?}:LRA={:?}",
        t.integrated_lufs, t.true_peak_db, t.loudness_range
    )
}

impl fmt::Display for LoudnormFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoudnormFilter::Analysis => f.write_str("loudnorm=print_format=json"),
            LoudnormFilter::TargetedAnalysis(t) => {
                write_targets(f, t)?;
                f.write_str(":print_format=json")
            }
            LoudnormFilter::SinglePass(t) => write_targets(f, t),
            LoudnormFilter::Linear(t, m) => {
                write_targets(f, t)?;
                write!(
                    f,
                    ":measured_I={:.2}:measured_TP={:.2}:measured_LRA={:.2}:measured_thresh={:.2}:offset={:.2}:linear=true",
                    m.integrated_loudness,
                    m.true_peak,
                    m.loudness_range,
                    m.threshold,
                    m.target_offset
                )
            }
        }
    }
}

/// The two operations the batch programs need from a media tool.
pub trait LoudnessTool: Sync {
    /// Runs the filter over `input` without writing media and returns its statistics.
    fn analyze(
        &self,
        input: &Path,
        filter: &LoudnormFilter,
    ) -> Result<MeasurementRecord, MeasurementError>;

    /// Writes the filtered `input` to `output`, replacing anything already there.
    fn normalize(
        &self,
        input: &Path,
        output: &Path,
        filter: &LoudnormFilter,
    ) -> Result<(), WritingError>;
}

/// Everything a finished child left behind.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stderr: String,
}

/// ffmpeg invoked as a subprocess.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: PathBuf,
    encoding: Encoding,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Ffmpeg {
            program: PathBuf::from("ffmpeg"),
            encoding: Encoding::default(),
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl Ffmpeg {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Ffmpeg {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Kill any invocation running longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// `-i <input> -af <filter> -f null -`
    pub fn analysis_args(input: &Path, filter: &LoudnormFilter) -> Vec<OsString> {
        vec![
            "-i".into(),
            input.as_os_str().to_owned(),
            "-af".into(),
            filter.to_string().into(),
            "-f".into(),
            "null".into(),
            "-".into(),
        ]
    }

    /// `-i <input> -af <filter> -ar <rate> -b:a <kbps>k -y <output>`
    pub fn normalize_args(
        input: &Path,
        output: &Path,
        filter: &LoudnormFilter,
        encoding: &Encoding,
    ) -> Vec<OsString> {
        vec![
            "-i".into(),
            input.as_os_str().to_owned(),
            "-af".into(),
            filter.to_string().into(),
            "-ar".into(),
            encoding.sample_rate.to_string().into(),
            "-b:a".into(),
            format!("{}k", encoding.bitrate_kbps).into(),
            "-y".into(),
            output.as_os_str().to_owned(),
        ]
    }

    fn run(&self, args: Vec<OsString>) -> Result<ToolOutput, ToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&args);
        debug!("Running {:?} {:?}", self.program, args);
        run_with_deadline(cmd, self.timeout, &self.cancel)
    }
}

impl LoudnessTool for Ffmpeg {
    fn analyze(
        &self,
        input: &Path,
        filter: &LoudnormFilter,
    ) -> Result<MeasurementRecord, MeasurementError> {
        let output = self.run(Self::analysis_args(input, filter))?;
        // Exit status is not checked, the summary can precede a late error.
        parse_measurement(&output.stderr)
    }

    fn normalize(
        &self,
        input: &Path,
        output: &Path,
        filter: &LoudnormFilter,
    ) -> Result<(), WritingError> {
        let result = self.run(Self::normalize_args(input, output, filter, &self.encoding))?;
        if result.status.success() {
            return Ok(());
        }
        Err(WritingError::ExitStatus {
            status: result.status,
            stderr: stderr_tail(&result.stderr, STDERR_TAIL_LINES),
        })
    }
}

/// Runs `cmd` to completion, collecting its diagnostic stream.
///
/// The child is killed and reaped when `timeout` elapses or `cancel` fires.
pub fn run_with_deadline(
    mut cmd: Command,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<ToolOutput, ToolError> {
    if cancel.is_cancelled() {
        return Err(ToolError::Cancelled);
    }

    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ToolError::Spawn { program, source })?;

    let mut pipe = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("child stderr was not captured"))?;
    let reader = thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf).map(|_| buf)
    });

    let started = Instant::now();
    let outcome = loop {
        match child.try_wait() {
            Ok(Some(status)) => break settle(status, cancel),
            Ok(None) => {}
            Err(e) => break Err(ToolError::Io(e)),
        }
        if cancel.is_cancelled() {
            break Err(ToolError::Cancelled);
        }
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                break Err(ToolError::Timeout(limit));
            }
        }
        thread::sleep(POLL_INTERVAL);
    };

    let status = match outcome {
        Ok(status) => status,
        Err(e) => {
            // Already exited if kill fails; wait reaps it either way.
            let _ = child.kill();
            let _ = child.wait();
            // A grandchild may still hold the pipe open, leave the reader detached.
            drop(reader);
            return Err(e);
        }
    };

    let buf = reader
        .join()
        .map_err(|_| std::io::Error::other("stderr reader panicked"))??;
    Ok(ToolOutput {
        status,
        stderr: String::from_utf8_lossy(&buf).into_owned(),
    })
}

/// A child that died while the run was being cancelled was most likely
/// interrupted by the same signal, so its failure counts as a cancellation.
fn settle(status: ExitStatus, cancel: &CancellationToken) -> Result<ExitStatus, ToolError> {
    if !status.success() && cancel.is_cancelled() {
        return Err(ToolError::Cancelled);
    }
    Ok(status)
}

fn stderr_tail(stderr: &str, lines: usize) -> String {
    let all: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
