//! Shared helpers: a scripted stand-in for ffmpeg and on-disk fixture trees.

#![allow(dead_code)]

use loudnorm_batch::{
    CancellationToken, LoudnessTool, LoudnormFilter, MeasurementError, MeasurementRecord,
    WritingError,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Answers measurements from a table keyed by file name and writes a marker
/// file for every normalization. Counts every invocation.
#[derive(Default)]
pub struct FakeTool {
    measurements: HashMap<String, MeasurementRecord>,
    fallback: Option<MeasurementRecord>,
    analyze_calls: AtomicUsize,
    normalize_calls: AtomicUsize,
    filters: Mutex<Vec<String>>,
    interrupt: Option<CancellationToken>,
}

impl FakeTool {
    /// Every file measures as `record`.
    pub fn measuring(record: MeasurementRecord) -> Self {
        FakeTool {
            fallback: Some(record),
            ..Default::default()
        }
    }

    /// Every analysis fails.
    pub fn broken() -> Self {
        FakeTool::default()
    }

    pub fn with_file(mut self, name: &str, record: MeasurementRecord) -> Self {
        self.measurements.insert(name.to_string(), record);
        self
    }

    /// The first normalization leaves a partial file, fires `cancel` and
    /// fails the way an interrupted encoder does.
    pub fn interrupting(mut self, cancel: CancellationToken) -> Self {
        self.interrupt = Some(cancel);
        self
    }

    pub fn analyze_calls(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }

    pub fn normalize_calls(&self) -> usize {
        self.normalize_calls.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> usize {
        self.analyze_calls() + self.normalize_calls()
    }

    pub fn filters(&self) -> Vec<String> {
        self.filters.lock().unwrap().clone()
    }
}

impl LoudnessTool for FakeTool {
    fn analyze(
        &self,
        input: &Path,
        _filter: &LoudnormFilter,
    ) -> Result<MeasurementRecord, MeasurementError> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.measurements
            .get(&name)
            .copied()
            .or(self.fallback)
            .ok_or(MeasurementError::NoJsonBlock)
    }

    fn normalize(
        &self,
        input: &Path,
        output: &Path,
        filter: &LoudnormFilter,
    ) -> Result<(), WritingError> {
        self.normalize_calls.fetch_add(1, Ordering::SeqCst);
        self.filters.lock().unwrap().push(filter.to_string());
        if let Some(cancel) = &self.interrupt {
            fs::write(output, b"partial")?;
            cancel.cancel();
            return Err(WritingError::Io(std::io::Error::other("encoder interrupted")));
        }
        fs::write(output, format!("normalized from {}", input.display()))?;
        Ok(())
    }
}

pub fn record(lufs: f64, peak: f64) -> MeasurementRecord {
    MeasurementRecord {
        integrated_loudness: lufs,
        true_peak: peak,
        loudness_range: 6.0,
        threshold: -26.5,
        target_offset: 0.1,
    }
}

/// Creates each relative path below `root` with a few placeholder bytes.
pub fn create_files(root: &Path, files: &[&str]) {
    for file in files {
        let path = root.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not really audio").unwrap();
    }
}

/// Every file below `root`, relative to it, sorted.
pub fn list_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(root).unwrap().to_path_buf())
        .collect();
    files.sort();
    files
}
