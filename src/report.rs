//! Terminal output: per-file progress lines, the live progress bar and the
//! end-of-run summaries. Everything here writes to stdout, logs go to stderr.

use crate::LoudnessTargets;
use colorful::Colorful;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Cells in the per-file progress bar.
pub const BAR_WIDTH: usize = 30;
const RULE_WIDTH: usize = 50;
/// How many analysis failures the verifier lists by name.
const LISTED_FAILURES: usize = 5;

/// Tallies accumulated over one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunCounters {
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
    pub compliant: usize,
    pub non_compliant: usize,
    pub analysis_failed: usize,
    /// Files never started because the run was cancelled
    pub cancelled: usize,
}

impl RunCounters {
    pub fn record(&mut self, status: FileStatus) {
        let slot = match status {
            FileStatus::Succeeded => &mut self.successful,
            FileStatus::Skipped => &mut self.skipped,
            FileStatus::Failed => &mut self.failed,
            FileStatus::Compliant => &mut self.compliant,
            FileStatus::NonCompliant => &mut self.non_compliant,
            FileStatus::AnalysisFailed => &mut self.analysis_failed,
            FileStatus::Cancelled => &mut self.cancelled,
        };
        *slot += 1;
    }

    pub fn tally<'a>(outcomes: impl IntoIterator<Item = &'a FileOutcome>) -> Self {
        let mut counters = RunCounters::default();
        for outcome in outcomes {
            counters.record(outcome.status);
        }
        counters
    }
}

/// Classification of one processed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Succeeded,
    Skipped,
    Failed,
    Compliant,
    NonCompliant,
    AnalysisFailed,
    Cancelled,
}

/// Result of one file plus the status lines shown under its progress header.
#[derive(Debug, Clone, PartialEq)]
pub struct FileOutcome {
    pub status: FileStatus,
    pub lines: Vec<String>,
}

impl FileOutcome {
    pub fn new(status: FileStatus, lines: Vec<String>) -> Self {
        FileOutcome { status, lines }
    }

    pub fn cancelled(mut lines: Vec<String>) -> Self {
        lines.push(format!("{}", "⊘ Cancelled".yellow()));
        FileOutcome::new(FileStatus::Cancelled, lines)
    }
}

/// `█` for the done share of `BAR_WIDTH` cells, `░` for the rest.
pub fn render_bar(current: usize, total: usize) -> String {
    let filled = if total == 0 {
        0
    } else {
        (BAR_WIDTH * current / total).min(BAR_WIDTH)
    };
    "█".repeat(filled) + &"░".repeat(BAR_WIDTH - filled)
}

/// `[ 7/12]`, padded to the width of `total`.
pub fn format_counter(current: usize, total: usize) -> String {
    let width = total.to_string().len();
    format!("[{current:>width$}/{total}]")
}

fn percentage(current: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        current as f64 * 100.0 / total as f64
    }
}

/// Header line printed for each file.
pub fn format_progress(current: usize, total: usize, name: &Path) -> String {
    format!(
        "{} {} {:3.0}% - {}",
        format_counter(current, total).yellow(),
        format!("[{}]", render_bar(current, total)).blue(),
        percentage(current, total),
        name.display()
    )
}

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Program banner.
pub fn print_header(title: &str, subtitle: &str) {
    println!();
    println!("{}", title.to_string().cyan());
    println!("{}", rule().cyan());
    println!("{}", subtitle);
    println!("{}", rule());
    println!();
}

/// Drives the live bar and prints one block per file.
///
/// Sequential runs print a file's header when it starts, parallel runs print
/// the whole block once the file is done. Output goes through
/// [`ProgressBar::suspend`], which serializes writers, so workers may report
/// concurrently.
pub struct Reporter {
    bar: ProgressBar,
    root: PathBuf,
    total: usize,
    sequential: bool,
    shown: AtomicUsize,
}

impl Reporter {
    pub fn new(total: usize, root: impl Into<PathBuf>, num_threads: Option<usize>) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}").expect("Internal Error: Failed to set progress bar style")
            .progress_chars("#>-"));
        Reporter {
            bar,
            root: root.into(),
            total,
            sequential: num_threads.is_none_or(|n| n <= 1),
            shown: AtomicUsize::new(0),
        }
    }

    fn display_name<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    pub fn start_file(&self, path: &Path) {
        let name = self.display_name(path);
        self.bar.set_message(name.display().to_string());
        if self.sequential {
            self.bar.suspend(|| self.print_header(name));
        }
    }

    /// Prints `lines` for a file that just finished, preceded by its header
    /// unless that was already shown at start.
    pub fn finish_file(&self, path: &Path, lines: &[String]) {
        let name = self.display_name(path);
        self.bar.suspend(|| {
            if !self.sequential {
                self.print_header(name);
            }
            for line in lines {
                println!("  {line}");
            }
            println!();
        });
        self.bar.inc(1);
    }

    // counted under the suspend lock so numbers follow print order
    fn print_header(&self, name: &Path) {
        let current = self.shown.fetch_add(1, Ordering::SeqCst) + 1;
        println!("{}", format_progress(current, self.total, name));
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// End-of-run summary of the normalizer.
pub fn print_normalization_summary(counters: &RunCounters, total: usize, output_dir: &Path) {
    println!("\n{}", rule().cyan());
    println!("{}", "Summary:".bold());
    println!(
        "  {}",
        format!("✓ Successful: {}", counters.successful).green()
    );
    if counters.skipped > 0 {
        println!(
            "  {}",
            format!("↷ Skipped (already normalized): {}", counters.skipped).blue()
        );
    }
    if counters.failed > 0 {
        println!("  {}", format!("✗ Failed: {}", counters.failed).red());
    }
    if counters.cancelled > 0 {
        println!(
            "  {}",
            format!("⊘ Cancelled: {}", counters.cancelled).yellow()
        );
    }
    println!("  Total files: {}", total);
    println!(
        "\nNormalized files saved to: {}",
        output_dir.display().to_string().blue()
    );
    println!("{}\n", rule().cyan());
}

/// Everything the verifier learned in one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationReport {
    pub counters: RunCounters,
    /// Files the run set out to check
    pub files: usize,
    /// Source file count, when the run compares against the originals
    pub source_files: Option<usize>,
    /// Source files with no normalized counterpart
    pub missing_outputs: Vec<PathBuf>,
    /// Files whose analysis failed, relative to the checked directory
    pub failed_files: Vec<PathBuf>,
    pub check_source: bool,
}

impl VerificationReport {
    /// Files that produced a measurement.
    pub fn total_checked(&self) -> usize {
        self.counters.compliant + self.counters.non_compliant
    }

    /// True only when every file was measured and compliant.
    pub fn all_compliant(&self) -> bool {
        self.files > 0 && self.counters.compliant == self.files
    }
}

/// End-of-run summary of the verifier.
pub fn print_verification_summary(report: &VerificationReport, targets: &LoudnessTargets) {
    let counters = &report.counters;
    println!("{}", rule().cyan());
    println!("{}\n", "Summary:".bold());

    if let Some(sources) = report.source_files {
        if sources == report.files {
            println!(
                "{}",
                format!("✓ File count matches source ({} files)", report.files).green()
            );
        } else {
            println!(
                "{}",
                format!(
                    "⚠ File count mismatch: {} source, {} normalized",
                    sources, report.files
                )
                .yellow()
            );
        }
    }
    if !report.missing_outputs.is_empty() {
        println!("{}", "Not normalized yet:".yellow());
        list_limited(&report.missing_outputs);
    }

    let checked = report.total_checked();
    if counters.compliant == checked && checked > 0 {
        println!(
            "{}",
            format!("✓ All files at target loudness {}", target_loudness(targets)).green()
        );
    } else {
        println!(
            "{}",
            format!("⚠ {}/{} files compliant", counters.compliant, checked).yellow()
        );
    }
    println!(
        "{}",
        format!("✓ Peak levels checked (limit: {:.1} dBTP)", targets.true_peak_db).green()
    );

    if !report.failed_files.is_empty() {
        println!("\n{}", "Failed to analyze:".red());
        list_limited(&report.failed_files);
    }
    if counters.cancelled > 0 {
        println!(
            "\n{}",
            format!("⊘ {} files not checked, run cancelled", counters.cancelled).yellow()
        );
    }

    println!("\n{}", rule().cyan());
    match (report.all_compliant(), report.check_source) {
        (true, false) => println!("{}", "✓ All files ready for stage performance!".green()),
        (true, true) => println!("{}", "✓ All source files already meet the target".green()),
        (false, false) => {
            println!("{}", "⚠ Some files need attention".yellow());
            println!("Consider re-running the normalizer");
        }
        (false, true) => {
            println!("{}", "⚠ Some source files are off target".yellow());
            println!("Run the normalizer to bring them to the target");
        }
    }
    println!();
}

/// `(-16 LUFS ±0.5)`, whole numbers without a fraction.
fn target_loudness(targets: &LoudnessTargets) -> String {
    format!("({} LUFS ±{})", targets.integrated_lufs, targets.tolerance_lu)
}

fn list_limited(paths: &[PathBuf]) {
    for path in paths.iter().take(LISTED_FAILURES) {
        println!("  • {}", path.display());
    }
    if paths.len() > LISTED_FAILURES {
        println!("  ... and {} more", paths.len() - LISTED_FAILURES);
    }
}
