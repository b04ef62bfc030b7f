//! Broadcast compliance pass over the normalized (or, with `check_source`,
//! the original) files.

use crate::compliance::check_compliance;
use crate::error::{Error, MeasurementError, ToolError};
use crate::ffmpeg::{LoudnessTool, LoudnormFilter};
use crate::report::{self, FileOutcome, FileStatus, Reporter, RunCounters, VerificationReport};
use crate::{
    AudioFile, CancellationToken, LoudnessTargets, OUTPUT_EXTENSION, VerificationOptions,
    find_audio_files, find_single_file, mapped_output_path, process_files,
};
use colorful::Colorful;
use log::{info, warn};
use std::path::PathBuf;

pub fn verify_folder_loudness(
    options: &VerificationOptions,
    tool: &impl LoudnessTool,
    cancel: &CancellationToken,
) -> Result<VerificationReport, Error> {
    let (target_dir, dir_name) = if options.check_source {
        (&options.source_dir, "source")
    } else {
        (&options.normalized_dir, "normalized")
    };

    report::print_header(
        "Audio Verification",
        if options.check_source {
            "Analyzing source files loudness levels"
        } else {
            "Checking normalized files against broadcast standards"
        },
    );

    if !target_dir.is_dir() {
        return Err(Error::MissingDirectory {
            role: if options.check_source {
                "Source"
            } else {
                "Normalized"
            },
            path: target_dir.clone(),
        });
    }

    let mut report = VerificationReport {
        check_source: options.check_source,
        ..Default::default()
    };

    let files = match &options.only {
        Some(query) => {
            let rewrite = (!options.check_source).then_some(OUTPUT_EXTENSION);
            let file = find_single_file(target_dir, query, rewrite)?;
            println!(
                "{}",
                format!(
                    "Single file mode ({}): {}",
                    dir_name,
                    file.relative_to(target_dir).display()
                )
                .cyan()
            );
            vec![file]
        }
        None => {
            println!("{}", format!("Scanning {} directory...", dir_name).cyan());
            let files = find_audio_files(target_dir);
            if !options.check_source {
                let sources = if options.source_dir.is_dir() {
                    find_audio_files(&options.source_dir)
                } else {
                    Vec::new()
                };
                if !sources.is_empty() {
                    report.source_files = Some(sources.len());
                }
                report.missing_outputs = missing_outputs(&sources, options);
            }
            files
        }
    };
    report.files = files.len();

    if options.check_source {
        println!("\nSource files: {}", files.len().to_string().blue());
    } else {
        println!(
            "\nSource files: {}",
            report.source_files.unwrap_or(0).to_string().blue()
        );
        println!("Normalized files: {}", files.len().to_string().blue());
    }

    if files.is_empty() {
        println!("\n{}", format!("No {} files found!", dir_name).yellow());
        return Ok(report);
    }

    println!("\n{}\n", format!("Analyzing {} files...", dir_name).cyan());

    let reporter = Reporter::new(files.len(), target_dir, options.num_threads);
    let outcomes = process_files(&files, options.num_threads, |audio_file| {
        reporter.start_file(&audio_file.path);
        let outcome = verify_single_file(audio_file, &options.targets, tool, cancel);
        reporter.finish_file(&audio_file.path, &outcome.lines);
        outcome
    })?;
    reporter.finish();

    report.counters = RunCounters::tally(&outcomes);
    report.failed_files = files
        .iter()
        .zip(&outcomes)
        .filter(|(_, outcome)| outcome.status == FileStatus::AnalysisFailed)
        .map(|(file, _)| file.relative_to(target_dir).to_path_buf())
        .collect();
    info!(
        "Verification complete. {} compliant, {} non-compliant, {} failed to analyze.",
        report.counters.compliant, report.counters.non_compliant, report.counters.analysis_failed
    );

    report::print_verification_summary(&report, &options.targets);
    Ok(report)
}

/// Measures one file and checks it against `targets`.
pub fn verify_single_file(
    audio_file: &AudioFile,
    targets: &LoudnessTargets,
    tool: &impl LoudnessTool,
    cancel: &CancellationToken,
) -> FileOutcome {
    let mut lines = Vec::new();
    if cancel.is_cancelled() {
        return FileOutcome::cancelled(lines);
    }

    let measurement = match tool.analyze(&audio_file.path, &LoudnormFilter::Analysis) {
        Ok(m) => Some(m),
        Err(MeasurementError::Tool(ToolError::Cancelled)) => {
            return FileOutcome::cancelled(lines);
        }
        Err(_) if cancel.is_cancelled() => return FileOutcome::cancelled(lines),
        Err(e) => {
            warn!("Failed to analyze {:?}: {}", audio_file.path, e);
            None
        }
    };
    let verdict = check_compliance(measurement.as_ref(), targets);

    let Some(m) = measurement else {
        lines.push(format!("{}", "✗ Failed to analyze".red()));
        return FileOutcome::new(FileStatus::AnalysisFailed, lines);
    };

    let target = format!(
        "(target: {:.1}±{:.1})",
        targets.integrated_lufs, targets.tolerance_lu
    );
    let lufs = format!("{:.1}", m.integrated_loudness);
    let peak = format!("{:.1}", m.true_peak);
    if verdict.compliant {
        lines.push(format!(
            "{} LUFS: {} {} | Peak: {} dBTP",
            "✓".green(),
            lufs.green(),
            target,
            peak.green()
        ));
        return FileOutcome::new(FileStatus::Compliant, lines);
    }

    let peak = if m.true_peak > targets.true_peak_db {
        format!("{}", peak.red())
    } else {
        format!("{}", peak.yellow())
    };
    lines.push(format!(
        "{} LUFS: {} {} | Peak: {} dBTP",
        "✗".red(),
        lufs.red(),
        target,
        peak
    ));
    for issue in &verdict.issues {
        lines.push(format!("  {}", format!("→ {}", issue).yellow()));
    }
    FileOutcome::new(FileStatus::NonCompliant, lines)
}

/// Source files whose normalized counterpart does not exist yet.
fn missing_outputs(sources: &[AudioFile], options: &VerificationOptions) -> Vec<PathBuf> {
    sources
        .iter()
        .filter(|source| {
            mapped_output_path(&source.path, &options.source_dir, &options.normalized_dir)
                .is_some_and(|output| !output.exists())
        })
        .map(|source| source.relative_to(&options.source_dir).to_path_buf())
        .collect()
}
