use crate::error::{Error, MeasurementError, ToolError, WritingError};
use crate::ffmpeg::{LoudnessTool, LoudnormFilter};
use crate::report::{self, FileOutcome, FileStatus, Reporter, RunCounters};
use crate::{
    AudioFile, CancellationToken, NormalizationOptions, OUTPUT_EXTENSION, TEMP_FILE_PREFIX,
    create_output_path, find_audio_files, find_single_file, process_files,
};
use colorful::Colorful;
use log::{error, info, warn};
use std::fs;
use std::path::Path;

/// Normalize every audio file below `options.input_dir` into `options.output_dir`.
///
/// Files whose output already exists are skipped. Per-file failures are
/// counted, only setup problems are returned as errors.
pub fn normalize_folder_loudness(
    options: &NormalizationOptions,
    tool: &impl LoudnessTool,
    cancel: &CancellationToken,
) -> Result<RunCounters, Error> {
    validate_options(options)?;

    report::print_header(
        "Audio Normalizer",
        &format!(
            "Target: {:.1} LUFS (Broadcast Standard)",
            options.targets.integrated_lufs
        ),
    );

    let audio_files = match &options.only {
        Some(query) => {
            let file = find_single_file(&options.input_dir, query, None)?;
            println!(
                "{}",
                format!(
                    "Single file mode: {}",
                    file.relative_to(&options.input_dir).display()
                )
                .cyan()
            );
            vec![file]
        }
        None => {
            println!("{}", "Scanning for audio files...".cyan());
            find_audio_files(&options.input_dir)
        }
    };

    if audio_files.is_empty() {
        println!(
            "{}",
            format!(
                "No audio files found in '{}'!",
                options.input_dir.display()
            )
            .yellow()
        );
        return Ok(RunCounters::default());
    }
    println!(
        "Found {} audio files\n",
        audio_files.len().to_string().green()
    );
    info!(
        "Processing {} files to target {:.1} LUFS / {:.1} dBTP / {:.1} LU",
        audio_files.len(),
        options.targets.integrated_lufs,
        options.targets.true_peak_db,
        options.targets.loudness_range
    );

    let reporter = Reporter::new(audio_files.len(), &options.input_dir, options.num_threads);
    let outcomes = process_files(&audio_files, options.num_threads, |audio_file| {
        reporter.start_file(&audio_file.path);
        let outcome = process_single_file(audio_file, options, tool, cancel);
        reporter.finish_file(&audio_file.path, &outcome.lines);
        outcome
    })?;
    reporter.finish();

    let counters = RunCounters::tally(&outcomes);
    info!(
        "Processing complete. {} succeeded, {} skipped, {} failed.",
        counters.successful, counters.skipped, counters.failed
    );
    report::print_normalization_summary(&counters, audio_files.len(), &options.output_dir);
    Ok(counters)
}

/// Measures and normalizes one file. Never fails: every problem ends up in
/// the returned outcome.
pub fn process_single_file(
    audio_file: &AudioFile,
    options: &NormalizationOptions,
    tool: &impl LoudnessTool,
    cancel: &CancellationToken,
) -> FileOutcome {
    let mut lines = Vec::new();
    if cancel.is_cancelled() {
        return FileOutcome::cancelled(lines);
    }
    let input_path = audio_file.path.as_path();

    let output_path =
        match create_output_path(input_path, &options.input_dir, &options.output_dir) {
            Ok(path) => path,
            Err(e) => {
                error!("Error preparing output for {:?}: {}", input_path, e);
                lines.push(format!("{}", format!("✗ {}", e).red()));
                return FileOutcome::new(FileStatus::Failed, lines);
            }
        };

    if output_path.exists() {
        lines.push(format!(
            "{}",
            "↷ Already normalized, skipping...".blue()
        ));
        return FileOutcome::new(FileStatus::Skipped, lines);
    }

    // 1. Measure
    let analysis = LoudnormFilter::TargetedAnalysis(options.targets);
    let measurement = match tool.analyze(input_path, &analysis) {
        Ok(m) => {
            lines.push(format!(
                "{} Current: {}",
                "↳ Analyzing loudness...".cyan(),
                format!("{:.1} LUFS", m.integrated_loudness).yellow()
            ));
            Some(m)
        }
        Err(MeasurementError::Tool(ToolError::Cancelled)) => {
            return FileOutcome::cancelled(lines);
        }
        Err(_) if cancel.is_cancelled() => return FileOutcome::cancelled(lines),
        Err(e) => {
            warn!(
                "Loudness analysis failed for {:?}: {}. Using single-pass mode.",
                input_path, e
            );
            lines.push(format!(
                "{} {}",
                "↳ Analyzing loudness...".cyan(),
                "Using single-pass mode".yellow()
            ));
            None
        }
    };

    // 2. Apply
    let filter = LoudnormFilter::for_normalization(&options.targets, measurement.as_ref());
    match write_atomically(tool, input_path, &output_path, &filter) {
        Ok(()) => {
            lines.push(format!(
                "{} {}",
                "↳ Normalizing...".cyan(),
                "✓ Done".green()
            ));
            FileOutcome::new(FileStatus::Succeeded, lines)
        }
        Err(WritingError::Tool(ToolError::Cancelled)) => FileOutcome::cancelled(lines),
        Err(_) if cancel.is_cancelled() => FileOutcome::cancelled(lines),
        Err(e) => {
            error!("Error normalizing {:?}: {}", input_path, e);
            lines.push(format!(
                "{} {}",
                "↳ Normalizing...".cyan(),
                "✗ Failed".red()
            ));
            FileOutcome::new(FileStatus::Failed, lines)
        }
    }
}

/// Runs the apply pass into a temporary sibling of `output` and renames it
/// into place on success. The temporary file is removed on any failure.
fn write_atomically(
    tool: &impl LoudnessTool,
    input: &Path,
    output: &Path,
    filter: &LoudnormFilter,
) -> Result<(), WritingError> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    // Keep the real extension last, the tool picks the container from it.
    let temp_path = tempfile::Builder::new()
        .prefix(TEMP_FILE_PREFIX)
        .suffix(&format!(".{OUTPUT_EXTENSION}"))
        .tempfile_in(dir)?
        .into_temp_path();

    tool.normalize(input, &temp_path, filter)?;
    temp_path.persist(output).map_err(|e| WritingError::Io(e.error))?;
    Ok(())
}

fn validate_options(options: &NormalizationOptions) -> Result<(), Error> {
    if !options.input_dir.is_dir() {
        return Err(Error::MissingDirectory {
            role: "Source",
            path: options.input_dir.clone(),
        });
    }
    if !options.output_dir.exists() {
        fs::create_dir_all(&options.output_dir).map_err(|e| Error::Io {
            path: options.output_dir.clone(),
            source: e,
        })?;
        info!("Created output directory: {:?}", options.output_dir);
    }
    if options.targets.true_peak_db > 0.0 {
        warn!(
            "Target true peak {:.1} dBTP is above 0 dBFS. This will likely cause clipping in standard formats.",
            options.targets.true_peak_db
        );
    }
    Ok(())
}
