//! Loudness statistics reported by the loudnorm filter.
//!
//! The filter prints its JSON summary on the diagnostic stream, mixed with
//! banner and progress text. [`extract_json_block`] is the only place that
//! knows how to find it.

use crate::error::MeasurementError;
use serde::{Deserialize, Deserializer};

/// First-pass statistics of one file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementRecord {
    /// Integrated loudness, LUFS
    pub integrated_loudness: f64,
    /// True peak, dBTP
    pub true_peak: f64,
    /// Loudness range, LU
    pub loudness_range: f64,
    /// Gating threshold, LUFS
    pub threshold: f64,
    /// Offset gain the filter suggests for the second pass, LU
    pub target_offset: f64,
}

/// Raw shape of the filter output. Values are printed as JSON strings
/// ("-23.54", "-inf"), some builds print bare numbers.
#[derive(Debug, Deserialize)]
struct LoudnormReport {
    #[serde(default, deserialize_with = "lenient_f64")]
    input_i: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    input_tp: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    input_lra: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    input_thresh: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    target_offset: Option<f64>,
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => Ok(n.as_f64()),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|e| D::Error::custom(format!("invalid number {s:?}: {e}"))),
        other => Err(D::Error::custom(format!("expected a number, got {other}"))),
    }
}

impl LoudnormReport {
    fn is_empty(&self) -> bool {
        [
            self.input_i,
            self.input_tp,
            self.input_lra,
            self.input_thresh,
            self.target_offset,
        ]
        .iter()
        .all(Option::is_none)
    }
}

impl From<LoudnormReport> for MeasurementRecord {
    fn from(r: LoudnormReport) -> Self {
        MeasurementRecord {
            integrated_loudness: r.input_i.unwrap_or(-99.0),
            true_peak: r.input_tp.unwrap_or(-99.0),
            loudness_range: r.input_lra.unwrap_or(0.0),
            threshold: r.input_thresh.unwrap_or(-99.0),
            target_offset: r.target_offset.unwrap_or(0.0),
        }
    }
}

/// Finds the JSON object embedded in the tool's diagnostic text.
///
/// The block starts at the first line containing `{` and ends at the next
/// line (possibly the same one) containing `}`. The result is trimmed to the
/// span between the first `{` and the last `}` of those lines. Nested objects
/// spanning several lines are cut at their first closing brace.
pub fn extract_json_block(text: &str) -> Option<String> {
    let mut block: Vec<&str> = Vec::new();
    for line in text.lines() {
        if block.is_empty() && !line.contains('{') {
            continue;
        }
        block.push(line);
        if line.contains('}') {
            break;
        }
    }
    if block.is_empty() {
        return None;
    }

    let joined = block.join("\n");
    let start = joined.find('{')?;
    let end = joined.rfind('}')?;
    if end < start {
        return None;
    }
    Some(joined[start..=end].to_string())
}

/// Parses the measurement out of the tool's full diagnostic output.
pub fn parse_measurement(diagnostics: &str) -> Result<MeasurementRecord, MeasurementError> {
    let json = extract_json_block(diagnostics).ok_or(MeasurementError::NoJsonBlock)?;
    let report: LoudnormReport = serde_json::from_str(&json)?;
    if report.is_empty() {
        return Err(MeasurementError::EmptyReport);
    }
    Ok(report.into())
}
