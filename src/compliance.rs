use crate::LoudnessTargets;
use crate::measurement::MeasurementRecord;

/// Verdict for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplianceResult {
    pub compliant: bool,
    /// Human readable problems, loudness first, then peak
    pub issues: Vec<String>,
}

/// Checks a measurement against the broadcast targets.
///
/// A missing measurement is never compliant.
pub fn check_compliance(
    measurement: Option<&MeasurementRecord>,
    targets: &LoudnessTargets,
) -> ComplianceResult {
    let Some(m) = measurement else {
        return ComplianceResult {
            compliant: false,
            issues: vec!["Failed to analyze file".to_string()],
        };
    };

    let mut issues = Vec::new();
    if (m.integrated_loudness - targets.integrated_lufs).abs() > targets.tolerance_lu
        || m.integrated_loudness.is_nan()
    {
        issues.push(format!(
            "LUFS {:.1} (target: {:.1}±{:.1})",
            m.integrated_loudness, targets.integrated_lufs, targets.tolerance_lu
        ));
    }
    if m.true_peak > targets.true_peak_db {
        issues.push(format!(
            "Peak {:.1} dBTP exceeds {:.1} dBTP",
            m.true_peak, targets.true_peak_db
        ));
    }

    ComplianceResult {
        compliant: issues.is_empty(),
        issues,
    }
}
