//! Dataset layout validation and quality checks.

use crate::kitti::{index_testing, pair_training};
use crate::types::{
    BurnDatasetError, DatasetResult, LayoutExpectations, LayoutSummary, ValidationOutcome,
    ValidationReport,
};
use std::path::Path;

fn check_count(
    label: &str,
    actual: usize,
    expected: Option<usize>,
    outcome: &mut ValidationOutcome,
    reasons: &mut Vec<String>,
) {
    if let Some(expected) = expected {
        if actual != expected {
            if *outcome == ValidationOutcome::Pass {
                *outcome = ValidationOutcome::Warn;
            }
            reasons.push(format!("{label}: found {actual}, expected {expected}"));
        }
    }
}

/// Grade a layout summary against the expected image counts.
pub fn validate_summary(summary: LayoutSummary, expectations: &LayoutExpectations) -> ValidationReport {
    let mut outcome = ValidationOutcome::Pass;
    let mut reasons = Vec::new();

    if summary.training_images == 0 {
        outcome = ValidationOutcome::Fail;
        reasons.push("training images: none found".to_string());
    }
    if !summary.unpaired_images.is_empty() {
        outcome = ValidationOutcome::Fail;
        reasons.push(format!(
            "training labels: {} image(s) without a road label (first: {})",
            summary.unpaired_images.len(),
            summary.unpaired_images[0].display()
        ));
    }
    check_count(
        "training images",
        summary.training_images,
        expectations.training_images,
        &mut outcome,
        &mut reasons,
    );
    check_count(
        "testing images",
        summary.testing_images,
        expectations.testing_images,
        &mut outcome,
        &mut reasons,
    );

    ValidationReport {
        outcome,
        reasons,
        summary,
    }
}

/// Inspect `<root>/data_road` and report whether it is usable for training.
///
/// Missing directories are reported as `Fail` rather than returned as errors.
pub fn validate_layout(
    root: &Path,
    expectations: &LayoutExpectations,
) -> DatasetResult<ValidationReport> {
    let mut reasons = Vec::new();
    let mut summary = LayoutSummary::default();

    match pair_training(root) {
        Ok((paired, unpaired)) => {
            summary.training_images = paired.len() + unpaired.len();
            summary.paired_labels = paired.len();
            summary.unpaired_images = unpaired;
        }
        Err(BurnDatasetError::MissingDir { path }) => {
            reasons.push(format!("missing directory {}", path.display()));
        }
        Err(e) => return Err(e),
    }
    match index_testing(root) {
        Ok(images) => summary.testing_images = images.len(),
        Err(BurnDatasetError::MissingDir { path }) => {
            reasons.push(format!("missing directory {}", path.display()));
        }
        Err(e) => return Err(e),
    }

    if !reasons.is_empty() {
        return Ok(ValidationReport {
            outcome: ValidationOutcome::Fail,
            reasons,
            summary,
        });
    }
    Ok(validate_summary(summary, expectations))
}
