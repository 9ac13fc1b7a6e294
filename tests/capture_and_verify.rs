//! Key capture followed by verification against the captured set

mod common;

use std::path::Path;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use common::{CLASS, manifest, write_png};
use kontrast::capture::{CaptureError, capture_test_keys};
use kontrast::layout::{DIFF_FILE, IMAGE_FILE};
use kontrast::types::InstrumentationStatus::{self, Failure, Ok as Rendered};
use kontrast::verify::{CaseOutcome, verify};

fn render(root: &Path, method: &str, key: &str, color: [u8; 4]) {
    write_png(&root.join(CLASS).join(method).join(key).join(IMAGE_FILE), 4, 4, color);
}

fn outcomes(report: &kontrast::VerificationReport) -> Vec<(String, CaseOutcome)> {
    report
        .cases
        .iter()
        .map(|case| (case.name.clone(), case.outcome.clone()))
        .collect()
}

const CASES: &[(&str, &str, InstrumentationStatus)] =
    &[("card", "light", Rendered), ("card", "dark", Rendered)];

#[test]
fn test_captured_keys_verify_cleanly() {
    let temp = TempDir::new().unwrap();
    let renders = temp.path().join("render");
    let keys = temp.path().join("keys");
    render(&renders, "card", "light", [255, 255, 255, 255]);
    render(&renders, "card", "dark", [0, 0, 0, 255]);
    let manifest = manifest(&renders, CASES);

    let copied = capture_test_keys(&manifest, &keys).unwrap();
    assert_eq!(copied, 2);
    assert!(keys.join(CLASS).join("card/light").join(IMAGE_FILE).is_file());

    let report = verify(&manifest, &keys, 2).unwrap();
    assert_eq!(
        outcomes(&report),
        vec![
            (format!("{}/card/dark", CLASS), CaseOutcome::Passed),
            (format!("{}/card/light", CLASS), CaseOutcome::Passed),
        ]
    );
    assert!(report.is_success());
    assert_eq!(report.passed(), 2);
    for case in &report.cases {
        let diff = case.diff.as_ref().expect("diff written");
        assert_eq!(diff.file_name().unwrap(), DIFF_FILE);
        assert!(diff.is_file());
    }
}

#[test]
fn test_capture_replaces_previous_keys() {
    let temp = TempDir::new().unwrap();
    let renders = temp.path().join("render");
    let keys = temp.path().join("keys");
    render(&keys, "retired", "retired", [9, 9, 9, 255]);
    render(&renders, "card", "light", [255, 255, 255, 255]);

    capture_test_keys(&manifest(&renders, &[("card", "light", Rendered)]), &keys).unwrap();

    assert!(!keys.join(CLASS).join("retired").exists());
    assert!(keys.join(CLASS).join("card/light").join(IMAGE_FILE).is_file());
}

#[test]
fn test_changed_render_fails_with_diff() {
    let temp = TempDir::new().unwrap();
    let renders = temp.path().join("render");
    let keys = temp.path().join("keys");
    render(&renders, "card", "light", [255, 255, 255, 255]);
    render(&renders, "card", "dark", [0, 0, 0, 255]);
    let manifest = manifest(&renders, CASES);
    capture_test_keys(&manifest, &keys).unwrap();

    // Re-render "dark" differently
    render(&renders, "card", "dark", [20, 20, 20, 255]);

    let report = verify(&manifest, &keys, 1).unwrap();
    assert_eq!(
        report.cases[0].outcome,
        CaseOutcome::Failed {
            mismatched: 16,
            total: 16,
            percent: "100.00%".to_string(),
        }
    );
    assert_eq!(report.cases[1].outcome, CaseOutcome::Passed);
    assert_eq!(
        report.cases[0].diff,
        Some(renders.join(CLASS).join("card/dark").join(DIFF_FILE))
    );
    assert!(!report.is_success());
    assert_eq!(report.failed(), 1);
}

#[test]
fn test_unmatched_cases_are_incomplete() {
    let temp = TempDir::new().unwrap();
    let renders = temp.path().join("render");
    let keys = temp.path().join("keys");
    render(&keys, "card", "retired", [1, 1, 1, 255]);
    render(&keys, "card", "light", [255, 255, 255, 255]);
    render(&renders, "card", "light", [255, 255, 255, 255]);
    render(&renders, "card", "fresh", [2, 2, 2, 255]);
    let manifest = manifest(&renders, &[("card", "light", Rendered), ("card", "fresh", Rendered)]);

    let report = verify(&manifest, &keys, 4).unwrap();
    assert_eq!(
        outcomes(&report),
        vec![
            (
                format!("{}/card/fresh", CLASS),
                CaseOutcome::Incomplete {
                    golden_missing: true,
                    candidate_missing: false,
                }
            ),
            (format!("{}/card/light", CLASS), CaseOutcome::Passed),
            (
                format!("{}/card/retired", CLASS),
                CaseOutcome::Incomplete {
                    golden_missing: false,
                    candidate_missing: true,
                }
            ),
        ]
    );
    assert_eq!(report.incomplete(), 2);
    assert!(report.is_success());
    assert!(report.cases[0].diff.is_none());
}

#[test]
fn test_failed_render_is_skipped() {
    let temp = TempDir::new().unwrap();
    let renders = temp.path().join("render");
    let keys = temp.path().join("keys");
    render(&renders, "card", "light", [255, 255, 255, 255]);
    render(&renders, "card", "dark", [0, 0, 0, 255]);
    capture_test_keys(&manifest(&renders, CASES), &keys).unwrap();

    let rerun = manifest(&renders, &[("card", "light", Rendered), ("card", "dark", Failure)]);
    match capture_test_keys(&rerun, &keys) {
        Err(CaptureError::FailedRenders(names)) => {
            assert_eq!(names, vec![format!("{}/card/dark", CLASS)])
        }
        other => panic!("expected failed renders, got {:?}", other),
    }

    let report = verify(&rerun, &keys, 2).unwrap();
    assert_eq!(report.cases[0].outcome, CaseOutcome::Skipped { status: Failure });
    assert_eq!(report.skipped(), 1);
    assert!(!report.is_success());
}

#[test]
fn test_report_round_trips_through_disk() {
    let temp = TempDir::new().unwrap();
    let renders = temp.path().join("render");
    let keys = temp.path().join("keys");
    render(&renders, "card", "light", [255, 255, 255, 255]);
    let manifest = manifest(&renders, &[("card", "light", Rendered)]);
    capture_test_keys(&manifest, &keys).unwrap();

    let report = verify(&manifest, &keys, 1).unwrap();
    let path = temp.path().join("verification.json");
    report.write(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let restored: kontrast::VerificationReport = serde_json::from_str(&text).unwrap();
    assert_eq!(restored, report);
    assert!(text.contains(r#""outcome": "passed""#));
}
