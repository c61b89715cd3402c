//! Maps pipeline results to a test status, its label, and the report text.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pipeline::PipelineResult;

/// Outcome of testing a request. At most one of these labels is present on
/// a request at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Ok,
    Manual,
    Fail,
}

impl TestStatus {
    pub const ALL: [TestStatus; 3] =
        [TestStatus::Ok, TestStatus::Manual, TestStatus::Fail];

    pub fn label(&self) -> &'static str {
        match self {
            TestStatus::Ok => "Tests: OK",
            TestStatus::Manual => "Tests: MANUAL",
            TestStatus::Fail => "Tests: FAIL",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TestStatus::Ok => "OK",
            TestStatus::Manual => "MANUAL",
            TestStatus::Fail => "FAIL",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Replaces any test status label with `status`, keeping every other label
/// in its original order.
pub fn apply_status_label(labels: &[String], status: TestStatus) -> Vec<String> {
    let mut updated: Vec<String> = labels
        .iter()
        .filter(|label| {
            !TestStatus::ALL.iter().any(|s| s.label() == label.as_str())
        })
        .cloned()
        .collect();

    updated.push(status.label().to_string());

    updated
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub status: TestStatus,
    pub report: String,
}

/// Decides the status of a request from its pipeline result.
pub fn decide(result: &PipelineResult) -> Decision {
    let status = if !result.passed() {
        TestStatus::Fail
    } else if result.requires_manual_review() {
        TestStatus::Manual
    } else {
        TestStatus::Ok
    };

    let report = format!(
        "#### BUILD-BOT TEST RESULT: {status}\n\n{}",
        result.blocks()
    );

    Decision { status, report }
}
