//! Step-by-step action reports.

use serde::{Deserialize, Serialize};

/// Outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step changed external state as intended.
    Completed,
    /// Step failed; see `detail`.
    Failed,
    /// Step not needed.
    Skipped,
}

/// One step of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step name, e.g. `capture_hold`.
    pub step: String,
    /// Outcome.
    pub status: StepStatus,
    /// External ID created or touched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Error or explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StepRecord {
    /// A completed step.
    pub fn completed(step: impl Into<String>, external_id: Option<String>) -> Self {
        Self {
            step: step.into(),
            status: StepStatus::Completed,
            external_id,
            detail: None,
        }
    }

    /// A failed step.
    pub fn failed(step: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            status: StepStatus::Failed,
            external_id: None,
            detail: Some(detail.into()),
        }
    }

    /// A skipped step.
    pub fn skipped(step: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            status: StepStatus::Skipped,
            external_id: None,
            detail: Some(detail.into()),
        }
    }
}

/// Result of a payment action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReport {
    /// Steps in execution order.
    pub steps: Vec<StepRecord>,
    /// Non-fatal failures an operator should look at.
    pub warnings: Vec<String>,
    /// Hosted checkout page, for actions that create one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
}

impl ActionReport {
    /// Records a completed step.
    pub fn completed(&mut self, step: &str, external_id: Option<String>) {
        self.steps.push(StepRecord::completed(step, external_id));
    }

    /// Records a failed non-fatal step and raises a warning.
    pub fn failed_non_fatal(&mut self, step: &str, detail: impl Into<String>) {
        let detail = detail.into();
        self.warnings.push(format!("{step}: {detail}"));
        self.steps.push(StepRecord::failed(step, detail));
    }

    /// Records a skipped step.
    pub fn skipped(&mut self, step: &str, detail: impl Into<String>) {
        self.steps.push(StepRecord::skipped(step, detail));
    }

    /// Steps that completed, for partial-failure reporting.
    #[must_use]
    pub fn completed_steps(&self) -> Vec<StepRecord> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .cloned()
            .collect()
    }

    /// Returns the step with `name`.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.step == name)
    }
}
