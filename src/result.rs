//! Execution result and phase bookkeeping: what `Adapter::execute` returns
//! to the broker-callback adapter.

use crate::error::EngineError;
use crate::value_map::ValueMap;
use rustc_hash::FxHashMap;

/// The coarse-grained phase a translated legacy workflow passes through,
/// used to key `phase_outputs`/`phase_errors` for observability. A
/// Workflow-native document (no translator involved) records everything
/// under [`Phase::Execution`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    ParamExtraction,
    Preconditions,
    Resources,
    Post,
    Execution,
}

impl Phase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::ParamExtraction => "param-extraction",
            Phase::Preconditions => "preconditions",
            Phase::Resources => "resources",
            Phase::Post => "post",
            Phase::Execution => "execution",
        }
    }
}

/// Whether an execution completed or failed. There is no third "skipped"
/// state — a precondition mismatch is a successful execution with
/// `resources_skipped: true`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Failed,
}

/// Summarizes one workflow execution: final status, the originating error
/// (if failed), and per-phase outputs/errors for observability. Never
/// constructed as an `Err` — [`crate::facade::Adapter::execute`] folds every
/// failure mode into this type so the broker callback always receives a
/// normal return value.
#[derive(Debug)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub error_reason: Option<String>,
    pub error_message: Option<String>,
    pub resources_skipped: bool,
    pub skip_reason: Option<String>,
    pub phase_errors: FxHashMap<Phase, EngineError>,
    pub output: ValueMap,
    pub phase_outputs: FxHashMap<Phase, ValueMap>,
}

impl ExecutionResult {
    #[must_use]
    pub fn success(output: ValueMap) -> Self {
        Self {
            status: ExecutionStatus::Success,
            error_reason: None,
            error_message: None,
            resources_skipped: false,
            skip_reason: None,
            phase_errors: FxHashMap::default(),
            output,
            phase_outputs: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn failed(phase: Phase, error: EngineError, output: ValueMap) -> Self {
        let mut phase_errors = FxHashMap::default();
        let reason = error.reason().to_string();
        let message = error.to_string();
        phase_errors.insert(phase, error);
        Self {
            status: ExecutionStatus::Failed,
            error_reason: Some(reason),
            error_message: Some(message),
            resources_skipped: false,
            skip_reason: None,
            phase_errors,
            output,
            phase_outputs: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn with_skip(mut self, reason: impl Into<String>) -> Self {
        self.resources_skipped = true;
        self.skip_reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn with_phase_output(mut self, phase: Phase, v: ValueMap) -> Self {
        self.phase_outputs.insert(phase, v);
        self
    }

    #[must_use]
    pub fn with_phase_outputs(mut self, outputs: FxHashMap<Phase, ValueMap>) -> Self {
        self.phase_outputs = outputs;
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, ExtractError};

    #[test]
    fn success_result_has_no_error_fields() {
        let result = ExecutionResult::success(ValueMap::new());
        assert!(result.is_success());
        assert!(result.error_reason.is_none());
    }

    #[test]
    fn failed_result_records_reason_and_phase() {
        let error = EngineError::Extract(ExtractError::MissingRequired {
            name: "clusterId".to_string(),
            source: "event.id".to_string(),
        });
        let result = ExecutionResult::failed(Phase::ParamExtraction, error, ValueMap::new());
        assert!(!result.is_success());
        assert_eq!(result.error_reason.as_deref(), Some("extract_error"));
        assert!(result.phase_errors.contains_key(&Phase::ParamExtraction));
    }
}
