//! Workflow boundary markers in plain-text runner output.
//!
//! The runner prints fixed sentinel lines around a run. They are matched as
//! literal substrings.

/// Printed when the runner begins executing a flow.
pub const WORKFLOW_STARTED: &str = "Starting workflow...";

/// Normal completion.
pub const WORKFLOW_FINISHED: &[&str] = &["Workflow finished", "Workflow completed"];

/// The user stopped the run.
pub const WORKFLOW_STOPPED: &[&str] = &["Workflow stopped by user", "Execution stopped by user"];

/// The run crashed.
pub const WORKFLOW_FAILED: &[&str] = &["Workflow execution failed", "Execution failed:"];

/// Trailing "done" lines some runners emit after the final summary.
pub const WORKFLOW_DONE: &[&str] = &["Done running the flow.", "<Runner> - Done."];

/// Which boundary a line announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowMarker {
    Started,
    Finished,
    Stopped,
    Failed,
    Done,
}

impl WorkflowMarker {
    /// Every marker except `Started` ends the run.
    pub fn is_end(self) -> bool {
        !matches!(self, Self::Started)
    }
}

/// Classify `text` by the first marker it contains.
///
/// End markers are checked before the start marker so a line that echoes
/// both reports the end.
pub fn detect_marker(text: &str) -> Option<WorkflowMarker> {
    let families: [(&[&str], WorkflowMarker); 4] = [
        (WORKFLOW_FAILED, WorkflowMarker::Failed),
        (WORKFLOW_STOPPED, WorkflowMarker::Stopped),
        (WORKFLOW_FINISHED, WorkflowMarker::Finished),
        (WORKFLOW_DONE, WorkflowMarker::Done),
    ];
    for (needles, marker) in families {
        if needles.iter().any(|needle| text.contains(needle)) {
            return Some(marker);
        }
    }
    text.contains(WORKFLOW_STARTED)
        .then_some(WorkflowMarker::Started)
}
