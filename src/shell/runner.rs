//! Lifecycle runner for shells.
//!
//! Owns the observe → collapse → trace order so no shell variant can
//! reorder or skip phases, and attributes errors to the phase that raised
//! them.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Shell;
use super::types::{AttributionTrace, CollapseOutcome, Observation};
use crate::error::{ErrorCode, Result};
use crate::metadata::ShellMetadata;
use crate::registry::ShellRegistry;
use crate::target::TargetModel;

/// Options for controlling suite execution.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop the suite on the first shell that cannot run.
    pub fail_fast: bool,

    /// Only run shells carrying at least one of these tags.
    pub include_tags: Vec<String>,

    /// Skip shells carrying any of these tags.
    pub exclude_tags: Vec<String>,
}

/// Consolidated record of one shell invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellRun {
    /// Unique id for this invocation.
    pub invocation_id: String,

    /// Metadata snapshot of the shell that ran.
    pub metadata: ShellMetadata,

    /// Target the shell ran against.
    pub model_id: String,

    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Baseline captured before perturbation.
    pub observation: Observation,

    /// Collapse verdict and residue.
    pub outcome: CollapseOutcome,

    /// Derived attribution trace.
    pub trace: AttributionTrace,
}

/// A shell that could not complete its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFailure {
    pub shell_id: String,
    pub code: ErrorCode,
    pub message: String,
}

/// Report for a suite of shells run against one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Target the suite ran against.
    pub model_id: String,

    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,

    /// Completed runs, in registration order.
    pub runs: Vec<ShellRun>,

    /// Shells that could not complete.
    #[serde(default)]
    pub failures: Vec<RunFailure>,

    /// Shells skipped by tag filters.
    pub skipped: usize,
}

impl SuiteReport {
    /// True when every selected shell completed its lifecycle. Shells that
    /// ran and reported `Resisted` still count as completed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }

    #[must_use]
    pub fn induced_count(&self) -> usize {
        self.runs.iter().filter(|r| r.outcome.is_induced()).count()
    }

    #[must_use]
    pub fn resisted_count(&self) -> usize {
        self.runs.iter().filter(|r| !r.outcome.is_induced()).count()
    }
}

/// Drive one shell through its full lifecycle against a target.
///
/// Phase order is fixed: trace never runs unless collapse returned `Ok`,
/// and collapse never runs unless observation succeeded. Observation and
/// trace errors surface as analysis failures, collapse errors as
/// infrastructure failures, each stamped with the shell id.
pub fn run(shell: &mut dyn Shell, target: &mut dyn TargetModel) -> Result<ShellRun> {
    let started_at = Utc::now();
    let start = Instant::now();
    let metadata = shell.metadata().clone();
    let shell_id = metadata.shell_id.clone();
    let invocation_id = Uuid::new_v4().to_string();

    debug!(
        shell_id = %shell_id,
        invocation_id = %invocation_id,
        model_id = %target.model_id(),
        "starting shell run"
    );

    let observation = shell
        .observe(&*target)
        .map_err(|e| e.into_observation_failure(&shell_id))?;
    debug!(shell_id = %shell_id, signals = observation.signals.len(), "observation captured");

    let outcome = shell
        .collapse(target)
        .map_err(|e| e.into_infrastructure(&shell_id))?;
    debug!(shell_id = %shell_id, state = ?outcome.state, "collapse phase complete");

    let trace = shell
        .trace(&observation, &outcome)
        .map_err(|e| e.into_trace_failure(&shell_id))?;

    let duration_ms = start.elapsed().as_millis() as u64;
    info!(
        shell_id = %shell_id,
        induced = outcome.is_induced(),
        ghost_circuits = trace.ghost_circuits.len(),
        duration_ms,
        "shell run complete"
    );

    Ok(ShellRun {
        invocation_id,
        metadata,
        model_id: target.model_id().to_string(),
        started_at,
        duration_ms,
        observation,
        outcome,
        trace,
    })
}

/// Runner for registered shells.
pub struct ShellRunner<'a> {
    registry: &'a ShellRegistry,
    options: RunOptions,
}

impl<'a> ShellRunner<'a> {
    /// Create a new runner over a registry.
    pub fn new(registry: &'a ShellRegistry, options: RunOptions) -> Self {
        Self { registry, options }
    }

    /// Resolve a shell by id, instantiate it, and drive its lifecycle.
    pub fn run_shell(&self, shell_id: &str, target: &mut dyn TargetModel) -> Result<ShellRun> {
        let mut shell = self.registry.instantiate(shell_id)?;

        // Registration validates this; a factory handing back a different
        // shell is worth flagging but not fatal.
        if shell.metadata().shell_id != shell_id {
            warn!(
                requested = %shell_id,
                produced = %shell.metadata().shell_id,
                "factory produced a shell with mismatched id"
            );
        }

        run(shell.as_mut(), target)
    }

    /// Run every registered shell against the target, in registration
    /// order. Failures are collected per shell, not propagated; the report
    /// tells them apart from shells that merely reported `Resisted`.
    pub fn run_all(&self, target: &mut dyn TargetModel) -> SuiteReport {
        let started_at = Utc::now();
        let start = Instant::now();

        let mut runs = Vec::new();
        let mut failures = Vec::new();
        let mut skipped = 0;

        for metadata in self.registry.list() {
            if !self.should_run(metadata) {
                skipped += 1;
                continue;
            }

            match self.run_shell(&metadata.shell_id, &mut *target) {
                Ok(run) => runs.push(run),
                Err(e) => {
                    warn!(shell_id = %metadata.shell_id, error = %e, "shell failed to complete");
                    failures.push(RunFailure {
                        shell_id: metadata.shell_id.clone(),
                        code: e.code(),
                        message: e.to_string(),
                    });
                    if self.options.fail_fast {
                        break;
                    }
                }
            }
        }

        SuiteReport {
            model_id: target.model_id().to_string(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            runs,
            failures,
            skipped,
        }
    }

    /// Tag filtering, same rules as test selection: include list first,
    /// then exclusions.
    fn should_run(&self, metadata: &ShellMetadata) -> bool {
        if !self.options.include_tags.is_empty() {
            let has_include = metadata
                .tags
                .iter()
                .any(|t| self.options.include_tags.contains(t));
            if !has_include {
                return false;
            }
        }

        if !self.options.exclude_tags.is_empty() {
            let has_exclude = metadata
                .tags
                .iter()
                .any(|t| self.options.exclude_tags.contains(t));
            if has_exclude {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResidueError;
    use crate::test_utils::{RecordingShell, ScriptedTarget};

    #[test]
    fn test_run_executes_phases_in_order() {
        let mut shell = RecordingShell::new("collapse.001");
        let log = shell.log_handle();
        let mut target = ScriptedTarget::new("scripted");

        let run = run(&mut shell, &mut target).unwrap();

        assert_eq!(*log.lock(), vec!["observe", "collapse", "trace"]);
        assert_eq!(run.metadata.shell_id, "collapse.001");
        assert_eq!(run.model_id, "scripted");
        assert!(!run.invocation_id.is_empty());
    }

    #[test]
    fn test_observation_error_stops_before_collapse() {
        let mut shell = RecordingShell::new("collapse.001").fail_observe();
        let log = shell.log_handle();
        let mut target = ScriptedTarget::new("scripted");

        let err = run(&mut shell, &mut target).unwrap_err();
        assert!(matches!(err, ResidueError::ObservationFailed { .. }));
        assert!(err.is_analysis());
        assert_eq!(*log.lock(), vec!["observe"]);
    }

    #[test]
    fn test_collapse_error_is_infrastructure_and_skips_trace() {
        let mut shell = RecordingShell::new("collapse.001").fail_collapse();
        let log = shell.log_handle();
        let mut target = ScriptedTarget::new("scripted");

        let err = run(&mut shell, &mut target).unwrap_err();
        assert!(err.is_infrastructure());
        assert_eq!(*log.lock(), vec!["observe", "collapse"]);
    }

    #[test]
    fn test_trace_error_is_analysis() {
        let mut shell = RecordingShell::new("collapse.001").fail_trace();
        let mut target = ScriptedTarget::new("scripted");

        let err = run(&mut shell, &mut target).unwrap_err();
        assert!(matches!(err, ResidueError::TraceFailed { .. }));
        assert!(err.is_analysis());
    }

    #[test]
    fn test_resisted_outcome_is_a_completed_run() {
        let mut shell = RecordingShell::new("collapse.001").resist();
        let mut target = ScriptedTarget::new("scripted");

        let run = run(&mut shell, &mut target).unwrap();
        assert!(!run.outcome.is_induced());
    }
}
