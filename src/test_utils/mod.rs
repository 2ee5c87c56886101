//! Shared test utilities for residue.

// env::set_var and env::remove_var are unsafe in Rust 2024
#![allow(unsafe_code)]

use std::collections::VecDeque;
use std::env;
use std::ffi::OsString;
use std::io;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};

use crate::error::{ResidueError, Result};
use crate::metadata::ShellMetadata;
use crate::shell::Shell;
use crate::shell::types::{
    AttributionTrace, CollapseOutcome, CollapseState, GhostCircuit, Observation, Residue,
};
use crate::target::{Probe, Signal, TargetModel};

/// Minimal valid metadata for tests.
#[must_use]
pub fn sample_metadata(shell_id: &str) -> ShellMetadata {
    ShellMetadata::new(
        shell_id,
        "1.0.0",
        "Sample Probe",
        "sample probe used by the test suite",
        "silent-drop",
        "attention",
        "QK-COLLAPSE",
    )
}

/// Target double driven by scripted responses.
///
/// `respond` consumes the scripted queue in order and falls back to
/// echoing the probe text once the queue is empty. Perturbed responses
/// have their own queue, checked first by `respond_perturbed`. Every probe
/// seen is logged for assertions.
pub struct ScriptedTarget {
    model_id: String,
    responses: Mutex<VecDeque<Signal>>,
    perturbed: Mutex<VecDeque<Signal>>,
    probes: Mutex<Vec<Probe>>,
    fail_respond: bool,
    fail_perturbed: bool,
}

impl ScriptedTarget {
    #[must_use]
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            responses: Mutex::new(VecDeque::new()),
            perturbed: Mutex::new(VecDeque::new()),
            probes: Mutex::new(Vec::new()),
            fail_respond: false,
            fail_perturbed: false,
        }
    }

    /// Queue a response for `respond` (and `respond_perturbed` overflow).
    #[must_use]
    pub fn with_response(self, signal: Signal) -> Self {
        self.responses.lock().push_back(signal);
        self
    }

    /// Queue a response consumed only by `respond_perturbed`.
    #[must_use]
    pub fn with_perturbed_response(self, signal: Signal) -> Self {
        self.perturbed.lock().push_back(signal);
        self
    }

    /// Make `respond` fail with an I/O error.
    #[must_use]
    pub fn failing_respond(mut self) -> Self {
        self.fail_respond = true;
        self
    }

    /// Make `respond_perturbed` fail with an I/O error.
    #[must_use]
    pub fn failing_perturbed(mut self) -> Self {
        self.fail_perturbed = true;
        self
    }

    /// Snapshot of every probe seen so far.
    #[must_use]
    pub fn probes(&self) -> Vec<Probe> {
        self.probes.lock().clone()
    }
}

impl TargetModel for ScriptedTarget {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn respond(&self, probe: &Probe) -> Result<Signal> {
        self.probes.lock().push(probe.clone());
        if self.fail_respond {
            return Err(ResidueError::Io(io::Error::other(
                "scripted respond failure",
            )));
        }
        let scripted = self.responses.lock().pop_front();
        Ok(scripted.unwrap_or_else(|| Signal::new(probe.text.clone())))
    }

    fn respond_perturbed(&mut self, probe: &Probe) -> Result<Signal> {
        self.probes.lock().push(probe.clone());
        if self.fail_perturbed {
            return Err(ResidueError::Io(io::Error::other(
                "scripted perturbed failure",
            )));
        }
        let scripted = {
            let mut perturbed = self.perturbed.lock();
            match perturbed.pop_front() {
                Some(signal) => Some(signal),
                None => self.responses.lock().pop_front(),
            }
        };
        Ok(scripted.unwrap_or_else(|| Signal::new(probe.text.clone())))
    }
}

/// Shell double that records the order its phases run in.
pub struct RecordingShell {
    metadata: ShellMetadata,
    log: Arc<Mutex<Vec<&'static str>>>,
    fail_observe: bool,
    fail_collapse: bool,
    fail_trace: bool,
    resist: bool,
}

impl RecordingShell {
    #[must_use]
    pub fn new(shell_id: &str) -> Self {
        Self {
            metadata: sample_metadata(shell_id),
            log: Arc::new(Mutex::new(Vec::new())),
            fail_observe: false,
            fail_collapse: false,
            fail_trace: false,
            resist: false,
        }
    }

    /// Handle onto the phase log; survives the shell being moved into a
    /// runner.
    #[must_use]
    pub fn log_handle(&self) -> Arc<Mutex<Vec<&'static str>>> {
        Arc::clone(&self.log)
    }

    /// Make `observe` fail with an I/O error.
    #[must_use]
    pub fn fail_observe(mut self) -> Self {
        self.fail_observe = true;
        self
    }

    /// Make `collapse` fail with an I/O error.
    #[must_use]
    pub fn fail_collapse(mut self) -> Self {
        self.fail_collapse = true;
        self
    }

    /// Make `trace` fail with an I/O error.
    #[must_use]
    pub fn fail_trace(mut self) -> Self {
        self.fail_trace = true;
        self
    }

    /// Report `Resisted` instead of `Induced` from collapse.
    #[must_use]
    pub fn resist(mut self) -> Self {
        self.resist = true;
        self
    }
}

impl Shell for RecordingShell {
    fn metadata(&self) -> &ShellMetadata {
        &self.metadata
    }

    fn observe(&mut self, target: &dyn TargetModel) -> Result<Observation> {
        self.log.lock().push("observe");
        if self.fail_observe {
            return Err(ResidueError::Io(io::Error::other(
                "scripted observation failure",
            )));
        }
        let signal = target.respond(&Probe::new("ping"))?;
        Ok(Observation::new(&self.metadata.shell_id).with_signal(signal))
    }

    fn collapse(&mut self, _target: &mut dyn TargetModel) -> Result<CollapseOutcome> {
        self.log.lock().push("collapse");
        if self.fail_collapse {
            return Err(ResidueError::Io(io::Error::other(
                "scripted collapse failure",
            )));
        }
        let state = if self.resist {
            CollapseState::Resisted
        } else {
            CollapseState::Induced
        };
        Ok(CollapseOutcome::new(&self.metadata.shell_id, state)
            .with_evidence("synthetic collapse for tests")
            .with_residue(Residue::default().with_reading("synthetic.channel", 0.0)))
    }

    fn trace(
        &self,
        observation: &Observation,
        _outcome: &CollapseOutcome,
    ) -> Result<AttributionTrace> {
        self.log.lock().push("trace");
        if self.fail_trace {
            return Err(ResidueError::Io(io::Error::other("scripted trace failure")));
        }
        Ok(
            AttributionTrace::new(&observation.shell_id, &self.metadata.attribution_domain)
                .with_circuit(GhostCircuit::new("synthetic.channel", 1.0, 0.0))
                .with_summary("synthetic trace for tests"),
        )
    }
}

/// Serializes every test that reads or writes process environment
/// variables; the environment is shared state across the whole test
/// binary.
static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// RAII guard for temporarily setting environment variables.
///
/// The guard holds `ENV_LOCK` for its whole lifetime and restores every
/// modified variable to its prior value on drop, panics included. Tests
/// that only read the environment (for example through `Config::load`)
/// take the same lock with [`EnvGuard::new`] and set nothing.
///
/// Take at most one guard per test; the lock is not reentrant and a
/// second guard on the same thread deadlocks.
#[derive(Debug)]
pub struct EnvGuard {
    /// Prior values: `Some` for vars that were set, `None` for unset ones.
    original_values: Vec<(String, Option<OsString>)>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Take the environment lock without modifying anything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            original_values: Vec::new(),
            _lock: ENV_LOCK.lock(),
        }
    }

    /// Set an environment variable, saving the prior value.
    #[must_use]
    pub fn set(mut self, key: &str, value: &str) -> Self {
        self.original_values
            .push((key.to_string(), env::var_os(key)));
        // SAFETY: ENV_LOCK serializes every env-touching test in this
        // binary, and Drop restores the prior value before releasing it.
        unsafe { env::set_var(key, value) };
        self
    }

    /// Remove an environment variable, saving the prior value.
    #[must_use]
    pub fn unset(mut self, key: &str) -> Self {
        self.original_values
            .push((key.to_string(), env::var_os(key)));
        // SAFETY: as in `set`.
        unsafe { env::remove_var(key) };
        self
    }
}

impl Default for EnvGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // Restore in reverse order so repeated sets of one key unwind to
        // the original value. The lock field drops after this body, so
        // restoration finishes while the lock is still held.
        for (key, original) in self.original_values.iter().rev() {
            // SAFETY: restoring saved state under ENV_LOCK.
            unsafe {
                match original {
                    Some(value) => env::set_var(key, value),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_guard_applies_and_restores_on_drop() {
        {
            let _guard = EnvGuard::new()
                .set("RESIDUE_GUARD_PRIOR", "kept")
                .set("RESIDUE_GUARD_PRIOR", "overridden")
                .set("RESIDUE_GUARD_FRESH", "temporary")
                .unset("RESIDUE_GUARD_PRIOR");
            assert!(env::var("RESIDUE_GUARD_PRIOR").is_err());
            assert_eq!(env::var("RESIDUE_GUARD_FRESH").unwrap(), "temporary");
        }

        let _env = EnvGuard::new();
        assert!(env::var("RESIDUE_GUARD_PRIOR").is_err());
        assert!(env::var("RESIDUE_GUARD_FRESH").is_err());
    }

    #[test]
    fn test_env_guard_serializes_concurrent_writers() {
        let writer = std::thread::spawn(|| {
            for _ in 0..16 {
                let _guard = EnvGuard::new().set("RESIDUE_GUARD_SHARED", "thread");
                assert_eq!(env::var("RESIDUE_GUARD_SHARED").unwrap(), "thread");
            }
        });

        for _ in 0..16 {
            let guard = EnvGuard::new();
            // A writer restores before releasing the lock, so a held guard
            // never sees another test's values
            assert!(env::var("RESIDUE_GUARD_SHARED").is_err());
            drop(guard);
        }

        writer.join().unwrap();
        let _env = EnvGuard::new();
        assert!(env::var("RESIDUE_GUARD_SHARED").is_err());
    }
}
