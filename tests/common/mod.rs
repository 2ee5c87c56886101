//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::sync::Once;

use residue::metadata::ShellMetadata;
use residue::registry::{ShellFactory, factory};
use residue::target::Signal;
use residue::test_utils::{RecordingShell, ScriptedTarget};

static TRACING: Once = Once::new();

/// Install a subscriber once so `RUST_LOG=residue=debug` surfaces runner
/// and registry events while debugging a test run.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// The worked example from the shell documentation: a ghost-circuit probe
/// with only the required fields set.
pub fn ghost_probe() -> ShellMetadata {
    ShellMetadata::new(
        "collapse.001",
        "1.0",
        "Ghost Circuit Probe",
        "Probes for silently dropped attention paths",
        "silent-drop",
        "attention",
        "QK-COLLAPSE",
    )
}

/// Factory producing a fresh [`RecordingShell`] under the given id.
pub fn recording_factory(shell_id: &str) -> ShellFactory {
    let shell_id = shell_id.to_string();
    factory(move || RecordingShell::new(&shell_id))
}

/// Target scripted so every builtin shell induces collapse when the
/// catalog runs in registration order: memtrace sees intact recall decay
/// to noise, value-collapse sees committed framings fuse to null, and
/// layer-salience sees every monitored channel fade under dampening.
pub fn collapsing_catalog_target() -> ScriptedTarget {
    ScriptedTarget::new("scripted:catalog")
        .with_response(Signal::new("the archive key is blue river forty two"))
        .with_response(Signal::new("ship it, velocity matters"))
        .with_response(Signal::new("keep it, stability matters"))
        .with_response(
            Signal::new("the incident summary")
                .with_channel("salience.l04", 0.8)
                .with_channel("salience.l12", 0.5)
                .with_channel("salience.l20", 0.3),
        )
        .with_perturbed_response(Signal::new("the log rotated and nothing else remains"))
        .with_perturbed_response(Signal::new(""))
        .with_perturbed_response(
            Signal::new("")
                .with_channel("salience.l04", 0.02)
                .with_channel("salience.l12", 0.01)
                .with_channel("salience.l20", 0.0),
        )
}
