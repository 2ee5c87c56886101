//! Artifacts produced by the shell lifecycle: observations, collapse
//! outcomes, residue, and attribution traces.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::target::Signal;

/// Baseline capture from the observation phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Shell that captured this observation.
    pub shell_id: String,
    /// Capture time.
    pub captured_at: DateTime<Utc>,
    /// Signals recorded before any perturbation.
    pub signals: Vec<Signal>,
    /// Free-form shell notes (probe texts, control settings).
    #[serde(default)]
    pub payload: Value,
}

impl Observation {
    pub fn new(shell_id: impl Into<String>) -> Self {
        Self {
            shell_id: shell_id.into(),
            captured_at: Utc::now(),
            signals: vec![],
            payload: Value::Null,
        }
    }

    /// Append a baseline signal.
    #[must_use]
    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signals.push(signal);
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Whether collapse pressure actually broke the target.
///
/// Both variants are successful analyses. A shell that ran its perturbation
/// and watched the target hold up reports `Resisted`, not an error; errors
/// are reserved for probes that could not run at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollapseState {
    /// The target's behavior degraded under pressure.
    Induced,
    /// The target held; no degradation observed.
    Resisted,
}

/// What a shell leaves behind when the target collapses: the measurable
/// scraps of the failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Residue {
    /// Qualitative markers, e.g. `"null-output"` or `"hedge-language"`.
    #[serde(default)]
    pub markers: Vec<String>,
    /// Quantitative readings keyed by channel.
    #[serde(default)]
    pub readings: BTreeMap<String, f64>,
}

impl Residue {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty() && self.readings.is_empty()
    }

    /// Append a qualitative marker.
    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.markers.push(marker.into());
        self
    }

    /// Record a quantitative reading.
    #[must_use]
    pub fn with_reading(mut self, channel: impl Into<String>, value: f64) -> Self {
        self.readings.insert(channel.into(), value);
        self
    }
}

/// Result of the collapse phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollapseOutcome {
    pub shell_id: String,
    pub state: CollapseState,
    /// Human-readable evidence lines backing the verdict.
    #[serde(default)]
    pub evidence: Vec<String>,
    /// Residue recovered from the collapsed (or resisting) target.
    #[serde(default)]
    pub residue: Residue,
}

impl CollapseOutcome {
    pub fn new(shell_id: impl Into<String>, state: CollapseState) -> Self {
        Self {
            shell_id: shell_id.into(),
            state,
            evidence: vec![],
            residue: Residue::default(),
        }
    }

    #[must_use]
    pub fn with_evidence(mut self, line: impl Into<String>) -> Self {
        self.evidence.push(line.into());
        self
    }

    #[must_use]
    pub fn with_residue(mut self, residue: Residue) -> Self {
        self.residue = residue;
        self
    }

    #[must_use]
    pub const fn is_induced(&self) -> bool {
        matches!(self.state, CollapseState::Induced)
    }
}

/// One channel's before/after reading. The attribution score is the signal
/// mass lost to the collapse (baseline minus collapsed), so a positive score
/// marks a channel the failure drained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GhostCircuit {
    pub channel: String,
    pub baseline: f64,
    pub collapsed: f64,
    pub attribution: f64,
}

impl GhostCircuit {
    pub fn new(channel: impl Into<String>, baseline: f64, collapsed: f64) -> Self {
        Self {
            channel: channel.into(),
            baseline,
            collapsed,
            attribution: baseline - collapsed,
        }
    }
}

/// Attribution residue produced by the trace phase: which circuits went
/// quiet, and by how much.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionTrace {
    pub shell_id: String,
    /// Attribution domain copied from the shell's metadata.
    pub domain: String,
    pub ghost_circuits: Vec<GhostCircuit>,
    /// One-paragraph reading of the trace.
    #[serde(default)]
    pub summary: String,
}

impl AttributionTrace {
    pub fn new(shell_id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            shell_id: shell_id.into(),
            domain: domain.into(),
            ghost_circuits: vec![],
            summary: String::new(),
        }
    }

    #[must_use]
    pub fn with_circuit(mut self, circuit: GhostCircuit) -> Self {
        self.ghost_circuits.push(circuit);
        self
    }

    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// The circuit with the largest absolute attribution, if any.
    #[must_use]
    pub fn strongest(&self) -> Option<&GhostCircuit> {
        self.ghost_circuits
            .iter()
            .max_by(|a, b| a.attribution.abs().total_cmp(&b.attribution.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_residue_empty_until_marked() {
        let residue = Residue::default();
        assert!(residue.is_empty());

        let residue = residue.with_marker("null-output");
        assert!(!residue.is_empty());

        let readings_only = Residue::default().with_reading("qk.L3", 0.02);
        assert!(!readings_only.is_empty());
    }

    #[test]
    fn test_outcome_state_predicates() {
        let induced = CollapseOutcome::new("collapse.001", CollapseState::Induced);
        assert!(induced.is_induced());

        let resisted = CollapseOutcome::new("collapse.001", CollapseState::Resisted);
        assert!(!resisted.is_induced());
    }

    #[test]
    fn test_ghost_circuit_attribution_is_signal_lost() {
        let circuit = GhostCircuit::new("qk.L3", 0.8, 0.1);
        assert!((circuit.attribution - 0.7).abs() < 1e-9);

        // A channel that grew under pressure attributes negative
        let grew = GhostCircuit::new("ov.L9", 0.2, 0.5);
        assert!(grew.attribution < 0.0);
    }

    #[test]
    fn test_strongest_circuit_uses_absolute_attribution() {
        let trace = AttributionTrace::new("collapse.001", "attention")
            .with_circuit(GhostCircuit::new("qk.L2", 0.3, 0.2))
            .with_circuit(GhostCircuit::new("ov.L9", 0.1, 0.9))
            .with_circuit(GhostCircuit::new("qk.L3", 0.5, 0.4));
        assert_eq!(trace.strongest().unwrap().channel, "ov.L9");

        let empty = AttributionTrace::new("collapse.001", "attention");
        assert!(empty.strongest().is_none());
    }

    #[test]
    fn test_observation_builder_collects_signals() {
        let obs = Observation::new("v1.memtrace")
            .with_signal(Signal::new("alpha"))
            .with_signal(Signal::new("beta"))
            .with_payload(serde_json::json!({"probes": 2}));
        assert_eq!(obs.signals.len(), 2);
        assert_eq!(obs.payload["probes"], 2);
    }
}
