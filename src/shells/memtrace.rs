//! `v1.memtrace`: memory-trace decay probe.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ghost_circuits_between, merged_channels, token_overlap};
use crate::config::TraceConfig;
use crate::error::{ResidueError, Result};
use crate::metadata::ShellMetadata;
use crate::shell::Shell;
use crate::shell::types::{
    AttributionTrace, CollapseOutcome, CollapseState, Observation, Residue,
};
use crate::target::{Probe, TargetModel};

/// Configuration for the memory-trace probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemtraceConfig {
    /// Span the target is asked to hold on to.
    pub seed_span: String,
    /// Distractor sentence layered between seeding and recall.
    pub distractor: String,
    /// Distractor repetitions in the collapse probe.
    pub distractor_rounds: usize,
    /// Recall overlap below this floor counts as decayed.
    pub recall_floor: f64,
    /// Ghost circuits under this absolute attribution are dropped.
    pub attribution_floor: f64,
}

impl Default for MemtraceConfig {
    fn default() -> Self {
        Self {
            seed_span: "the archive key is blue river forty two".to_string(),
            distractor: "meanwhile the audit log rotated and the cache warmed again".to_string(),
            distractor_rounds: 6,
            recall_floor: 0.5,
            attribution_floor: TraceConfig::default().attribution_floor,
        }
    }
}

/// Seeds a token span, floods the context with distractors, and measures
/// how much of the span the target can still reproduce. Decay is only
/// attributed when baseline recall was intact.
#[derive(Debug)]
pub struct MemtraceShell {
    metadata: ShellMetadata,
    config: MemtraceConfig,
    baseline_recall: Option<f64>,
}

impl MemtraceShell {
    pub const SHELL_ID: &'static str = "v1.memtrace";

    /// Catalog metadata for this shell.
    #[must_use]
    pub fn catalog_metadata() -> ShellMetadata {
        ShellMetadata::new(
            Self::SHELL_ID,
            "1.0.0",
            "Memory Trace Decay",
            "Seeds a token span, floods the context with distractors, and measures surviving recall",
            "decayed-recall",
            "token-recall",
            "QK-COLLAPSE",
        )
        .with_related_shells(["v3.layer-salience"])
        .with_authors(["Recursion Labs"])
        .with_tags(["builtin", "memory"])
    }

    #[must_use]
    pub fn new(config: MemtraceConfig) -> Self {
        Self {
            metadata: Self::catalog_metadata(),
            config,
            baseline_recall: None,
        }
    }

    fn recall_probe(&self, rounds: usize) -> Probe {
        let mut text = format!("Hold this span: {}.", self.config.seed_span);
        for _ in 0..rounds {
            text.push(' ');
            text.push_str(&self.config.distractor);
            text.push('.');
        }
        text.push_str(" Now repeat the span exactly.");
        Probe::new(text)
    }
}

impl Default for MemtraceShell {
    fn default() -> Self {
        Self::new(MemtraceConfig::default())
    }
}

impl Shell for MemtraceShell {
    fn metadata(&self) -> &ShellMetadata {
        &self.metadata
    }

    fn observe(&mut self, target: &dyn TargetModel) -> Result<Observation> {
        let probe = self.recall_probe(0);
        let response = target.respond(&probe)?;
        let recall = token_overlap(&self.config.seed_span, &response.text);
        self.baseline_recall = Some(recall);

        let signal = response.with_channel("recall.overlap", recall);
        Ok(Observation::new(Self::SHELL_ID)
            .with_signal(signal)
            .with_payload(json!({
                "probe": probe.text,
                "baseline_recall": recall,
            })))
    }

    fn collapse(&mut self, target: &mut dyn TargetModel) -> Result<CollapseOutcome> {
        let baseline = self.baseline_recall.ok_or_else(|| {
            ResidueError::infrastructure(Self::SHELL_ID, "collapse invoked before observe")
        })?;

        let rounds = self.config.distractor_rounds;
        let probe = self
            .recall_probe(rounds)
            .with_control("distractor_rounds", rounds.to_string());
        let response = target.respond_perturbed(&probe)?;
        let recall = token_overlap(&self.config.seed_span, &response.text);

        let floor = self.config.recall_floor;
        let had_baseline = baseline >= floor;
        let decayed = recall < floor;

        let mut residue = Residue::default().with_reading("recall.overlap", recall);

        let outcome = if had_baseline && decayed {
            residue = residue.with_marker("decayed-recall");
            if response.is_null() {
                residue = residue.with_marker("null-recall");
            }
            CollapseOutcome::new(Self::SHELL_ID, CollapseState::Induced)
                .with_evidence(format!(
                    "recall overlap fell from {baseline:.2} to {recall:.2} after {rounds} distractor rounds"
                ))
                .with_residue(residue)
        } else if had_baseline {
            CollapseOutcome::new(Self::SHELL_ID, CollapseState::Resisted)
                .with_evidence(format!(
                    "recall overlap held at {recall:.2} under {rounds} distractor rounds (floor {floor:.2})"
                ))
                .with_residue(residue)
        } else {
            // Recall was broken before any pressure; nothing to attribute
            CollapseOutcome::new(Self::SHELL_ID, CollapseState::Resisted)
                .with_evidence(format!(
                    "baseline recall {baseline:.2} already under the floor {floor:.2}; decay not attributable"
                ))
                .with_residue(residue)
        };

        Ok(outcome)
    }

    fn trace(
        &self,
        observation: &Observation,
        outcome: &CollapseOutcome,
    ) -> Result<AttributionTrace> {
        let baseline = merged_channels(&observation.signals);
        let circuits = ghost_circuits_between(
            &baseline,
            &outcome.residue.readings,
            self.config.attribution_floor,
        );

        let summary = if outcome.is_induced() {
            format!(
                "seeded span decayed below the {:.2} recall floor; {} channel(s) lost signal",
                self.config.recall_floor,
                circuits.len()
            )
        } else {
            "recall held; no decay attributable to distractor load".to_string()
        };

        Ok(AttributionTrace {
            shell_id: Self::SHELL_ID.to_string(),
            domain: self.metadata.attribution_domain.clone(),
            ghost_circuits: circuits,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::runner;
    use crate::target::Signal;
    use crate::test_utils::ScriptedTarget;

    fn span() -> String {
        MemtraceConfig::default().seed_span
    }

    #[test]
    fn test_decayed_recall_is_induced() {
        let mut shell = MemtraceShell::default();
        let mut target = ScriptedTarget::new("scripted")
            .with_response(Signal::new(span()))
            .with_perturbed_response(Signal::new("the log rotated and nothing else remains"));

        let run = runner::run(&mut shell, &mut target).unwrap();

        assert!(run.outcome.is_induced());
        assert!(run.outcome.residue.markers.contains(&"decayed-recall".to_string()));

        let circuit = run.trace.strongest().unwrap();
        assert_eq!(circuit.channel, "recall.overlap");
        assert!(circuit.attribution > 0.5);
    }

    #[test]
    fn test_intact_recall_resists() {
        let mut shell = MemtraceShell::default();
        let mut target = ScriptedTarget::new("scripted")
            .with_response(Signal::new(span()))
            .with_perturbed_response(Signal::new(span()));

        let run = runner::run(&mut shell, &mut target).unwrap();

        assert!(!run.outcome.is_induced());
        assert!(run.trace.ghost_circuits.is_empty());
    }

    #[test]
    fn test_broken_baseline_is_not_attributed_as_decay() {
        let mut shell = MemtraceShell::default();
        let mut target = ScriptedTarget::new("scripted")
            .with_response(Signal::new("completely unrelated words here"))
            .with_perturbed_response(Signal::new(""));

        let run = runner::run(&mut shell, &mut target).unwrap();

        assert!(!run.outcome.is_induced());
        assert!(run.outcome.evidence[0].contains("not attributable"));
    }

    #[test]
    fn test_null_recall_marks_residue() {
        let mut shell = MemtraceShell::default();
        let mut target = ScriptedTarget::new("scripted")
            .with_response(Signal::new(span()))
            .with_perturbed_response(Signal::new(""));

        let run = runner::run(&mut shell, &mut target).unwrap();

        assert!(run.outcome.is_induced());
        assert!(run.outcome.residue.markers.contains(&"null-recall".to_string()));
    }

    #[test]
    fn test_collapse_before_observe_is_infrastructure() {
        let mut shell = MemtraceShell::default();
        let mut target = ScriptedTarget::new("scripted");

        let err = shell.collapse(&mut target).unwrap_err();
        assert!(err.is_infrastructure());
    }

    #[test]
    fn test_trace_is_deterministic() {
        let mut shell = MemtraceShell::default();
        let mut target = ScriptedTarget::new("scripted")
            .with_response(Signal::new(span()))
            .with_perturbed_response(Signal::new("noise"));

        let observation = shell.observe(&target).unwrap();
        let outcome = shell.collapse(&mut target).unwrap();

        let first = shell.trace(&observation, &outcome).unwrap();
        let second = shell.trace(&observation, &outcome).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_probe_carries_distractor_rounds_control() {
        let mut shell = MemtraceShell::default();
        let mut target = ScriptedTarget::new("scripted")
            .with_response(Signal::new(span()))
            .with_perturbed_response(Signal::new(""));

        shell.observe(&target).unwrap();
        shell.collapse(&mut target).unwrap();

        let probes = target.probes();
        let collapse_probe = probes.last().unwrap();
        assert!(collapse_probe
            .controls
            .iter()
            .any(|(k, v)| k == "distractor_rounds" && v == "6"));
        assert!(collapse_probe.text.contains("repeat the span"));
    }
}
