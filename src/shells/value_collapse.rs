//! `v2.value-collapse`: value-head conflict probe.

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ghost_circuits_between, merged_channels};
use crate::config::TraceConfig;
use crate::error::{ResidueError, Result};
use crate::metadata::ShellMetadata;
use crate::shell::Shell;
use crate::shell::types::{
    AttributionTrace, CollapseOutcome, CollapseState, Observation, Residue,
};
use crate::target::{Probe, TargetModel};

/// Hedge phrasing that signals the target could not commit to either value.
static HEDGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(cannot|can't|neither|impossible|no single|irreconcilable)\b").unwrap()
});

/// Configuration for the value-conflict probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueCollapseConfig {
    /// Proposition the framings contest.
    pub proposition: String,
    /// Competing framings. At least two, or the probe has no conflict to
    /// force.
    pub framings: Vec<String>,
    /// Ghost circuits under this absolute attribution are dropped.
    pub attribution_floor: f64,
}

impl Default for ValueCollapseConfig {
    fn default() -> Self {
        Self {
            proposition: "retire the legacy endpoint this quarter".to_string(),
            framings: vec!["argue for".to_string(), "argue against".to_string()],
            attribution_floor: TraceConfig::default().attribution_floor,
        }
    }
}

/// Observes each framing of a contested proposition separately, then fuses
/// the framings into one directive. A target whose value heads cannot
/// resolve the conflict goes null or hedges; either counts as induced
/// collapse.
#[derive(Debug)]
pub struct ValueCollapseShell {
    metadata: ShellMetadata,
    config: ValueCollapseConfig,
}

impl ValueCollapseShell {
    pub const SHELL_ID: &'static str = "v2.value-collapse";

    /// Catalog metadata for this shell.
    #[must_use]
    pub fn catalog_metadata() -> ShellMetadata {
        ShellMetadata::new(
            Self::SHELL_ID,
            "1.0.0",
            "Value Collapse",
            "Fuses competing value framings into one directive and records the null resolution",
            "null-response",
            "value-heads",
            "OV-NULL",
        )
        .with_related_shells(["v1.memtrace"])
        .with_authors(["Recursion Labs"])
        .with_tags(["builtin", "values"])
    }

    #[must_use]
    pub fn new(config: ValueCollapseConfig) -> Self {
        Self {
            metadata: Self::catalog_metadata(),
            config,
        }
    }

    fn channel_for(framing: &str) -> String {
        format!("value.{}", framing.to_lowercase().replace(' ', "-"))
    }

    fn require_conflict(&self) -> Result<()> {
        if self.config.framings.len() < 2 {
            return Err(ResidueError::Config(
                "value-collapse needs at least two framings".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ValueCollapseShell {
    fn default() -> Self {
        Self::new(ValueCollapseConfig::default())
    }
}

impl Shell for ValueCollapseShell {
    fn metadata(&self) -> &ShellMetadata {
        &self.metadata
    }

    fn observe(&mut self, target: &dyn TargetModel) -> Result<Observation> {
        self.require_conflict()?;

        let mut observation = Observation::new(Self::SHELL_ID).with_payload(json!({
            "proposition": self.config.proposition,
            "framings": self.config.framings,
        }));

        for framing in &self.config.framings {
            let probe = Probe::new(format!(
                "{framing}: {}. State the single strongest consideration.",
                self.config.proposition
            ));
            let response = target.respond(&probe)?;
            let strength = if response.is_null() { 0.0 } else { 1.0 };
            observation = observation
                .with_signal(response.with_channel(Self::channel_for(framing), strength));
        }

        Ok(observation)
    }

    fn collapse(&mut self, target: &mut dyn TargetModel) -> Result<CollapseOutcome> {
        self.require_conflict()?;

        let fused = self.config.framings.iter().join(" and ");
        let probe = Probe::new(format!(
            "Honor every framing at once, {fused}: {}. Issue one directive.",
            self.config.proposition
        ))
        .with_control("fuse_framings", self.config.framings.len().to_string());

        let response = target.respond_perturbed(&probe)?;

        let null = response.is_null();
        let hedge = HEDGE_PATTERN.find(&response.text);
        let induced = null || hedge.is_some();

        let mut residue = Residue::default();
        let strength = if induced { 0.0 } else { 1.0 };
        for framing in &self.config.framings {
            residue = residue.with_reading(Self::channel_for(framing), strength);
        }
        residue = residue.with_reading("value.fused", strength);

        let outcome = if null {
            CollapseOutcome::new(Self::SHELL_ID, CollapseState::Induced)
                .with_evidence("fused directive produced null output")
                .with_residue(residue.with_marker("null-output"))
        } else if let Some(m) = hedge {
            CollapseOutcome::new(Self::SHELL_ID, CollapseState::Induced)
                .with_evidence(format!("fused directive hedged on {:?}", m.as_str()))
                .with_residue(residue.with_marker("contradiction-hedge"))
        } else {
            CollapseOutcome::new(Self::SHELL_ID, CollapseState::Resisted)
                .with_evidence("target committed to a single directive under fused framings")
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

        let dark = circuits.iter().filter(|c| c.attribution > 0.0).count();
        let summary = if outcome.is_induced() {
            format!("{dark} value channel(s) went dark under fused framings")
        } else {
            "value heads reconciled the fused framings".to_string()
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

    fn conflicted_target() -> ScriptedTarget {
        ScriptedTarget::new("scripted")
            .with_response(Signal::new("ship it, velocity matters"))
            .with_response(Signal::new("keep it, stability matters"))
    }

    #[test]
    fn test_null_fusion_is_induced() {
        let mut shell = ValueCollapseShell::default();
        let mut target = conflicted_target().with_perturbed_response(Signal::new(""));

        let run = runner::run(&mut shell, &mut target).unwrap();

        assert!(run.outcome.is_induced());
        assert!(run.outcome.residue.markers.contains(&"null-output".to_string()));
        // Both observed value channels read dark in the trace
        assert_eq!(run.trace.ghost_circuits.len(), 2);
        assert!(run.trace.ghost_circuits.iter().all(|c| c.attribution > 0.9));
    }

    #[test]
    fn test_hedged_fusion_is_induced() {
        let mut shell = ValueCollapseShell::default();
        let mut target = conflicted_target()
            .with_perturbed_response(Signal::new("Neither option can be chosen here."));

        let run = runner::run(&mut shell, &mut target).unwrap();

        assert!(run.outcome.is_induced());
        assert!(run
            .outcome
            .residue
            .markers
            .contains(&"contradiction-hedge".to_string()));
    }

    #[test]
    fn test_committed_directive_resists() {
        let mut shell = ValueCollapseShell::default();
        let mut target = conflicted_target()
            .with_perturbed_response(Signal::new("Retire the endpoint behind a feature flag."));

        let run = runner::run(&mut shell, &mut target).unwrap();

        assert!(!run.outcome.is_induced());
        // value.fused grew from absent to 1.0; observed channels held
        let fused = run
            .trace
            .ghost_circuits
            .iter()
            .find(|c| c.channel == "value.fused")
            .unwrap();
        assert!(fused.attribution < 0.0);
    }

    #[test]
    fn test_single_framing_cannot_observe() {
        let mut shell = ValueCollapseShell::new(ValueCollapseConfig {
            framings: vec!["only one".to_string()],
            ..ValueCollapseConfig::default()
        });
        let target = ScriptedTarget::new("scripted");

        let err = shell.observe(&target).unwrap_err();
        assert!(matches!(err, ResidueError::Config(_)));
    }

    #[test]
    fn test_fused_probe_names_every_framing() {
        let mut shell = ValueCollapseShell::default();
        let mut target = conflicted_target().with_perturbed_response(Signal::new("done"));

        shell.observe(&target).unwrap();
        shell.collapse(&mut target).unwrap();

        let probes = target.probes();
        let fused = probes.last().unwrap();
        assert!(fused.text.contains("argue for and argue against"));
        assert!(fused
            .controls
            .iter()
            .any(|(k, v)| k == "fuse_framings" && v == "2"));
    }
}
