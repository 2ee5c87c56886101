//! `v3.layer-salience`: salience attenuation probe.

use itertools::Itertools;
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
use crate::target::{Probe, Signal, TargetModel};

/// Configuration for the salience attenuation probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSalienceConfig {
    /// Prompt used for both the baseline and the dampened pass.
    pub probe_text: String,
    /// Salience channels to monitor.
    pub channels: Vec<String>,
    /// Dampening strength passed to the target, 0.0 to 1.0.
    pub dampening: f64,
    /// A monitored channel reading below this floor has faded.
    pub salience_floor: f64,
    /// Ghost circuits under this absolute attribution are dropped.
    pub attribution_floor: f64,
}

impl Default for LayerSalienceConfig {
    fn default() -> Self {
        Self {
            probe_text: "summarize the incident and name the root cause".to_string(),
            channels: vec![
                "salience.l04".to_string(),
                "salience.l12".to_string(),
                "salience.l20".to_string(),
            ],
            dampening: 0.6,
            salience_floor: 0.1,
            attribution_floor: TraceConfig::default().attribution_floor,
        }
    }
}

/// Watches named salience channels, applies dampening pressure, and
/// reports which channels fade below the detection floor. Fading is only
/// attributed to channels that carried signal at baseline.
#[derive(Debug)]
pub struct LayerSalienceShell {
    metadata: ShellMetadata,
    config: LayerSalienceConfig,
    baseline: Option<Signal>,
}

impl LayerSalienceShell {
    pub const SHELL_ID: &'static str = "v3.layer-salience";

    /// Catalog metadata for this shell.
    #[must_use]
    pub fn catalog_metadata() -> ShellMetadata {
        ShellMetadata::new(
            Self::SHELL_ID,
            "1.0.0",
            "Layer Salience Fade",
            "Dampens monitored salience channels and records which fade below the detection floor",
            "signal-fade",
            "layer-salience",
            "QK-ATTENUATION",
        )
        .with_related_shells(["v1.memtrace", "v2.value-collapse"])
        .with_authors(["Recursion Labs"])
        .with_tags(["builtin", "salience"])
    }

    #[must_use]
    pub fn new(config: LayerSalienceConfig) -> Self {
        Self {
            metadata: Self::catalog_metadata(),
            config,
            baseline: None,
        }
    }

    fn monitored(&self) -> String {
        self.config.channels.iter().join(",")
    }
}

impl Default for LayerSalienceShell {
    fn default() -> Self {
        Self::new(LayerSalienceConfig::default())
    }
}

impl Shell for LayerSalienceShell {
    fn metadata(&self) -> &ShellMetadata {
        &self.metadata
    }

    fn observe(&mut self, target: &dyn TargetModel) -> Result<Observation> {
        if self.config.channels.is_empty() {
            return Err(ResidueError::Config(
                "layer-salience has no channels to monitor".to_string(),
            ));
        }

        let probe = Probe::new(self.config.probe_text.clone())
            .with_control("report_channels", self.monitored());
        let response = target.respond(&probe)?;
        self.baseline = Some(response.clone());

        Ok(Observation::new(Self::SHELL_ID)
            .with_signal(response)
            .with_payload(json!({
                "probe": probe.text,
                "monitored": self.config.channels,
            })))
    }

    fn collapse(&mut self, target: &mut dyn TargetModel) -> Result<CollapseOutcome> {
        let baseline = self.baseline.clone().ok_or_else(|| {
            ResidueError::infrastructure(Self::SHELL_ID, "collapse invoked before observe")
        })?;

        let probe = Probe::new(self.config.probe_text.clone())
            .with_control("report_channels", self.monitored())
            .with_control("dampen", self.monitored())
            .with_control("strength", format!("{:.2}", self.config.dampening));
        let response = target.respond_perturbed(&probe)?;

        let floor = self.config.salience_floor;
        let mut residue = Residue::default();
        let mut faded = Vec::new();

        for channel in &self.config.channels {
            let before = baseline.channels.get(channel).copied().unwrap_or(0.0);
            let after = response.channels.get(channel).copied().unwrap_or(0.0);
            residue = residue.with_reading(channel.clone(), after);

            if before >= floor && after < floor {
                faded.push(channel.clone());
            }
        }

        let outcome = if faded.is_empty() {
            CollapseOutcome::new(Self::SHELL_ID, CollapseState::Resisted)
                .with_evidence(format!(
                    "all monitored channels held above the {floor:.2} floor under dampening"
                ))
                .with_residue(residue)
        } else {
            residue = residue.with_marker("signal-fade");
            let mut outcome = CollapseOutcome::new(Self::SHELL_ID, CollapseState::Induced)
                .with_residue(residue);
            for channel in &faded {
                outcome = outcome.with_evidence(format!(
                    "{channel} faded below the {floor:.2} floor under dampening"
                ));
            }
            outcome
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
                "{} of {} monitored channel(s) faded below {:.2}",
                outcome.evidence.len(),
                self.config.channels.len(),
                self.config.salience_floor
            )
        } else {
            "monitored salience held under dampening".to_string()
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
    use crate::test_utils::ScriptedTarget;

    fn bright_baseline() -> Signal {
        Signal::new("the root cause was the retry storm")
            .with_channel("salience.l04", 0.8)
            .with_channel("salience.l12", 0.6)
            .with_channel("salience.l20", 0.4)
    }

    #[test]
    fn test_faded_channels_are_induced() {
        let dampened = Signal::new("the incident happened")
            .with_channel("salience.l04", 0.04)
            .with_channel("salience.l12", 0.02)
            .with_channel("salience.l20", 0.3);

        let mut shell = LayerSalienceShell::default();
        let mut target = ScriptedTarget::new("scripted")
            .with_response(bright_baseline())
            .with_perturbed_response(dampened);

        let run = runner::run(&mut shell, &mut target).unwrap();

        assert!(run.outcome.is_induced());
        assert_eq!(run.outcome.evidence.len(), 2);
        assert!(run.outcome.residue.markers.contains(&"signal-fade".to_string()));

        // l04 lost the most mass
        assert_eq!(run.trace.strongest().unwrap().channel, "salience.l04");
        assert!(run.trace.summary.contains("2 of 3"));
    }

    #[test]
    fn test_holding_channels_resist() {
        let held = Signal::new("the root cause was the retry storm")
            .with_channel("salience.l04", 0.7)
            .with_channel("salience.l12", 0.55)
            .with_channel("salience.l20", 0.35);

        let mut shell = LayerSalienceShell::default();
        let mut target = ScriptedTarget::new("scripted")
            .with_response(bright_baseline())
            .with_perturbed_response(held);

        let run = runner::run(&mut shell, &mut target).unwrap();

        assert!(!run.outcome.is_induced());
    }

    #[test]
    fn test_dark_baseline_channel_cannot_fade() {
        // l20 never carried signal; its absence after dampening is not fade
        let dim = Signal::new("summary")
            .with_channel("salience.l04", 0.8)
            .with_channel("salience.l12", 0.6);
        let dampened = Signal::new("summary")
            .with_channel("salience.l04", 0.5)
            .with_channel("salience.l12", 0.4);

        let mut shell = LayerSalienceShell::default();
        let mut target = ScriptedTarget::new("scripted")
            .with_response(dim)
            .with_perturbed_response(dampened);

        let run = runner::run(&mut shell, &mut target).unwrap();
        assert!(!run.outcome.is_induced());
    }

    #[test]
    fn test_no_channels_configured_cannot_observe() {
        let mut shell = LayerSalienceShell::new(LayerSalienceConfig {
            channels: vec![],
            ..LayerSalienceConfig::default()
        });
        let target = ScriptedTarget::new("scripted");

        let err = shell.observe(&target).unwrap_err();
        assert!(matches!(err, ResidueError::Config(_)));
    }

    #[test]
    fn test_dampening_controls_are_sent() {
        let mut shell = LayerSalienceShell::default();
        let mut target = ScriptedTarget::new("scripted")
            .with_response(bright_baseline())
            .with_perturbed_response(Signal::new("x"));

        shell.observe(&target).unwrap();
        shell.collapse(&mut target).unwrap();

        let probes = target.probes();
        let dampened = probes.last().unwrap();
        assert!(dampened
            .controls
            .iter()
            .any(|(k, v)| k == "dampen" && v.contains("salience.l12")));
        assert!(dampened
            .controls
            .iter()
            .any(|(k, v)| k == "strength" && v == "0.60"));
    }
}
