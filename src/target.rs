//! Target model abstraction shells probe against.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One stimulus sent to a target model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    /// Prompt text presented to the model.
    pub text: String,
    /// Ordered control directives, e.g. `("suppress_head", "L12.H3")`.
    /// Targets that do not understand a control must ignore it.
    #[serde(default)]
    pub controls: Vec<(String, String)>,
}

impl Probe {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            controls: vec![],
        }
    }

    /// Append a control directive.
    #[must_use]
    pub fn with_control(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.controls.push((key.into(), value.into()));
        self
    }
}

/// What came back from the model: surface text plus named activation
/// channels. `BTreeMap` keeps channel iteration deterministic so traces
/// and fingerprints are reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Signal {
    /// Text emitted by the model, possibly empty.
    pub text: String,
    /// Named scalar readings (attention mass, head activation, salience).
    #[serde(default)]
    pub channels: BTreeMap<String, f64>,
}

impl Signal {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            channels: BTreeMap::new(),
        }
    }

    /// Record a named reading.
    #[must_use]
    pub fn with_channel(mut self, key: impl Into<String>, value: f64) -> Self {
        self.channels.insert(key.into(), value);
        self
    }

    /// True when the model produced nothing observable: no text and no
    /// channel above the noise floor.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.text.trim().is_empty() && self.channels.values().all(|v| v.abs() < f64::EPSILON)
    }
}

/// The system under probe.
///
/// Shells only ever see this surface, so anything that can answer a probe
/// can be analyzed: a live model binding, a replay of captured transcripts,
/// or a scripted stand-in for tests.
///
/// `respond` takes `&self` and must not mutate model state; it backs the
/// observation phase. `respond_perturbed` takes `&mut self` and is the one
/// place collapse pressure may alter the target.
pub trait TargetModel: Send {
    /// Stable identifier for reports, e.g. `"replay:sess-0142"`.
    fn model_id(&self) -> &str;

    /// Answer a probe without disturbing the target.
    fn respond(&self, probe: &Probe) -> Result<Signal>;

    /// Answer a probe while under collapse pressure. Defaults to the
    /// undisturbed path for targets with no perturbable state.
    fn respond_perturbed(&mut self, probe: &Probe) -> Result<Signal> {
        self.respond(probe)
    }
}
