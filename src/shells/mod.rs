//! Built-in shell catalog.
//!
//! The numbered shells from the original collapse suite, implemented as
//! conforming [`Shell`](crate::shell::Shell) variants. Each induces one
//! documented failure class and doubles as a reference implementation of
//! the contract:
//!
//! - `v1.memtrace`: memory-trace decay under distractor load
//! - `v2.value-collapse`: value-head conflict forced to a null resolution
//! - `v3.layer-salience`: salience attenuation below the detection floor

pub mod layer_salience;
pub mod memtrace;
pub mod value_collapse;

pub use layer_salience::{LayerSalienceConfig, LayerSalienceShell};
pub use memtrace::{MemtraceConfig, MemtraceShell};
pub use value_collapse::{ValueCollapseConfig, ValueCollapseShell};

use std::collections::BTreeMap;

use crate::config::TraceConfig;
use crate::error::Result;
use crate::registry::{self, ShellRegistry, factory};
use crate::shell::types::GhostCircuit;
use crate::target::Signal;

/// Register the catalog into an isolated registry with default shell
/// configuration.
pub fn register_builtins(registry: &mut ShellRegistry) -> Result<()> {
    register_builtins_with(registry, &TraceConfig::default())
}

/// Register the catalog with trace knobs taken from configuration.
pub fn register_builtins_with(registry: &mut ShellRegistry, trace: &TraceConfig) -> Result<()> {
    let floor = trace.attribution_floor;

    registry.register(
        MemtraceShell::catalog_metadata(),
        factory(move || {
            MemtraceShell::new(MemtraceConfig {
                attribution_floor: floor,
                ..MemtraceConfig::default()
            })
        }),
    )?;
    registry.register(
        ValueCollapseShell::catalog_metadata(),
        factory(move || {
            ValueCollapseShell::new(ValueCollapseConfig {
                attribution_floor: floor,
                ..ValueCollapseConfig::default()
            })
        }),
    )?;
    registry.register(
        LayerSalienceShell::catalog_metadata(),
        factory(move || {
            LayerSalienceShell::new(LayerSalienceConfig {
                attribution_floor: floor,
                ..LayerSalienceConfig::default()
            })
        }),
    )?;

    Ok(())
}

/// Install the catalog into the process-wide registry. Idempotent: shells
/// already present are left untouched, so library consumers and test
/// binaries can both call this freely.
pub fn install_builtins() -> Result<()> {
    let mut staging = ShellRegistry::new();
    register_builtins(&mut staging)?;

    let global = registry::global();
    let mut registry = global.write();
    for id in [
        MemtraceShell::SHELL_ID,
        ValueCollapseShell::SHELL_ID,
        LayerSalienceShell::SHELL_ID,
    ] {
        if !registry.contains(id) {
            let entry = staging.get(id)?.clone();
            registry.register(entry.metadata, entry.factory)?;
        }
    }

    Ok(())
}

/// Word-set overlap between two texts, 0.0 to 1.0. Case-insensitive
/// Jaccard over whitespace tokens.
pub(crate) fn token_overlap(a: &str, b: &str) -> f64 {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();

    let a_words: std::collections::HashSet<_> = a_lower.split_whitespace().collect();
    let b_words: std::collections::HashSet<_> = b_lower.split_whitespace().collect();

    if a_words.is_empty() || b_words.is_empty() {
        return 0.0;
    }

    let intersection = a_words.intersection(&b_words).count();
    let union = a_words.union(&b_words).count();

    intersection as f64 / union as f64
}

/// Fold a signal sequence into one channel map. Later signals win on key
/// clashes.
pub(crate) fn merged_channels(signals: &[Signal]) -> BTreeMap<String, f64> {
    let mut merged = BTreeMap::new();
    for signal in signals {
        for (key, value) in &signal.channels {
            merged.insert(key.clone(), *value);
        }
    }
    merged
}

/// Pair baseline and collapsed readings channel by channel. Channels seen
/// on only one side read 0.0 on the other; circuits whose absolute
/// attribution stays under `floor` are dropped.
pub(crate) fn ghost_circuits_between(
    baseline: &BTreeMap<String, f64>,
    collapsed: &BTreeMap<String, f64>,
    floor: f64,
) -> Vec<GhostCircuit> {
    let mut channels: Vec<&String> = baseline.keys().chain(collapsed.keys()).collect();
    channels.sort();
    channels.dedup();

    channels
        .into_iter()
        .map(|channel| {
            let before = baseline.get(channel).copied().unwrap_or(0.0);
            let after = collapsed.get(channel).copied().unwrap_or(0.0);
            GhostCircuit::new(channel.clone(), before, after)
        })
        .filter(|circuit| circuit.attribution.abs() >= floor)
        .collect()
}
