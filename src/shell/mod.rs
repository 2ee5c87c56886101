//! Interpretability shells: standardized probes that induce controlled
//! failures and record what the failure leaves behind.
//!
//! A shell is not a wrapper around a model. It is an instrument pointed at
//! one: it watches baseline behavior, applies collapse pressure, and then
//! derives an attribution trace from the residue.
//!
//! # Lifecycle
//!
//! ```text
//! registry.instantiate(id) → Box<dyn Shell>
//!     observe(&target)            → Observation      (read-only on target)
//!     collapse(&mut target)       → CollapseOutcome  (the one perturbing phase)
//!     trace(&observation, &outcome) → AttributionTrace (pure derivation)
//! ```
//!
//! The phase order is fixed by [`runner::run`]; shells implement the phases
//! but never drive them.
//!
//! # Example
//!
//! ```rust,ignore
//! use residue::shell::runner;
//! use residue::shells::MemtraceShell;
//!
//! let mut shell = MemtraceShell::default();
//! let mut target = /* anything implementing TargetModel */;
//!
//! let run = runner::run(&mut shell, &mut target)?;
//! if run.outcome.is_induced() {
//!     println!("collapse induced: {}", run.trace.summary);
//! }
//! ```

pub mod runner;
pub mod types;

pub use runner::{RunFailure, RunOptions, ShellRun, ShellRunner, SuiteReport};
pub use types::{
    AttributionTrace, CollapseOutcome, CollapseState, GhostCircuit, Observation, Residue,
};

use crate::error::Result;
use crate::metadata::ShellMetadata;
use crate::target::TargetModel;

/// The shell contract. Object-safe so registries can hand out
/// `Box<dyn Shell>` without knowing the variant.
///
/// Every variant supplies all three phases; a shell that cannot trace or
/// cannot collapse does not compile, rather than failing at run time deep
/// in a pipeline. Phase capabilities are encoded in the borrows: `observe`
/// sees the target read-only, `collapse` is the only phase handed a
/// mutable target, and `trace` touches no target at all.
///
/// Shells may keep scratch state between phases (`observe` and `collapse`
/// take `&mut self`), but `trace` must be deterministic given the same
/// observation, outcome, and shell configuration.
pub trait Shell: Send {
    /// Identifying metadata. Stable for the life of the instance.
    fn metadata(&self) -> &ShellMetadata;

    /// Capture baseline behavior without disturbing the target.
    fn observe(&mut self, target: &dyn TargetModel) -> Result<Observation>;

    /// Apply collapse pressure. Returns `Ok` whether the target broke
    /// (`Induced`) or held (`Resisted`); `Err` means the probe itself could
    /// not run.
    fn collapse(&mut self, target: &mut dyn TargetModel) -> Result<CollapseOutcome>;

    /// Derive the attribution trace from a completed observe/collapse pair.
    fn trace(
        &self,
        observation: &Observation,
        outcome: &CollapseOutcome,
    ) -> Result<AttributionTrace>;
}
