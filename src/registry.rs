use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ResidueError, Result, suggest_similar_shells};
use crate::metadata::ShellMetadata;
use crate::shell::Shell;

/// Builds a fresh shell instance per invocation. Factories are shared
/// across threads, so they capture configuration, not state.
pub type ShellFactory = Arc<dyn Fn() -> Box<dyn Shell> + Send + Sync>;

/// Wrap a closure returning a concrete shell into a [`ShellFactory`].
pub fn factory<S, F>(make: F) -> ShellFactory
where
    S: Shell + 'static,
    F: Fn() -> S + Send + Sync + 'static,
{
    Arc::new(move || Box::new(make()))
}

/// One registered shell: its metadata snapshot and the factory that
/// produces instances of it.
#[derive(Clone)]
pub struct ShellEntry {
    pub metadata: ShellMetadata,
    pub factory: ShellFactory,
}

impl ShellEntry {
    /// Build a fresh instance of the registered shell.
    #[must_use]
    pub fn instantiate(&self) -> Box<dyn Shell> {
        (self.factory)()
    }
}

impl fmt::Debug for ShellEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellEntry")
            .field("metadata", &self.metadata)
            .field("factory", &"<factory>")
            .finish()
    }
}

/// Registration strictness knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryPolicy {
    /// Require versions to parse as full semver. Off by default; the base
    /// contract only asks for a non-empty version string.
    pub enforce_semver: bool,
}

/// Aggregate view of a registry's contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub shells: usize,
    pub distinct_tags: usize,
    pub distinct_domains: usize,
}

/// Mapping from shell id to registered entry, preserving registration
/// order for iteration.
///
/// Registration is all-or-nothing: metadata is validated first, and on any
/// rejection (including a duplicate id) the registry is left exactly as it
/// was, first registration intact.
#[derive(Debug, Default)]
pub struct ShellRegistry {
    entries: HashMap<String, ShellEntry>,
    order: Vec<String>,
    policy: RegistryPolicy,
}

impl ShellRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_policy(policy: RegistryPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Register a shell under `metadata.shell_id`.
    ///
    /// Rejects malformed metadata (`InvalidMetadata` / `InvalidVersion`)
    /// and ids already taken (`DuplicateRegistration`).
    pub fn register(&mut self, metadata: ShellMetadata, factory: ShellFactory) -> Result<()> {
        metadata.validate()?;
        if self.policy.enforce_semver {
            metadata.semver_version()?;
        }

        let shell_id = metadata.shell_id.clone();
        if self.entries.contains_key(&shell_id) {
            return Err(ResidueError::DuplicateRegistration(shell_id));
        }

        debug!(shell_id = %shell_id, version = %metadata.version, "registered shell");
        self.entries
            .insert(shell_id.clone(), ShellEntry { metadata, factory });
        self.order.push(shell_id);
        Ok(())
    }

    /// Look up the registered entry for a shell id.
    pub fn get(&self, shell_id: &str) -> Result<&ShellEntry> {
        self.entries
            .get(shell_id)
            .ok_or_else(|| ResidueError::ShellNotFound(shell_id.to_string()))
    }

    /// Build a fresh instance of a registered shell.
    pub fn instantiate(&self, shell_id: &str) -> Result<Box<dyn Shell>> {
        Ok(self.get(shell_id)?.instantiate())
    }

    #[must_use]
    pub fn contains(&self, shell_id: &str) -> bool {
        self.entries.contains_key(shell_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate registered metadata in registration order. Each call starts
    /// a fresh iteration; listing never consumes anything.
    pub fn list(&self) -> impl Iterator<Item = &ShellMetadata> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|entry| &entry.metadata)
    }

    /// Registered metadata carrying the given tag, in registration order.
    #[must_use]
    pub fn tagged(&self, tag: &str) -> Vec<&ShellMetadata> {
        self.list()
            .filter(|m| m.tags.iter().any(|t| t == tag))
            .collect()
    }

    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let mut tags = HashSet::new();
        let mut domains = HashSet::new();
        for metadata in self.list() {
            tags.extend(metadata.tags.iter().map(String::as_str));
            domains.insert(metadata.attribution_domain.as_str());
        }
        RegistryStats {
            shells: self.len(),
            distinct_tags: tags.len(),
            distinct_domains: domains.len(),
        }
    }
}

// =============================================================================
// Process-Wide Registry
// =============================================================================

static GLOBAL_REGISTRY: Lazy<RwLock<ShellRegistry>> =
    Lazy::new(|| RwLock::new(ShellRegistry::new()));

/// The process-wide registry. Prefer the typed helpers below; take the
/// lock directly only for multi-step operations that must see a consistent
/// snapshot.
#[must_use]
pub fn global() -> &'static RwLock<ShellRegistry> {
    &GLOBAL_REGISTRY
}

/// Register a shell in the process-wide registry. All global registration
/// goes through here, so duplicate detection has one choke point.
pub fn register_shell(metadata: ShellMetadata, factory: ShellFactory) -> Result<()> {
    GLOBAL_REGISTRY.write().register(metadata, factory)
}

/// Look up a shell in the process-wide registry, returning an owned copy
/// of its entry. A miss logs near-miss ids so a mistyped lookup is
/// diagnosable from the trace alone.
pub fn lookup(shell_id: &str) -> Result<ShellEntry> {
    let registry = GLOBAL_REGISTRY.read();
    match registry.get(shell_id) {
        Ok(entry) => Ok(entry.clone()),
        Err(err) => {
            let installed: Vec<&str> = registry.list().map(|m| m.shell_id.as_str()).collect();
            let near = suggest_similar_shells(shell_id, &installed, 3);
            if !near.is_empty() {
                debug!(shell_id = %shell_id, near = ?near, "lookup missed, near matches exist");
            }
            Err(err)
        }
    }
}

/// Snapshot of all globally registered metadata, in registration order.
#[must_use]
pub fn installed() -> Vec<ShellMetadata> {
    GLOBAL_REGISTRY.read().list().cloned().collect()
}
