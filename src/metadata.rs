//! Shell metadata schema.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ResidueError, Result};

/// Keys of the metadata export, in export order. Key names and order are a
/// compatibility surface consumed by registry and reporting tooling.
pub const EXPORT_KEYS: [&str; 10] = [
    "shell_id",
    "version",
    "name",
    "description",
    "failure_signature",
    "attribution_domain",
    "qk_ov_classification",
    "related_shells",
    "authors",
    "tags",
];

/// Shell ids are lowercase dotted identifiers, e.g. `v1.memtrace` or
/// `collapse.001`.
static SHELL_ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9._-]*$").unwrap());

/// Identifying metadata carried by every shell.
///
/// Immutable by convention: an "update" builds a new record. `shell_id` is
/// the stable key into the registry; `shell_id` plus `version` identify an
/// exact metadata snapshot (see [`ShellMetadata::fingerprint`]).
///
/// The classification fields (`failure_signature`, `attribution_domain`,
/// `qk_ov_classification`) stay open strings so new failure modes need no
/// schema change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellMetadata {
    /// Unique shell identifier
    pub shell_id: String,
    /// Semantic version string
    pub version: String,
    /// Human-readable name
    pub name: String,
    /// Short description
    pub description: String,
    /// Collapse pattern this shell targets
    pub failure_signature: String,
    /// Class of attribution the shell analyzes (e.g., token-level, head-level)
    pub attribution_domain: String,
    /// Position within the attention-circuit taxonomy
    pub qk_ov_classification: String,
    /// Ids of conceptually linked shells (non-owning; cycles permitted)
    #[serde(default)]
    pub related_shells: Vec<String>,
    /// Authors
    #[serde(default)]
    pub authors: Vec<String>,
    /// Tags for categorization
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A single exported metadata value: scalar text or an ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    Text(String),
    List(Vec<String>),
}

impl ShellMetadata {
    /// Create metadata from the required fields. Optional sequences start
    /// empty; construction itself never fails.
    pub fn new(
        shell_id: impl Into<String>,
        version: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        failure_signature: impl Into<String>,
        attribution_domain: impl Into<String>,
        qk_ov_classification: impl Into<String>,
    ) -> Self {
        Self {
            shell_id: shell_id.into(),
            version: version.into(),
            name: name.into(),
            description: description.into(),
            failure_signature: failure_signature.into(),
            attribution_domain: attribution_domain.into(),
            qk_ov_classification: qk_ov_classification.into(),
            related_shells: vec![],
            authors: vec![],
            tags: vec![],
        }
    }

    /// Set the related shell ids.
    #[must_use]
    pub fn with_related_shells<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.related_shells = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Set the authors.
    #[must_use]
    pub fn with_authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    /// Set the tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Export all fields as an ordered key-value mapping.
    ///
    /// Exactly the ten [`EXPORT_KEYS`] in declaration order, every call.
    /// This is the stable surface reporting and registry tooling consume.
    #[must_use]
    pub fn as_dict(&self) -> Vec<(&'static str, MetaValue)> {
        vec![
            ("shell_id", MetaValue::Text(self.shell_id.clone())),
            ("version", MetaValue::Text(self.version.clone())),
            ("name", MetaValue::Text(self.name.clone())),
            ("description", MetaValue::Text(self.description.clone())),
            (
                "failure_signature",
                MetaValue::Text(self.failure_signature.clone()),
            ),
            (
                "attribution_domain",
                MetaValue::Text(self.attribution_domain.clone()),
            ),
            (
                "qk_ov_classification",
                MetaValue::Text(self.qk_ov_classification.clone()),
            ),
            (
                "related_shells",
                MetaValue::List(self.related_shells.clone()),
            ),
            ("authors", MetaValue::List(self.authors.clone())),
            ("tags", MetaValue::List(self.tags.clone())),
        ]
    }

    /// Registration-grade validation: non-empty dotted lowercase id and a
    /// non-empty name/version. Field formats beyond this are left to
    /// stricter consumers (see [`ShellMetadata::semver_version`]).
    pub fn validate(&self) -> Result<()> {
        if self.shell_id.is_empty() {
            return Err(self.invalid("shell_id is empty"));
        }
        if !SHELL_ID_PATTERN.is_match(&self.shell_id) {
            return Err(self.invalid("shell_id must match [a-z][a-z0-9._-]*"));
        }
        if self.name.is_empty() {
            return Err(self.invalid("name is empty"));
        }
        if self.version.is_empty() {
            return Err(self.invalid("version is empty"));
        }
        Ok(())
    }

    /// Strictly parse `version` as a semantic version. Opt-in consumer rule;
    /// the base contract only requires a non-empty version string.
    pub fn semver_version(&self) -> Result<semver::Version> {
        semver::Version::parse(&self.version).map_err(|e| ResidueError::InvalidVersion {
            shell_id: self.shell_id.clone(),
            reason: e.to_string(),
        })
    }

    /// Content hash of the export, hex-encoded. Two metadata records have
    /// equal fingerprints iff their exports are identical, which makes the
    /// "shell_id + version identify a snapshot" convention checkable.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, value) in self.as_dict() {
            // 0x1f/0x1e/0x1d: unit separators between key, items, and fields
            hasher.update(key.as_bytes());
            hasher.update([0x1f]);
            match value {
                MetaValue::Text(text) => hasher.update(text.as_bytes()),
                MetaValue::List(items) => {
                    for item in &items {
                        hasher.update(item.as_bytes());
                        hasher.update([0x1e]);
                    }
                }
            }
            hasher.update([0x1d]);
        }
        hex::encode(hasher.finalize())
    }

    fn invalid(&self, reason: &str) -> ResidueError {
        ResidueError::InvalidMetadata {
            shell_id: self.shell_id.clone(),
            reason: reason.to_string(),
        }
    }
}
