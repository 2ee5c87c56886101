//! Context-aware error suggestions.
//!
//! Complements the static suggestions in the `codes` module: when an error
//! carries context (see [`ResidueError::context`](super::ResidueError::context)),
//! the suggestion can name the offending shell, point at the exact knob, or
//! propose near-miss ids for a mistyped lookup.

use serde_json::Value;

use super::codes::ErrorCode;

/// Generate a suggestion for an error, using its JSON context when one is
/// available and falling back to the static [`ErrorCode::suggestion`].
pub fn suggest_for_error(code: ErrorCode, context: Option<&Value>) -> String {
    match code {
        ErrorCode::ShellNotFound => suggest_shell_not_found(context),
        ErrorCode::DuplicateRegistration => suggest_duplicate_registration(context),
        ErrorCode::MetadataInvalid => suggest_metadata_invalid(context),
        ErrorCode::VersionInvalid => suggest_version_invalid(context),
        ErrorCode::ConfigNotFound => suggest_config_not_found(context),
        ErrorCode::ObservationFailed => suggest_observation_failed(context),
        ErrorCode::InfrastructureFailure => suggest_infrastructure_failure(context),
        _ => code.suggestion().to_string(),
    }
}

fn context_str<'a>(context: Option<&'a Value>, key: &str) -> Option<&'a str> {
    context.and_then(|c| c.get(key)).and_then(Value::as_str)
}

fn suggest_shell_not_found(context: Option<&Value>) -> String {
    let Some(shell_id) = context_str(context, "shell_id") else {
        return ErrorCode::ShellNotFound.suggestion().to_string();
    };

    // Callers that can enumerate their registry may pass an "installed"
    // array to get near-miss candidates in the suggestion itself.
    let near: Vec<String> = context
        .and_then(|c| c.get("installed"))
        .and_then(Value::as_array)
        .map(|ids| {
            let available: Vec<&str> = ids.iter().filter_map(Value::as_str).collect();
            suggest_similar_shells(shell_id, &available, 3)
        })
        .unwrap_or_default();

    if near.is_empty() {
        format!(
            "Shell '{shell_id}' is not registered. Check `registry.list()` for \
             installed ids, or call `install_builtins()` for the catalog shells"
        )
    } else {
        format!(
            "Shell '{shell_id}' is not registered. Closest registered ids: {}",
            near.join(", ")
        )
    }
}

fn suggest_duplicate_registration(context: Option<&Value>) -> String {
    match context_str(context, "shell_id") {
        Some(shell_id) => format!(
            "Shell id '{shell_id}' is already taken and the first registration \
             wins. Pick a distinct id; a version bump belongs in `version`, not \
             a re-register"
        ),
        None => ErrorCode::DuplicateRegistration.suggestion().to_string(),
    }
}

fn suggest_metadata_invalid(context: Option<&Value>) -> String {
    let shell_id = context_str(context, "shell_id");
    let reason = context_str(context, "reason");

    match (shell_id, reason) {
        (Some(id), Some(reason)) => format!(
            "Metadata for '{id}' was rejected: {reason}. Fix the field and \
             re-register; nothing was inserted"
        ),
        (Some(id), None) => format!(
            "Metadata for '{id}' was rejected. Run `metadata.validate()` before \
             registering to see the failing field"
        ),
        _ => ErrorCode::MetadataInvalid.suggestion().to_string(),
    }
}

fn suggest_version_invalid(context: Option<&Value>) -> String {
    match context_str(context, "shell_id") {
        Some(id) => format!(
            "Version for '{id}' does not parse as semver. Use MAJOR.MINOR.PATCH \
             (e.g. '1.0.0'), or disable `[registry] enforce_semver` if loose \
             versions are intended"
        ),
        None => ErrorCode::VersionInvalid.suggestion().to_string(),
    }
}

fn suggest_config_not_found(context: Option<&Value>) -> String {
    match context_str(context, "path") {
        Some(path) => format!(
            "No config file at {path}. Create it, or point RESIDUE_CONFIG at an \
             existing one; built-in defaults apply when no file is configured"
        ),
        None => ErrorCode::ConfigNotFound.suggestion().to_string(),
    }
}

fn suggest_observation_failed(context: Option<&Value>) -> String {
    let shell_id = context_str(context, "shell_id");
    let reason = context_str(context, "reason");

    match (shell_id, reason) {
        (Some(id), Some(reason)) => format!(
            "Shell '{id}' could not capture a baseline: {reason}. Verify the \
             target answers the shell's probes before perturbing anything"
        ),
        (Some(id), None) => format!(
            "Shell '{id}' could not capture a baseline. Verify the target \
             answers the shell's probes before perturbing anything"
        ),
        _ => ErrorCode::ObservationFailed.suggestion().to_string(),
    }
}

fn suggest_infrastructure_failure(context: Option<&Value>) -> String {
    let shell_id = context_str(context, "shell_id");
    let reason = context_str(context, "reason");

    match (shell_id, reason) {
        (Some(id), Some(reason)) => format!(
            "Shell '{id}' could not run its collapse phase: {reason}. This is a \
             harness problem, not a resisted collapse; check target availability \
             and the observe/collapse call order"
        ),
        _ => ErrorCode::InfrastructureFailure.suggestion().to_string(),
    }
}

/// Rank registered shell ids by similarity to a (likely mistyped) query.
///
/// Used to decorate `ShellNotFound` diagnostics with near-miss candidates.
pub fn suggest_similar_shells(query: &str, available: &[&str], max_suggestions: usize) -> Vec<String> {
    let query_lower = query.to_lowercase();
    let mut scored: Vec<_> = available
        .iter()
        .map(|s| (s, similarity_score(&query_lower, &s.to_lowercase())))
        .filter(|(_, score)| *score > 0.3)
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(s, _)| (*s).to_string())
        .collect()
}

/// Jaccard overlap on character trigrams, with a prefix/substring fallback
/// for strings too short to produce trigrams.
fn similarity_score(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a_trigrams: std::collections::HashSet<_> = trigrams(a).collect();
    let b_trigrams: std::collections::HashSet<_> = trigrams(b).collect();

    if a_trigrams.is_empty() || b_trigrams.is_empty() {
        if a.starts_with(b) || b.starts_with(a) {
            return 0.8;
        }
        if a.contains(b) || b.contains(a) {
            return 0.5;
        }
        return 0.0;
    }

    let intersection = a_trigrams.intersection(&b_trigrams).count();
    let union = a_trigrams.union(&b_trigrams).count();

    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

fn trigrams(s: &str) -> impl Iterator<Item = &str> {
    (0..s.len().saturating_sub(2)).filter_map(move |i| s.get(i..i + 3))
}
