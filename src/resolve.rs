// 🎯 Area Resolution - Free-Text Queries to Canonical Names
// Maps whatever the caller typed onto exactly one canonical area display name

use crate::error::PipelineError;
use std::collections::HashMap;

// ============================================================================
// RESOLVER
// ============================================================================

/// Built once from the canonical display-name list held by the snapshot;
/// every per-area request goes through it.
#[derive(Debug)]
pub struct AreaResolver {
    names: Vec<String>,
    exact: HashMap<String, String>,
}

impl AreaResolver {
    pub fn new(names: Vec<String>) -> Self {
        let exact = names
            .iter()
            .map(|name| (name.to_lowercase(), name.clone()))
            .collect();
        AreaResolver { names, exact }
    }

    /// Canonical display names in their listed order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Resolve a free-text query to one canonical display name.
    ///
    /// The query is trimmed and lowercased only. It runs against canonical
    /// display names, so the heavier join-key normalization does not apply
    /// here. An exact case-insensitive match wins immediately. Otherwise
    /// every name containing the query as a substring is a candidate and
    /// the shortest candidate wins, on the assumption that a shorter
    /// containing name is the more precise match. With several equally
    /// valid containing names this tie-break can still pick a semantically
    /// wrong one; it is a heuristic, not a uniqueness guarantee.
    pub fn resolve(&self, query: &str) -> Result<String, PipelineError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(PipelineError::validation("area query is empty"));
        }

        if let Some(display) = self.exact.get(&needle) {
            return Ok(display.clone());
        }

        let mut candidates: Vec<&String> = self
            .names
            .iter()
            .filter(|name| name.to_lowercase().contains(&needle))
            .collect();
        if candidates.is_empty() {
            return Err(PipelineError::not_found(query.trim()));
        }

        candidates.sort_by_key(|name| name.len());
        Ok(candidates[0].clone())
    }
}

// ============================================================================
// TESTS
// ============================================================================
