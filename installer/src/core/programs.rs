//! Program list parsing and optional normalization.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::types::ProgramRequest;

/// Normalization applied to a program list before prompting.
///
/// Catalog lists are already curated; free-form input is taken as typed. All
/// steps are off by default so the operator's order and spelling survive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Normalization {
    /// Lowercase every name (applied before deduplication).
    pub lowercase: bool,
    /// Drop repeated names, keeping the first occurrence.
    pub dedupe: bool,
    /// Sort names lexicographically.
    pub sort: bool,
}

/// Split a comma-separated list, trimming entries and dropping empties.
pub fn parse_program_list(input: &str) -> ProgramRequest {
    input
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect()
}

pub fn normalize(programs: &ProgramRequest, rules: Normalization) -> ProgramRequest {
    let mut names: Vec<String> = programs
        .as_slice()
        .iter()
        .map(|name| {
            if rules.lowercase {
                name.to_lowercase()
            } else {
                name.clone()
            }
        })
        .collect();

    if rules.dedupe {
        let mut seen = HashSet::new();
        names.retain(|name| seen.insert(name.clone()));
    }
    if rules.sort {
        names.sort();
    }
    ProgramRequest::new(names)
}
