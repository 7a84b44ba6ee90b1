//! The function catalogue: the authority on what function names exist, what
//! calling convention each follows, and what to suggest when a name doesn't
//! resolve.

pub mod builtins;

use indexmap::IndexMap;

use opteryx_error::{OpteryxError, Result};
use opteryx_types::DataType;

/// How a function's result is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionMode {
    /// Evaluated once per row.
    Scalar,
    /// Evaluated once per group, folding over every row in it.
    Aggregate,
    /// Evaluated once per query, independent of any row (`NOW()`, `PI()`).
    Constant,
    /// A pure rename of another catalogue entry.
    Alias,
}

#[derive(Debug, Clone)]
pub struct FunctionSignature {
    pub name: &'static str,
    pub mode: FunctionMode,
    pub min_args: usize,
    pub max_args: Option<usize>,
    pub return_type: DataType,
    /// Populated when `mode == Alias`: the canonical name to plan under.
    pub aliased_to: Option<&'static str>,
}

impl FunctionSignature {
    pub fn arity_ok(&self, argc: usize) -> bool {
        argc >= self.min_args && self.max_args.map(|max| argc <= max).unwrap_or(true)
    }
}

/// The function catalogue. Built once per session from the builtin table;
/// a future UDF registration mechanism would extend the same map. Kept as
/// an [`IndexMap`] so `names()` and suggestion candidate lists iterate in
/// registration order rather than hash order, which keeps error messages
/// reproducible across runs.
#[derive(Debug, Clone)]
pub struct FunctionCatalogue {
    functions: IndexMap<String, FunctionSignature>,
}

impl Default for FunctionCatalogue {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FunctionCatalogue {
    pub fn with_builtins() -> Self {
        let mut functions = IndexMap::new();
        for sig in builtins::BUILTINS {
            functions.insert(sig.name.to_string(), sig.clone());
        }
        FunctionCatalogue { functions }
    }

    /// Resolve `name` to its canonical signature, following one level of
    /// `Alias` indirection.
    pub fn resolve(&self, name: &str) -> Result<&FunctionSignature> {
        let upper = name.to_ascii_uppercase();
        let sig = self.functions.get(&upper).ok_or_else(|| {
            let candidates: Vec<String> = self.functions.keys().cloned().collect();
            OpteryxError::function_not_found(name, suggest_name(&upper, &candidates))
        })?;
        if sig.mode == FunctionMode::Alias {
            let target = sig.aliased_to.expect("alias entries always carry a target");
            return self
                .functions
                .get(target)
                .ok_or_else(|| OpteryxError::internal(format!("alias '{name}' targets unknown function '{target}'")));
        }
        Ok(sig)
    }

    pub fn is_aggregate(&self, name: &str) -> bool {
        self.resolve(name).map(|s| s.mode == FunctionMode::Aggregate).unwrap_or(false)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(|s| s.as_str())
    }
}

/// Names the planner treats as aggregates when deciding plan shape, kept in
/// lockstep with the `Aggregate`-mode entries in [`builtins::BUILTINS`].
pub const AGGREGATE_NAMES: &[&str] = &[
    "SUM", "COUNT", "AVG", "MIN", "MAX", "STDDEV", "VARIANCE", "ARRAY_AGG", "FIRST", "LAST",
    "LIST", "APPROXIMATE_MEDIAN", "COUNT_DISTINCT",
];

/// Fuzzy-match `target` against `candidates`: first a normalized-Levenshtein
/// nearest-match with a similarity floor, then (on a miss) an underscore-token
/// permutation check (catches `DATE_DIFF` vs `DIFF_DATE`).
pub fn suggest_name(target: &str, candidates: &[String]) -> Option<String> {
    let target_upper = target.to_ascii_uppercase();

    if let Some(hit) = candidates
        .iter()
        .map(|c| (c, strsim::normalized_levenshtein(&target_upper, &c.to_ascii_uppercase())))
        .filter(|(_, score)| *score >= 0.6)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(c, _)| c.clone())
    {
        return Some(hit);
    }

    let tokens: Vec<&str> = target_upper.split('_').filter(|t| !t.is_empty()).collect();
    if tokens.len() > 1 && tokens.len() <= 4 {
        for perm in token_permutations(&tokens) {
            let candidate = perm.join("_");
            if let Some(hit) = candidates.iter().find(|c| c.eq_ignore_ascii_case(&candidate)) {
                return Some(hit.clone());
            }
        }
    }

    None
}

fn token_permutations<'a>(tokens: &[&'a str]) -> Vec<Vec<&'a str>> {
    if tokens.len() <= 1 {
        return vec![tokens.to_vec()];
    }
    let mut out = Vec::new();
    for (i, head) in tokens.iter().enumerate() {
        let mut rest = tokens.to_vec();
        rest.remove(i);
        for mut tail in token_permutations(&rest) {
            let mut perm = vec![*head];
            perm.append(&mut tail);
            out.push(perm);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_aggregate() {
        let catalogue = FunctionCatalogue::with_builtins();
        assert!(catalogue.is_aggregate("sum"));
        assert!(!catalogue.is_aggregate("upper"));
    }

    #[test]
    fn unknown_function_reports_a_suggestion() {
        let catalogue = FunctionCatalogue::with_builtins();
        let err = catalogue.resolve("UPER").unwrap_err();
        assert_eq!(err.suggestion.as_deref(), Some("UPPER"));
    }

    #[test]
    fn alias_resolves_to_its_target() {
        let catalogue = FunctionCatalogue::with_builtins();
        let resolved = catalogue.resolve("CHAR_LENGTH").unwrap();
        assert_eq!(resolved.name, "LENGTH");
    }

    #[test]
    fn underscore_permutation_suggestion() {
        let candidates = vec!["DATE_DIFF".to_string()];
        assert_eq!(suggest_name("DIFF_DATE", &candidates), Some("DATE_DIFF".to_string()));
    }
}
