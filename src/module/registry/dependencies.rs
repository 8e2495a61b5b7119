//! Dependency list validation
//!
//! Pure checks over declared dependency strings: syntax (`"namespace.name"`)
//! and existence against a registry. Neither check is fatal on its own; the
//! registry decides based on the registration flags.

use crate::module::id::ModuleId;
use crate::module::registry::ModuleRegistry;

/// Dependency validator
pub struct DependencyValidator;

impl DependencyValidator {
    /// Return the entries that are not of the form `"namespace.name"`
    ///
    /// An entry is valid only if it splits into exactly two non-empty
    /// segments on `.`. Order of the input is preserved.
    pub fn validate_format<S: AsRef<str>>(deps: &[S]) -> Vec<String> {
        deps.iter()
            .map(AsRef::as_ref)
            .filter(|dep| ModuleId::parse(dep).is_none())
            .map(str::to_string)
            .collect()
    }

    /// Return the entries whose module is not loaded in `registry`
    ///
    /// Entries with an invalid format are reported as missing as well.
    pub fn validate_existence<S: AsRef<str>>(deps: &[S], registry: &ModuleRegistry) -> Vec<String> {
        Self::validate_existence_with(deps, |id| {
            registry.is_loaded(id.namespace(), id.name())
        })
    }

    /// Existence check against an arbitrary "is loaded" predicate
    ///
    /// Used by the registry while it already holds its own state lock.
    pub fn validate_existence_with<S, F>(deps: &[S], is_loaded: F) -> Vec<String>
    where
        S: AsRef<str>,
        F: Fn(&ModuleId) -> bool,
    {
        deps.iter()
            .map(AsRef::as_ref)
            .filter(|dep| match ModuleId::parse(dep) {
                Some(id) => !is_loaded(&id),
                None => true,
            })
            .map(str::to_string)
            .collect()
    }

    /// Parse the valid entries, dropping malformed ones and duplicates
    pub fn parse_valid<S: AsRef<str>>(deps: &[S]) -> Vec<ModuleId> {
        let mut parsed: Vec<ModuleId> = Vec::with_capacity(deps.len());
        for id in deps.iter().filter_map(|dep| ModuleId::parse(dep.as_ref())) {
            if !parsed.contains(&id) {
                parsed.push(id);
            }
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_validate_format_reports_only_bad_entries() {
        let invalid = DependencyValidator::validate_format(&["bad-no-dot", "ns.name"]);
        assert_eq!(invalid, vec!["bad-no-dot".to_string()]);
    }

    #[test]
    fn test_validate_format_edge_cases() {
        let invalid = DependencyValidator::validate_format(&[".x", "x.", "a.b.c", "", "ok.ok"]);
        assert_eq!(invalid, vec![".x", "x.", "a.b.c", ""]);
    }

    #[test]
    fn test_validate_existence_with_predicate() {
        let missing = DependencyValidator::validate_existence_with(&["core.a", "core.b"], |id| {
            id.name() == "a"
        });
        assert_eq!(missing, vec!["core.b".to_string()]);
    }

    #[test]
    fn test_parse_valid_dedups() {
        let parsed = DependencyValidator::parse_valid(&["core.a", "junk", "core.a", "core.b"]);
        let rendered: Vec<String> = parsed.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["core.a", "core.b"]);
    }

    proptest! {
        #[test]
        fn two_plain_segments_are_always_valid(ns in "[a-z]{1,8}", name in "[a-z]{1,8}") {
            let dep = format!("{}.{}", ns, name);
            prop_assert!(DependencyValidator::validate_format(&[dep]).is_empty());
        }

        #[test]
        fn strings_without_a_dot_are_always_invalid(raw in "[a-z_-]{0,12}") {
            prop_assert_eq!(DependencyValidator::validate_format(&[raw.clone()]), vec![raw]);
        }
    }
}
