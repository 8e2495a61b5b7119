//! Locator resolution
//!
//! Rewrites a caller-supplied locator into the string handed to the
//! `CodeUnitSource`: alias substitution, base URL prefixing, then the default
//! extension. Resolution is idempotent, so already-resolved locators stored in
//! the fetch plan can be passed through it again.

use std::collections::HashMap;

use crate::config::LoaderConfig;
use crate::module::id::ModuleId;

/// Resolve `locator` against the loader configuration
pub fn resolve_locator(config: &LoaderConfig, locator: &str) -> String {
    let aliased = apply_alias(&config.aliases, locator);
    let prefixed = apply_base_url(&config.base_url, &aliased);
    apply_extension(config.default_extension.as_deref(), prefixed)
}

/// Rewrite the longest alias that matches a whole leading path segment
fn apply_alias(aliases: &HashMap<String, String>, locator: &str) -> String {
    let matched = aliases
        .iter()
        .filter(|(alias, _)| {
            locator == alias.as_str()
                || locator
                    .strip_prefix(alias.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
        .max_by_key(|(alias, _)| alias.len());

    match matched {
        Some((alias, path)) => format!("{}{}", path.trim_end_matches('/'), &locator[alias.len()..]),
        None => locator.to_string(),
    }
}

fn is_absolute(locator: &str) -> bool {
    locator.starts_with('/') || locator.contains("://")
}

fn apply_base_url(base_url: &str, locator: &str) -> String {
    if base_url.is_empty() || is_absolute(locator) {
        return locator.to_string();
    }
    let base = base_url.trim_end_matches('/');
    if locator == base || locator.starts_with(&format!("{}/", base)) {
        return locator.to_string();
    }
    let relative = locator.strip_prefix("./").unwrap_or(locator);
    format!("{}/{}", base, relative.trim_start_matches('/'))
}

fn apply_extension(extension: Option<&str>, locator: String) -> String {
    let Some(ext) = extension else {
        return locator;
    };
    let last = locator.rsplit('/').next().unwrap_or(locator.as_str());
    if last.is_empty() || last.contains('.') {
        return locator;
    }
    format!("{}.{}", locator, ext.trim_start_matches('.'))
}

/// Derive a module id from the last two path segments of a resolved locator
///
/// `"/static/modules/ui/qr.js"` with base `"/static/modules"` gives `ui.qr`.
/// Returns `None` when fewer than two segments remain.
pub fn derive_module_id(locator: &str, base_url: &str) -> Option<ModuleId> {
    let base = base_url.trim_end_matches('/');
    let path = if base.is_empty() {
        locator
    } else {
        locator.strip_prefix(base).unwrap_or(locator)
    };
    let path = path.split(['?', '#']).next().unwrap_or(path);

    let mut segments = path.split('/').filter(|s| !s.is_empty() && *s != ".");
    let last = segments.next_back()?;
    let namespace = segments.next_back()?;
    let name = match last.rfind('.') {
        Some(dot) if dot > 0 => &last[..dot],
        _ => last,
    };
    if name.contains('.') {
        return None;
    }
    ModuleId::new(namespace, name).ok()
}
