//! URL slug and materialized path helpers for categories.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::ServiceError;

/// Separator between slugs in a materialized path.
pub const PATH_SEPARATOR: char = '/';

/// Used when a name contains nothing sluggable ("!!!").
pub const FALLBACK_SLUG: &str = "category";

static APOSTROPHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"['’`]").expect("valid regex"));
static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{Alphabetic}\p{Nd}]+").expect("valid regex"));

/// Lowercases `name`, drops apostrophes, collapses every other run of
/// non-alphanumerics into a single hyphen and trims leading/trailing hyphens.
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let stripped = APOSTROPHES.replace_all(&lowered, "");
    let hyphenated = NON_ALPHANUMERIC.replace_all(&stripped, "-");
    hyphenated.trim_matches('-').to_string()
}

/// Like [`slugify`] but never returns an empty slug.
pub fn slugify_or_fallback(name: &str) -> String {
    let slug = slugify(name);
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Returns `candidate` if free, otherwise the first free `candidate-2`,
/// `candidate-3`, ... The lookup is global, not per parent.
///
/// Fails with `Conflict` when `max_attempts` suffixes are all taken.
pub fn unique_slug<F>(candidate: &str, is_taken: F, max_attempts: u32) -> Result<String, ServiceError>
where
    F: Fn(&str) -> bool,
{
    if !is_taken(candidate) {
        return Ok(candidate.to_string());
    }

    for suffix in 2..=max_attempts.saturating_add(1) {
        let attempt = format!("{}-{}", candidate, suffix);
        if !is_taken(&attempt) {
            return Ok(attempt);
        }
    }

    Err(ServiceError::Conflict(format!(
        "could not find a free slug for '{}' after {} attempts",
        candidate, max_attempts
    )))
}

/// `parent_path/slug`, or just `slug` for a root.
pub fn build_path(parent_path: Option<&str>, slug: &str) -> String {
    match parent_path {
        Some(parent) if !parent.is_empty() => format!("{}{}{}", parent, PATH_SEPARATOR, slug),
        _ => slug.to_string(),
    }
}
