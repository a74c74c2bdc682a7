//! Name validation at the two trust boundaries: before URL construction
//! and before installer invocation. Both checks are pure and are applied
//! even to names coming from the built-in tables.

use once_cell::sync::Lazy;
use regex::Regex;

static URL_SAFE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,198}[A-Za-z0-9]$").expect("url regex"));

// PEP 508 distribution name with an optional extras suffix.
static SHELL_SAFE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9._-]*[A-Za-z0-9])?(\[[A-Za-z0-9,_ -]+\])?$")
        .expect("shell regex")
});

const URL_FORBIDDEN: &[char] = &['/', '?', '#', '&', '=', '%', '\\'];
const SHELL_METACHARS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '<', '>', '\n', '\r', '\'', '"', '!', '\\',
];

/// Is `name` safe to interpolate into an index URL path segment?
pub fn url_safe(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty name");
    }
    if name.len() > 200 {
        return Err("name longer than 200 characters");
    }
    if name.contains("..") {
        return Err("path traversal sequence");
    }
    if name.contains(URL_FORBIDDEN) {
        return Err("URL-reserved character");
    }
    if !URL_SAFE_RE.is_match(name) {
        return Err("not a valid index name");
    }
    Ok(())
}

/// Is `spec` safe to pass to the installer as a single argv element?
pub fn shell_safe(spec: &str) -> Result<(), &'static str> {
    if spec.is_empty() {
        return Err("empty spec");
    }
    if spec.len() > 200 {
        return Err("spec longer than 200 characters");
    }
    if spec.contains(SHELL_METACHARS) {
        return Err("shell metacharacter");
    }
    if spec.contains(char::is_whitespace) {
        return Err("whitespace");
    }
    if !SHELL_SAFE_RE.is_match(spec) {
        return Err("not a valid distribution spec");
    }
    Ok(())
}
