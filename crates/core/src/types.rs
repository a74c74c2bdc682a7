use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

static MODULE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("module name regex")
});

/// First dot-separated segment of an import path; only this participates
/// in resolution.
pub fn top_level(module: &str) -> &str {
    module.split('.').next().unwrap_or(module)
}

/// Dotted identifier path as the target language accepts it.
pub fn is_valid_module_name(name: &str) -> bool {
    MODULE_NAME_RE.is_match(name)
}

/// Canonical distribution-name form: trimmed, lowercased, underscores
/// replaced with hyphens.
pub fn normalize_distribution(name: &str) -> String {
    name.trim().to_lowercase().replace('_', "-")
}

/// A resolved distribution, optionally decorated with extras.
/// Renders as `name` or `name[extra1,extra2]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub extras: BTreeSet<String>,
}

impl Dependency {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extras: BTreeSet::new(),
        }
    }

    /// Parse a rendered dependency, splitting off a bracketed extras list.
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        match spec.split_once('[') {
            Some((name, rest)) => {
                let extras = rest
                    .trim_end_matches(']')
                    .split(',')
                    .map(|e| e.trim().to_string())
                    .filter(|e| !e.is_empty())
                    .collect();
                Self {
                    name: name.trim().to_string(),
                    extras,
                }
            }
            None => Self::new(spec),
        }
    }

    /// Case-insensitive key used for dedup and ordering.
    pub fn sort_key(&self) -> String {
        self.name.to_lowercase()
    }

    /// Fold another occurrence of the same distribution into this one,
    /// merging extras. First occurrence keeps its casing.
    pub fn merge(&mut self, other: Dependency) {
        self.extras.extend(other.extras);
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.extras.is_empty() {
            write!(f, "{}", self.name)
        } else {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "{}[{}]", self.name, extras.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_takes_first_segment() {
        assert_eq!(top_level("requests"), "requests");
        assert_eq!(top_level("google.cloud.storage"), "google");
    }

    #[test]
    fn module_name_shape() {
        assert!(is_valid_module_name("requests"));
        assert!(is_valid_module_name("_private"));
        assert!(is_valid_module_name("a.b_c.d2"));
        assert!(!is_valid_module_name(""));
        assert!(!is_valid_module_name("../../etc/passwd"));
        assert!(!is_valid_module_name("a..b"));
        assert!(!is_valid_module_name("2fast"));
    }

    #[test]
    fn dependency_round_trip() {
        let dep = Dependency::parse("uvicorn[standard]");
        assert_eq!(dep.name, "uvicorn");
        assert_eq!(dep.to_string(), "uvicorn[standard]");

        let plain = Dependency::parse("requests");
        assert!(plain.extras.is_empty());
        assert_eq!(plain.to_string(), "requests");
    }

    #[test]
    fn extras_merge_and_sort() {
        let mut a = Dependency::parse("qrcode[pil]");
        a.merge(Dependency::parse("qrcode[svg]"));
        assert_eq!(a.to_string(), "qrcode[pil,svg]");
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_distribution(" Tls_Client "), "tls-client");
    }
}
