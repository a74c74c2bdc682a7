use serde::{Deserialize, Serialize};

/// Recoverable-error category, mirroring the disposition table of the
/// pipeline: everything here was skipped or degraded, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Network timeout, 5xx, connection failure after retries.
    Transient,
    /// Syntax error or undecodable content in a scanned file.
    MalformedInput,
    /// A name failed a validator at a trust boundary.
    UnsafeInput,
    /// A persistent cache failed to load and was reset.
    CacheCorruption,
    /// Unreadable file or directory.
    Permission,
    /// No distribution could be found for an imported module.
    Unresolved,
}

/// Structured warning attached to a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    /// What the warning is about: a path, a module name, a URL.
    pub subject: String,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.subject, self.message)
    }
}
