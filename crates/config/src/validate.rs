//! Semantic validation of a loaded configuration.

use crate::schema::TermvaultConfig;

/// Below this, PBKDF2-HMAC-SHA256 offers little resistance to offline guessing.
const WEAK_ITERATIONS: u32 = 10_000;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "kdf.benchmark_target_secs"
    pub path: &'static str,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    fn push(&mut self, severity: Severity, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path,
            message: message.into(),
        });
    }
}

/// Check value ranges the schema types can't express.
pub fn validate(config: &TermvaultConfig) -> ValidationResult {
    let mut result = ValidationResult::default();
    let kdf = &config.kdf;

    if let Some(n) = kdf.iterations {
        if n == 0 {
            result.push(Severity::Error, "kdf.iterations", "must be positive");
        } else if n < WEAK_ITERATIONS {
            result.push(
                Severity::Warning,
                "kdf.iterations",
                format!("{n} is weak; use at least {WEAK_ITERATIONS}"),
            );
        }
    }
    if kdf.default_iterations == 0 {
        result.push(Severity::Error, "kdf.default_iterations", "must be positive");
    }
    if !(kdf.benchmark_target_secs.is_finite() && kdf.benchmark_target_secs > 0.0) {
        result.push(
            Severity::Error,
            "kdf.benchmark_target_secs",
            "must be a positive number of seconds",
        );
    }
    if !(kdf.benchmark_max_total_secs.is_finite() && kdf.benchmark_max_total_secs > 0.0) {
        result.push(
            Severity::Error,
            "kdf.benchmark_max_total_secs",
            "must be a positive number of seconds",
        );
    } else if kdf.benchmark_max_total_secs < kdf.benchmark_target_secs {
        result.push(
            Severity::Warning,
            "kdf.benchmark_max_total_secs",
            "is shorter than one target round; calibration will stop after a single round",
        );
    }
    if kdf.benchmark_max_rounds == 0 {
        result.push(Severity::Error, "kdf.benchmark_max_rounds", "must be at least 1");
    }
    if config.storage.database.trim().is_empty() {
        result.push(Severity::Error, "storage.database", "must not be empty");
    }

    result
}
