/// Represents an issue found while validating a pipeline's wiring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// A hard error: the pipeline cannot run as configured.
    Error(String),
    /// A warning: the pipeline runs, but a boundary is probably mis-wired.
    Warning(String),
}

/// The result of a pipeline validation pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.issues.push(ValidationIssue::Error(msg.into()));
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.issues.push(ValidationIssue::Warning(msg.into()));
    }

    pub fn is_safe(&self) -> bool {
        !self
            .issues
            .iter()
            .any(|i| matches!(i, ValidationIssue::Error(_)))
    }

    pub fn has_warnings(&self) -> bool {
        self.issues
            .iter()
            .any(|i| matches!(i, ValidationIssue::Warning(_)))
    }

    /// Writes every issue to the log.
    pub fn log_summary(&self) {
        if self.is_safe() && !self.has_warnings() {
            log::info!("Pipeline validation passed: every stage boundary has an adapter.");
            return;
        }

        for issue in &self.issues {
            match issue {
                ValidationIssue::Error(msg) => log::error!("{}", msg),
                ValidationIssue::Warning(msg) => log::warn!("{}", msg),
            }
        }
    }
}
