//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (concurrency ceiling, listen address)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::ServiceConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyAddress,
    ZeroConcurrency,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyAddress => write!(f, "address must not be empty"),
            ValidationError::ZeroConcurrency => {
                write!(f, "max-concurrency must be at least 1")
            }
        }
    }
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.address.trim().is_empty() {
        errors.push(ValidationError::EmptyAddress);
    }
    if config.max_concurrency == 0 {
        errors.push(ValidationError::ZeroConcurrency);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
