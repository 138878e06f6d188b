/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for template parsing and evaluation.

use thiserror::Error;

/// Errors that can occur during template operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    /// Error parsing the template syntax.
    #[error("Parse error in template '{template}' at byte {offset}: {message}")]
    Parse {
        template: String,
        offset: usize,
        message: String,
    },

    /// A function that is neither built in nor bound as a helper.
    #[error("Unknown function '{function}' in template '{template}'")]
    UnknownFunction { template: String, function: String },

    /// A field referenced without a default guard is absent from the context.
    #[error("Template '{template}' references missing field '{field}'")]
    MissingField { template: String, field: String },

    /// A template name that is not registered.
    #[error("Template not found: {name}")]
    UnknownTemplate { name: String },

    /// Recursive template invocation detected.
    #[error("Recursive template invocation detected (depth > {max_depth}): {name}")]
    RecursiveTemplate { name: String, max_depth: usize },

    /// Error evaluating the template (bad function arguments and similar).
    #[error("Evaluation error in template '{template}': {message}")]
    Evaluation { template: String, message: String },
}

impl TemplateError {
    /// Name of the template the error was raised in, when known.
    pub fn template(&self) -> &str {
        match self {
            TemplateError::Parse { template, .. }
            | TemplateError::UnknownFunction { template, .. }
            | TemplateError::MissingField { template, .. }
            | TemplateError::Evaluation { template, .. } => template,
            TemplateError::UnknownTemplate { name }
            | TemplateError::RecursiveTemplate { name, .. } => name,
        }
    }

    /// True for errors raised while compiling a body (as opposed to rendering it).
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            TemplateError::Parse { .. } | TemplateError::UnknownFunction { .. }
        )
    }
}

/// Result type for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;
