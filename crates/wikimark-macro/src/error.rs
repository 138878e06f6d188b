/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for macro compilation, extraction and expansion.

use thiserror::Error;
use wikimark_template::TemplateError;

/// A macro could not be compiled from its parts.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("invalid macro pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid template name '{name}': only [A-Za-z0-9_.:/-] are allowed")]
    TemplateName { name: String },

    #[error("invalid field mapping: {message}")]
    Mapping { message: String },

    #[error("field '{field}' references capture group '{group}' which `{pattern}` does not define")]
    UnknownGroup {
        pattern: String,
        field: String,
        group: String,
    },
}

/// A macro declaration block in a document is malformed.
///
/// Every variant carries the literal text of the offending block.
#[derive(Debug, Clone, Error)]
pub enum DeclarationError {
    #[error("macro declaration has an empty pattern:\n{block}")]
    MissingPattern { block: String },

    #[error("macro declaration has no `Template:` line:\n{block}")]
    MissingTemplate { block: String },

    #[error("macro declaration has no field mapping:\n{block}")]
    MissingMapping { block: String },

    #[error("invalid macro declaration: {source}\n{block}")]
    Invalid {
        block: String,
        #[source]
        source: CompileError,
    },
}

impl DeclarationError {
    /// The literal declaration block that failed.
    pub fn block(&self) -> &str {
        match self {
            DeclarationError::MissingPattern { block }
            | DeclarationError::MissingTemplate { block }
            | DeclarationError::MissingMapping { block }
            | DeclarationError::Invalid { block, .. } => block,
        }
    }
}

/// Macro expansion failed.
#[derive(Debug, Clone, Error)]
pub enum ExpandError {
    #[error("macro `{pattern}` failed to render: {source}")]
    Render {
        pattern: String,
        #[source]
        source: TemplateError,
    },

    #[error(
        "macro expansion did not converge after {max_sweeps} sweeps; still rewriting: {}",
        patterns.join(", ")
    )]
    NotConverged {
        max_sweeps: usize,
        patterns: Vec<String>,
    },
}
