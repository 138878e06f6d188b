/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for wikimark-core

use std::path::PathBuf;

use thiserror::Error;
use wikimark_macro::{CompileError, DeclarationError, ExpandError};
use wikimark_template::TemplateError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Expand(#[from] ExpandError),

    #[error("Include '{path}' failed: {message}")]
    Include { path: String, message: String },

    #[error("Includes still expanding after {max_passes} passes")]
    IncludeLimit { max_passes: usize },

    #[error("Invalid configuration in {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub(crate) fn include(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Include {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
