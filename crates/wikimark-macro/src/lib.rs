/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Text macros for wikimark documents.
//!
//! A macro pairs a regular expression with a named template. Documents can
//! declare their own macros in HTML comments; [`extract`] compiles those
//! declarations and strips them from the text, and an [`Expander`] applies an
//! ordered [`MacroSet`] until the text stops changing.
//!
//! ```ignore
//! let (macros, text) = wikimark_macro::extract(document)?;
//! let macros = macros.then(&stdlib_macros);
//! let output = Expander::new().expand(&text, &macros, &registry)?;
//! ```

pub mod compiler;
pub mod error;
pub mod expand;
pub mod extract;
pub mod set;

pub use compiler::{FieldMapping, FieldValue, Macro, compile, is_valid_template_name};
pub use error::{CompileError, DeclarationError, ExpandError};
pub use expand::{DEFAULT_MAX_SWEEPS, Expander, expand};
pub use extract::extract;
pub use set::MacroSet;
