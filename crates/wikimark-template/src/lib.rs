/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Named-template engine for wiki storage-format markup.
//!
//! Template bodies use a small action language delimited by `{{` and `}}`:
//!
//! - Field substitution: `{{ .Name }}`, nested with `{{ .User.AccountID }}`
//! - Conditionals: `{{ if .Collapse }}...{{ else if .Title }}...{{ else }}...{{ end }}`
//! - Default-or-else: `{{ or .Color "Grey" }}`
//! - Rebinding over a maybe-value: `{{ with .Name | user }}...{{ else }}...{{ end }}`
//! - Iteration: `{{ range .Items }}...{{ else }}...{{ end }}`
//! - Sub-templates: `{{ template "ac:box" . }}`
//! - Literal emission: `{{ printf "\n" }}`
//! - Comments: `{{/* not rendered */}}`
//! - Whitespace trimming: `{{- ... -}}`
//!
//! # Architecture
//!
//! Bodies are parsed once into a small AST ([`TemplateNode`]) and evaluated
//! against a [`TemplateContext`]. Named templates and helper functions live in
//! a [`TemplateRegistry`]; registration fails immediately on syntax errors and
//! on references to functions the registry does not provide.
//!
//! A field referenced without an `or` guard must be present in the context,
//! otherwise rendering fails with [`TemplateError::MissingField`].
//!
//! # Example
//!
//! ```ignore
//! use wikimark_template::{TemplateContext, TemplateRegistry, TemplateValue};
//!
//! let mut registry = TemplateRegistry::new();
//! registry.register("greeting", "Hello, {{ or .Name \"stranger\" }}!")?;
//!
//! let mut ctx = TemplateContext::new();
//! ctx.insert("Name", TemplateValue::from("World"));
//!
//! assert_eq!(registry.render("greeting", &ctx)?, "Hello, World!");
//! ```

pub mod ast;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod funcs;
pub mod parser;
pub mod registry;

// Re-export main types at crate root
pub use ast::{
    Command, Comment, Conditional, Invoke, Literal, Operand, Output, Pipeline, Range,
    TemplateNode, With,
};
pub use context::{TemplateContext, TemplateValue};
pub use error::{TemplateError, TemplateResult};
pub use funcs::{Helper, is_builtin};
pub use parser::Template;
pub use registry::TemplateRegistry;
