/*
 * extract.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Extraction of macro declarations embedded in a document.
//!
//! A declaration is an HTML comment of the form
//!
//! ```text
//! <!-- Macro: @\{([^}]+)\}
//!      Template: ac:link:user
//!      Name: ${1} -->
//! ```
//!
//! The first line holds the pattern, the next non-blank line names the
//! template, and the remaining lines are a YAML mapping of context fields.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::compiler::{FieldMapping, compile};
use crate::error::DeclarationError;
use crate::set::MacroSet;

static DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)(<!--\s*Macro:(.*?)-->)(?:\r?\n)?").expect("declaration regex is valid")
});

/// Extract every macro declaration from `text`.
///
/// Returns the compiled macros in document order and the text with the
/// declaration blocks removed. A line break directly after a block is removed
/// with it. The first malformed block aborts extraction.
pub fn extract(text: &str) -> Result<(MacroSet, String), DeclarationError> {
    let mut macros = MacroSet::new();
    let mut remaining = String::with_capacity(text.len());
    let mut last = 0;

    for caps in DECLARATION.captures_iter(text) {
        let (Some(whole), Some(block), Some(body)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        macros.push(parse_declaration(block.as_str(), body.as_str())?);
        remaining.push_str(&text[last..whole.start()]);
        last = whole.end();
    }
    remaining.push_str(&text[last..]);

    debug!(count = macros.len(), "extracted macro declarations");
    Ok((macros, remaining))
}

fn parse_declaration(block: &str, body: &str) -> Result<crate::Macro, DeclarationError> {
    let (pattern, rest) = body.split_once('\n').unwrap_or((body, ""));
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(DeclarationError::MissingPattern {
            block: block.to_string(),
        });
    }

    let mut lines = rest.lines().skip_while(|line| line.trim().is_empty());
    let template = lines
        .next()
        .and_then(|line| line.trim_start().strip_prefix("Template:"))
        .map(str::trim)
        .ok_or_else(|| DeclarationError::MissingTemplate {
            block: block.to_string(),
        })?;

    let mapping = dedent(lines);
    if mapping.trim().is_empty() {
        return Err(DeclarationError::MissingMapping {
            block: block.to_string(),
        });
    }

    let invalid = |source| DeclarationError::Invalid {
        block: block.to_string(),
        source,
    };
    let fields = FieldMapping::from_yaml(&mapping).map_err(invalid)?;
    compile(pattern, fields, template).map_err(invalid)
}

/// Remove the indentation shared by all non-blank lines.
fn dedent<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    let lines: Vec<&str> = lines.collect();
    let indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|line| line.get(indent..).unwrap_or("").trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}
