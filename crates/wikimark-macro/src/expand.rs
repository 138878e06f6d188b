/*
 * expand.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Repeated macro application up to a fixed point.

use tracing::{debug, trace};
use wikimark_template::TemplateRegistry;

use crate::error::ExpandError;
use crate::set::MacroSet;

/// Sweep ceiling used unless configured otherwise.
pub const DEFAULT_MAX_SWEEPS: usize = 64;

/// Applies a [`MacroSet`] to text until a sweep changes nothing.
///
/// Within a sweep each macro runs, in set order, over the output of the
/// macro before it. A sweep in which no macro changed the text ends
/// expansion. Running out of sweeps is an [`ExpandError::NotConverged`].
#[derive(Debug, Clone, Copy)]
pub struct Expander {
    max_sweeps: usize,
}

impl Default for Expander {
    fn default() -> Self {
        Self {
            max_sweeps: DEFAULT_MAX_SWEEPS,
        }
    }
}

impl Expander {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sweep ceiling (at least one sweep is always allowed).
    pub fn with_max_sweeps(mut self, max_sweeps: usize) -> Self {
        self.max_sweeps = max_sweeps.max(1);
        self
    }

    pub fn max_sweeps(&self) -> usize {
        self.max_sweeps
    }

    pub fn expand(
        &self,
        text: &str,
        macros: &MacroSet,
        registry: &TemplateRegistry,
    ) -> Result<String, ExpandError> {
        let mut current = text.to_string();
        let mut changing: Vec<String> = Vec::new();

        for sweep in 1..=self.max_sweeps {
            changing.clear();
            for compiled in macros {
                let Some(next) = compiled.apply(&current, registry)? else {
                    continue;
                };
                if next != current {
                    changing.push(compiled.pattern().to_string());
                    current = next;
                }
            }

            if changing.is_empty() {
                debug!(sweeps = sweep, macros = macros.len(), "macro expansion converged");
                return Ok(current);
            }
            trace!(sweep, changed = changing.len(), "sweep rewrote text");
        }

        Err(ExpandError::NotConverged {
            max_sweeps: self.max_sweeps,
            patterns: changing,
        })
    }
}

/// Expand with the default sweep ceiling.
pub fn expand(
    text: &str,
    macros: &MacroSet,
    registry: &TemplateRegistry,
) -> Result<String, ExpandError> {
    Expander::default().expand(text, macros, registry)
}
