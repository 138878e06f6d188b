/*
 * set.rs
 * Copyright (c) 2025 Posit, PBC
 */

use crate::compiler::Macro;

/// An ordered list of macros. Earlier macros are applied first in every sweep.
#[derive(Debug, Clone, Default)]
pub struct MacroSet {
    macros: Vec<Macro>,
}

impl MacroSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, compiled: Macro) {
        self.macros.push(compiled);
    }

    /// Append every macro of `other` after the macros already in this set.
    pub fn append(&mut self, other: &MacroSet) {
        self.macros.extend(other.macros.iter().cloned());
    }

    /// This set followed by `other`.
    pub fn then(mut self, other: &MacroSet) -> Self {
        self.append(other);
        self
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Macro> {
        self.macros.iter()
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Patterns of all macros, in order.
    pub fn patterns(&self) -> Vec<&str> {
        self.macros.iter().map(Macro::pattern).collect()
    }
}

impl FromIterator<Macro> for MacroSet {
    fn from_iter<I: IntoIterator<Item = Macro>>(iter: I) -> Self {
        Self {
            macros: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a MacroSet {
    type Item = &'a Macro;
    type IntoIter = std::slice::Iter<'a, Macro>;

    fn into_iter(self) -> Self::IntoIter {
        self.macros.iter()
    }
}
