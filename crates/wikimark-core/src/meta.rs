/*
 * meta.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Page metadata headers.
//!
//! A document may start with one-line comments describing the page:
//!
//! ```text
//! <!-- Space: DOC -->
//! <!-- Parent: Engineering -->
//! <!-- Title: Release notes -->
//! <!-- Layout: article -->
//! ```
//!
//! Scanning stops at the first line that is not a known header.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^<!--\s*([^:]+?)\s*:\s*(.*?)\s*-->$").expect("header regex is valid")
});

/// Page type used when no `Type` header is given.
pub const DEFAULT_PAGE_TYPE: &str = "page";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMeta {
    pub space: String,
    pub parents: Vec<String>,
    pub title: String,
    pub layout: String,
    pub page_type: String,
    pub attachments: Vec<String>,
    pub labels: Vec<String>,
}

impl Default for PageMeta {
    fn default() -> Self {
        Self {
            space: String::new(),
            parents: Vec::new(),
            title: String::new(),
            layout: String::new(),
            page_type: DEFAULT_PAGE_TYPE.to_string(),
            attachments: Vec::new(),
            labels: Vec::new(),
        }
    }
}

impl PageMeta {
    /// Apply one header. Returns false if `key` is not a page header.
    fn apply(&mut self, key: &str, value: &str) -> bool {
        let value = value.to_string();
        match key {
            "Space" => self.space = value,
            "Parent" => self.parents.push(value),
            "Title" => self.title = value,
            "Layout" => self.layout = value,
            "Type" => self.page_type = value,
            "Attachment" => {
                if !self.attachments.contains(&value) {
                    self.attachments.push(value);
                }
            }
            "Label" => self.labels.push(value),
            _ => return false,
        }
        true
    }
}

/// Header keys are matched with their first letter capitalized, so
/// `<!-- space: DOC -->` is accepted too.
fn normalize_key(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Split leading page headers from the document.
///
/// Returns `None` when the document has no headers, together with the text
/// that follows the last header line.
pub fn extract_meta(text: &str) -> (Option<PageMeta>, &str) {
    let mut meta = PageMeta::default();
    let mut found = false;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let Some(caps) = HEADER.captures(line.trim()) else {
            break;
        };
        if !meta.apply(&normalize_key(&caps[1]), &caps[2]) {
            break;
        }
        found = true;
        offset += line.len();
    }

    let meta = found.then_some(meta);
    if let Some(meta) = &meta {
        debug!(space = %meta.space, title = %meta.title, "extracted page metadata");
    }
    (meta, &text[offset..])
}
