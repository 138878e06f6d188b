/*
 * include.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Include directives: templates pulled into a document from a source.
 */

//! Include directives.
//!
//! ```text
//! <!-- Include: templates/warning.tpl
//!      Title: Careful -->
//! ```
//!
//! The named template is loaded from a [`TemplateSource`] (once per
//! registry), registered under its path, rendered with the YAML mapping as
//! context, and spliced in place of the directive. Included output may itself
//! contain directives, so callers repeat [`process_includes`] until it reports
//! no further work.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use wikimark_template::{TemplateContext, TemplateRegistry, TemplateValue};

use crate::error::{CoreError, Result};

/// Upper bound on include passes for one document.
pub const MAX_INCLUDE_PASSES: usize = 32;

static INCLUDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<!--\s*Include:[ \t]*([^\s>]+)(.*?)-->").expect("include regex is valid")
});

/// Where include directives load template bodies from.
pub trait TemplateSource: Send + Sync {
    fn load(&self, path: &str) -> io::Result<String>;
}

/// Loads templates from files under a root directory.
#[derive(Debug, Clone)]
pub struct FileSystemSource {
    root: PathBuf,
}

impl FileSystemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TemplateSource for FileSystemSource {
    fn load(&self, path: &str) -> io::Result<String> {
        std::fs::read_to_string(self.root.join(path))
    }
}

/// Templates held in memory, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    templates: HashMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, body: impl Into<String>) -> Self {
        self.templates.insert(path.into(), body.into());
        self
    }
}

impl TemplateSource for MemorySource {
    fn load(&self, path: &str) -> io::Result<String> {
        self.templates.get(path).cloned().ok_or_else(|| not_found(path))
    }
}

/// A source with no templates; every include fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSource;

impl TemplateSource for NullSource {
    fn load(&self, path: &str) -> io::Result<String> {
        Err(not_found(path))
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no template at '{}'", path))
}

/// Convert a YAML value into a template value.
pub fn yaml_to_value(value: serde_yaml::Value) -> TemplateValue {
    use serde_yaml::Value;

    match value {
        Value::Null => TemplateValue::Null,
        Value::Bool(b) => TemplateValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => TemplateValue::Integer(i),
            None => TemplateValue::String(n.to_string()),
        },
        Value::String(s) => TemplateValue::String(s),
        Value::Sequence(items) => {
            TemplateValue::List(items.into_iter().map(yaml_to_value).collect())
        }
        Value::Mapping(mapping) => TemplateValue::Map(
            mapping
                .into_iter()
                .filter_map(|(key, value)| match key {
                    Value::String(key) => Some((key, yaml_to_value(value))),
                    Value::Bool(_) | Value::Number(_) => {
                        let key = serde_yaml::to_string(&key).ok()?;
                        Some((key.trim_end().to_string(), yaml_to_value(value)))
                    }
                    _ => None,
                })
                .collect(),
        ),
        Value::Tagged(tagged) => yaml_to_value(tagged.value),
    }
}

fn include_context(path: &str, data: &str) -> Result<TemplateContext> {
    let data = dedent(data);
    if data.trim().is_empty() {
        return Ok(TemplateContext::new());
    }
    let value: serde_yaml::Value =
        serde_yaml::from_str(&data).map_err(|e| CoreError::include(path, e))?;
    match yaml_to_value(value) {
        TemplateValue::Map(fields) => Ok(TemplateContext::from(fields)),
        TemplateValue::Null => Ok(TemplateContext::new()),
        other => Err(CoreError::include(
            path,
            format!("include data must be a mapping, got {}", other.kind()),
        )),
    }
}

fn dedent(text: &str) -> String {
    let indent = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    text.lines()
        .map(|line| line.get(indent..).unwrap_or("").trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace every include directive in `text`.
///
/// Templates are registered into `registry` under their path, so a path
/// already known to the registry is not loaded again. Returns the new text
/// and whether any directive was processed.
pub fn process_includes(
    text: &str,
    registry: &mut TemplateRegistry,
    source: &dyn TemplateSource,
) -> Result<(String, bool)> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut processed = false;

    for caps in INCLUDE.captures_iter(text) {
        let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let path = path.as_str();
        let data = caps.get(2).map_or("", |m| m.as_str());

        if !registry.contains(path) {
            let body = source.load(path).map_err(|e| CoreError::include(path, e))?;
            registry.register(path, &body)?;
            debug!(path, "loaded include template");
        }

        let context = include_context(path, data)?;
        let rendered = registry.render(path, &context)?;

        out.push_str(&text[last..whole.start()]);
        out.push_str(&rendered);
        last = whole.end();
        processed = true;
    }

    if !processed {
        return Ok((text.to_string(), false));
    }
    out.push_str(&text[last..]);
    Ok((out, true))
}

/// Run [`process_includes`] until no directives remain.
pub fn resolve_includes(
    text: &str,
    registry: &mut TemplateRegistry,
    source: &dyn TemplateSource,
) -> Result<String> {
    let mut current = text.to_string();
    for pass in 1..=MAX_INCLUDE_PASSES {
        let (next, recurse) = process_includes(&current, registry, source)?;
        current = next;
        if !recurse {
            debug!(passes = pass, "includes resolved");
            return Ok(current);
        }
    }
    Err(CoreError::IncludeLimit {
        max_passes: MAX_INCLUDE_PASSES,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_include_with_data() {
        let source = MemorySource::new().with("warn.tpl", "<warn>{{ .Title }}</warn>");
        let mut registry = TemplateRegistry::new();

        let (text, recurse) = process_includes(
            "a\n<!-- Include: warn.tpl\n     Title: Careful -->\nb",
            &mut registry,
            &source,
        )
        .unwrap();
        assert_eq!(text, "a\n<warn>Careful</warn>\nb");
        assert!(recurse);
        assert!(registry.contains("warn.tpl"));
    }

    #[test]
    fn test_include_without_data() {
        let source = MemorySource::new().with("hr", "<hr/>");
        let mut registry = TemplateRegistry::new();
        let (text, _) = process_includes("<!-- Include: hr -->", &mut registry, &source).unwrap();
        assert_eq!(text, "<hr/>");
    }

    #[test]
    fn test_no_directives() {
        let mut registry = TemplateRegistry::new();
        let (text, recurse) =
            process_includes("<!-- Space: DOC -->\nbody", &mut registry, &NullSource).unwrap();
        assert_eq!(text, "<!-- Space: DOC -->\nbody");
        assert!(!recurse);
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let mut registry = TemplateRegistry::new();
        let err = process_includes("<!-- Include: nope -->", &mut registry, &NullSource)
            .unwrap_err();
        assert!(matches!(err, CoreError::Include { path, .. } if path == "nope"));
    }

    #[test]
    fn test_nested_includes_resolve() {
        let source = MemorySource::new()
            .with("outer", "[<!-- Include: inner -->]")
            .with("inner", "in");
        let mut registry = TemplateRegistry::new();
        let text = resolve_includes("<!-- Include: outer -->", &mut registry, &source).unwrap();
        assert_eq!(text, "[in]");
    }

    #[test]
    fn test_self_include_hits_limit() {
        let source = MemorySource::new().with("loop", "<!-- Include: loop -->");
        let mut registry = TemplateRegistry::new();
        let err = resolve_includes("<!-- Include: loop -->", &mut registry, &source).unwrap_err();
        assert!(matches!(
            err,
            CoreError::IncludeLimit { max_passes } if max_passes == MAX_INCLUDE_PASSES
        ));
    }

    #[test]
    fn test_deeply_nested_include_is_an_error() {
        let body = format!(
            "{}x{}",
            "{{ if true }}".repeat(20_000),
            "{{ end }}".repeat(20_000)
        );
        let source = MemorySource::new().with("deep.tpl", body);
        let mut registry = TemplateRegistry::new();
        let err = process_includes("<!-- Include: deep.tpl -->", &mut registry, &source)
            .unwrap_err();
        assert!(matches!(err, CoreError::Template(_)));
    }

    #[test]
    fn test_file_system_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("note.tpl"), "note: {{ .Text }}").unwrap();

        let source = FileSystemSource::new(dir.path());
        let mut registry = TemplateRegistry::new();
        let (text, _) = process_includes(
            "<!-- Include: note.tpl\n  Text: hi\n-->",
            &mut registry,
            &source,
        )
        .unwrap();
        assert_eq!(text, "note: hi");
    }

    #[test]
    fn test_yaml_values() {
        let value: serde_yaml::Value =
            serde_yaml::from_str("a: 1\nb: [x, true]\nc: ~\n").unwrap();
        let TemplateValue::Map(fields) = yaml_to_value(value) else {
            panic!("expected a map");
        };
        assert_eq!(fields["a"], TemplateValue::Integer(1));
        assert_eq!(
            fields["b"],
            TemplateValue::List(vec!["x".into(), TemplateValue::Bool(true)])
        );
        assert_eq!(fields["c"], TemplateValue::Null);
    }
}
