/*
 * compiler.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Macro compilation.
//!
//! A macro is compiled once from its pattern, its field mapping and the name
//! of the template it renders. Field values are parsed into literal text and
//! capture-group references up front, so expansion never looks at the raw
//! declaration again.

use std::collections::BTreeMap;

use regex::{Captures, Regex};
use tracing::{debug, trace};
use wikimark_template::{TemplateContext, TemplateRegistry, TemplateValue};

use crate::error::{CompileError, ExpandError};

/// A reference to a capture group inside a field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupRef {
    Index(usize),
    Name(String),
}

impl GroupRef {
    fn parse(name: &str) -> Self {
        match name.parse::<usize>() {
            Ok(index) => GroupRef::Index(index),
            Err(_) => GroupRef::Name(name.to_string()),
        }
    }

    fn resolve<'t>(&self, caps: &Captures<'t>) -> &'t str {
        let group = match self {
            GroupRef::Index(index) => caps.get(*index),
            GroupRef::Name(name) => caps.name(name),
        };
        group.map_or("", |m| m.as_str())
    }
}

impl std::fmt::Display for GroupRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupRef::Index(index) => write!(f, "{}", index),
            GroupRef::Name(name) => f.write_str(name),
        }
    }
}

/// One piece of a text field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Group(GroupRef),
}

/// A value from a macro's field mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Text with `$1`, `${1}` or `${name}` capture references.
    Text(Vec<Segment>),
    Bool(bool),
    Integer(i64),
    Null,
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// Parse a text value, splitting out capture references.
    ///
    /// Follows the replacement syntax of the `regex` crate: `$name` takes the
    /// longest run of `[A-Za-z0-9_]`, `${name}` is delimited explicitly, a
    /// name made only of digits is a group index, and `$$` is a literal `$`.
    /// A `$` that starts no valid reference is kept as text.
    pub fn text(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some(pos) = rest.find('$') {
            literal.push_str(&rest[..pos]);
            rest = &rest[pos..];

            if let Some(tail) = rest.strip_prefix("$$") {
                literal.push('$');
                rest = tail;
                continue;
            }

            match parse_reference(rest) {
                Some((group, len)) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Group(group));
                    rest = &rest[len..];
                }
                None => {
                    literal.push('$');
                    rest = &rest[1..];
                }
            }
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        FieldValue::Text(segments)
    }

    fn from_yaml(key: &str, value: serde_yaml::Value) -> Result<Self, CompileError> {
        use serde_yaml::Value;

        let field = match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Text(vec![Segment::Literal(n.to_string())]),
            },
            Value::String(s) => FieldValue::text(&s),
            Value::Sequence(items) => FieldValue::List(
                items
                    .into_iter()
                    .map(|item| FieldValue::from_yaml(key, item))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Mapping(mapping) => FieldValue::Map(convert_mapping(mapping)?),
            Value::Tagged(_) => {
                return Err(CompileError::Mapping {
                    message: format!("field '{}' uses an unsupported YAML tag", key),
                });
            }
        };
        Ok(field)
    }

    fn groups<'a>(&'a self, out: &mut Vec<&'a GroupRef>) {
        match self {
            FieldValue::Text(segments) => out.extend(segments.iter().filter_map(|s| match s {
                Segment::Group(group) => Some(group),
                Segment::Literal(_) => None,
            })),
            FieldValue::List(items) => items.iter().for_each(|item| item.groups(out)),
            FieldValue::Map(fields) => fields.values().for_each(|value| value.groups(out)),
            FieldValue::Bool(_) | FieldValue::Integer(_) | FieldValue::Null => {}
        }
    }

    fn resolve(&self, caps: &Captures<'_>) -> TemplateValue {
        match self {
            FieldValue::Text(segments) => TemplateValue::String(
                segments
                    .iter()
                    .map(|segment| match segment {
                        Segment::Literal(text) => text.as_str(),
                        Segment::Group(group) => group.resolve(caps),
                    })
                    .collect(),
            ),
            FieldValue::Bool(b) => TemplateValue::Bool(*b),
            FieldValue::Integer(i) => TemplateValue::Integer(*i),
            FieldValue::Null => TemplateValue::Null,
            FieldValue::List(items) => {
                TemplateValue::List(items.iter().map(|item| item.resolve(caps)).collect())
            }
            FieldValue::Map(fields) => TemplateValue::Map(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.resolve(caps)))
                    .collect(),
            ),
        }
    }
}

/// Parse a capture reference at the start of `s` (which begins with `$`).
/// Returns the reference and the number of bytes it spans.
fn parse_reference(s: &str) -> Option<(GroupRef, usize)> {
    let body = &s[1..];
    if let Some(inner) = body.strip_prefix('{') {
        let end = inner.find('}')?;
        let name = &inner[..end];
        if name.is_empty() {
            return None;
        }
        return Some((GroupRef::parse(name), end + 3));
    }

    let len = body
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();
    if len == 0 {
        return None;
    }
    Some((GroupRef::parse(&body[..len]), len + 1))
}

fn convert_mapping(
    mapping: serde_yaml::Mapping,
) -> Result<BTreeMap<String, FieldValue>, CompileError> {
    mapping
        .into_iter()
        .map(|(key, value)| {
            let key = match key {
                serde_yaml::Value::String(key) => key,
                other => {
                    return Err(CompileError::Mapping {
                        message: format!("field names must be strings, got {:?}", other),
                    });
                }
            };
            let value = FieldValue::from_yaml(&key, value)?;
            Ok((key, value))
        })
        .collect()
}

/// The field mapping of a macro declaration: context field name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMapping {
    fields: BTreeMap<String, FieldValue>,
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML mapping such as `Name: ${1}`.
    pub fn from_yaml(source: &str) -> Result<Self, CompileError> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(source).map_err(|e| CompileError::Mapping {
                message: e.to_string(),
            })?;
        Self::from_value(value)
    }

    /// Convert an already-parsed YAML value, which must be a non-empty mapping.
    pub fn from_value(value: serde_yaml::Value) -> Result<Self, CompileError> {
        let serde_yaml::Value::Mapping(mapping) = value else {
            return Err(CompileError::Mapping {
                message: "expected a mapping of field names to values".to_string(),
            });
        };
        if mapping.is_empty() {
            return Err(CompileError::Mapping {
                message: "mapping defines no fields".to_string(),
            });
        }
        Ok(Self {
            fields: convert_mapping(mapping)?,
        })
    }

    /// Add a text field; `value` may contain capture references.
    pub fn with_text(mut self, key: impl Into<String>, value: &str) -> Self {
        self.fields.insert(key.into(), FieldValue::text(value));
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A compiled macro: a matcher bound to a template and a field mapping.
#[derive(Debug, Clone)]
pub struct Macro {
    regex: Regex,
    template: String,
    fields: BTreeMap<String, FieldValue>,
}

/// Check a template name against `[A-Za-z0-9_.:/-]+`.
pub fn is_valid_template_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '/' | '-'))
}

/// Compile a macro.
///
/// Fails if the pattern does not compile, if the template name uses
/// characters outside `[A-Za-z0-9_.:/-]`, or if a field refers to a capture
/// group the pattern does not define. Whether the template exists is only
/// checked when the macro is applied.
pub fn compile(pattern: &str, mapping: FieldMapping, template: &str) -> Result<Macro, CompileError> {
    let regex = Regex::new(pattern).map_err(|source| CompileError::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;

    if !is_valid_template_name(template) {
        return Err(CompileError::TemplateName {
            name: template.to_string(),
        });
    }

    let mut fields = mapping.fields;
    for (field, value) in &fields {
        let mut groups = Vec::new();
        value.groups(&mut groups);
        for group in groups {
            let defined = match group {
                GroupRef::Index(index) => *index < regex.captures_len(),
                GroupRef::Name(name) => regex.capture_names().flatten().any(|n| n == name.as_str()),
            };
            if !defined {
                return Err(CompileError::UnknownGroup {
                    pattern: pattern.to_string(),
                    field: field.clone(),
                    group: group.to_string(),
                });
            }
        }
    }

    for name in regex.capture_names().flatten() {
        fields.entry(name.to_string()).or_insert_with(|| {
            FieldValue::Text(vec![Segment::Group(GroupRef::Name(name.to_string()))])
        });
    }

    debug!(pattern, template, fields = fields.len(), "compiled macro");
    Ok(Macro {
        regex,
        template: template.to_string(),
        fields,
    })
}

impl Macro {
    /// The source of the macro's pattern.
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Field names this macro supplies to its template.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Build the render context for one match.
    pub fn context(&self, caps: &Captures<'_>) -> TemplateContext {
        self.fields
            .iter()
            .map(|(key, value)| (key.clone(), value.resolve(caps)))
            .collect()
    }

    /// Replace every non-overlapping match in `text` with the rendered
    /// template.
    ///
    /// Returns `None` when the pattern does not match at all.
    pub fn apply(
        &self,
        text: &str,
        registry: &TemplateRegistry,
    ) -> Result<Option<String>, ExpandError> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        let mut count = 0usize;

        for caps in self.regex.captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let rendered = registry
                .render(&self.template, &self.context(&caps))
                .map_err(|source| ExpandError::Render {
                    pattern: self.pattern().to_string(),
                    source,
                })?;
            trace!(
                pattern = self.pattern(),
                matched = whole.as_str(),
                "expanding match"
            );
            out.push_str(&text[last..whole.start()]);
            out.push_str(&rendered);
            last = whole.end();
            count += 1;
        }

        if count == 0 {
            return Ok(None);
        }
        out.push_str(&text[last..]);
        debug!(pattern = self.pattern(), template = %self.template, count, "applied macro");
        Ok(Some(out))
    }
}
