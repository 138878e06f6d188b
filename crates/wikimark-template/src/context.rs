/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template value and context types.
//!
//! This module defines the types used to represent template field values
//! and the field dictionary a template is rendered against.

use std::collections::BTreeMap;
use std::fmt;

/// A value that can be used in template evaluation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TemplateValue {
    /// A string value.
    String(String),

    /// A boolean value.
    Bool(bool),

    /// An integer value.
    Integer(i64),

    /// A list of values.
    List(Vec<TemplateValue>),

    /// A map of string keys to values. Keys iterate in sorted order.
    Map(BTreeMap<String, TemplateValue>),

    /// The "no value" sentinel (absent guard result, failed lookup).
    #[default]
    Null,
}

impl TemplateValue {
    /// Check if this value is "truthy" for conditional evaluation.
    ///
    /// `false`, `0`, the empty string, empty lists, empty maps and no-value
    /// are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            TemplateValue::Bool(b) => *b,
            TemplateValue::String(s) => !s.is_empty(),
            TemplateValue::Integer(i) => *i != 0,
            TemplateValue::List(items) => !items.is_empty(),
            TemplateValue::Map(m) => !m.is_empty(),
            TemplateValue::Null => false,
        }
    }

    /// Get a nested field by path.
    ///
    /// For example, `get_path(&["User", "AccountID"])` on a Map containing
    /// `{"User": {"AccountID": "42"}}` returns the account id value.
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&TemplateValue> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };

        match self {
            TemplateValue::Map(m) => m.get(first.as_ref()).and_then(|v| v.get_path(rest)),
            _ => None,
        }
    }

    /// Borrow the string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TemplateValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render this value as a string for output.
    ///
    /// - String: returned as-is
    /// - Bool: "true" or "false"
    /// - Integer: decimal
    /// - List: `[a b c]`
    /// - Map: `map[k:v ...]`
    /// - Null: ""
    pub fn render(&self) -> String {
        match self {
            TemplateValue::String(s) => s.clone(),
            TemplateValue::Bool(b) => b.to_string(),
            TemplateValue::Integer(i) => i.to_string(),
            TemplateValue::List(items) => {
                let inner: Vec<String> = items.iter().map(|v| v.render()).collect();
                format!("[{}]", inner.join(" "))
            }
            TemplateValue::Map(m) => {
                let inner: Vec<String> = m
                    .iter()
                    .map(|(k, v)| format!("{}:{}", k, v.render()))
                    .collect();
                format!("map[{}]", inner.join(" "))
            }
            TemplateValue::Null => String::new(),
        }
    }

    /// Short name of the value kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            TemplateValue::String(_) => "string",
            TemplateValue::Bool(_) => "bool",
            TemplateValue::Integer(_) => "integer",
            TemplateValue::List(_) => "list",
            TemplateValue::Map(_) => "map",
            TemplateValue::Null => "no value",
        }
    }
}

impl fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        TemplateValue::String(value.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        TemplateValue::String(value)
    }
}

impl From<bool> for TemplateValue {
    fn from(value: bool) -> Self {
        TemplateValue::Bool(value)
    }
}

impl From<i64> for TemplateValue {
    fn from(value: i64) -> Self {
        TemplateValue::Integer(value)
    }
}

impl<T: Into<TemplateValue>> From<Option<T>> for TemplateValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(TemplateValue::Null, Into::into)
    }
}

/// The field dictionary supplied to one render call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateContext {
    fields: BTreeMap<String, TemplateValue>,
}

impl TemplateContext {
    /// Create a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field into the context, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<TemplateValue>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<TemplateValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a field only when the context does not define it yet.
    pub fn insert_default(&mut self, key: impl Into<String>, value: impl Into<TemplateValue>) {
        self.fields.entry(key.into()).or_insert_with(|| value.into());
    }

    pub fn get(&self, key: &str) -> Option<&TemplateValue> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The context as the root dot value of a render.
    pub fn to_value(&self) -> TemplateValue {
        TemplateValue::Map(self.fields.clone())
    }
}

impl From<BTreeMap<String, TemplateValue>> for TemplateContext {
    fn from(fields: BTreeMap<String, TemplateValue>) -> Self {
        Self { fields }
    }
}

impl<K: Into<String>, V: Into<TemplateValue>> FromIterator<(K, V)> for TemplateContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut ctx = TemplateContext::new();
        for (key, value) in iter {
            ctx.insert(key, value);
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(TemplateValue::Bool(true).is_truthy());
        assert!(!TemplateValue::Bool(false).is_truthy());

        assert!(TemplateValue::from("hello").is_truthy());
        assert!(TemplateValue::from("false").is_truthy()); // "false" string is truthy!
        assert!(!TemplateValue::from("").is_truthy());

        assert!(TemplateValue::Integer(7).is_truthy());
        assert!(!TemplateValue::Integer(0).is_truthy());

        assert!(TemplateValue::List(vec![TemplateValue::Bool(false)]).is_truthy());
        assert!(!TemplateValue::List(vec![]).is_truthy());

        let mut map = BTreeMap::new();
        map.insert("key".to_string(), TemplateValue::Null);
        assert!(TemplateValue::Map(map).is_truthy());

        assert!(!TemplateValue::Map(BTreeMap::new()).is_truthy());
        assert!(!TemplateValue::Null.is_truthy());
    }

    #[test]
    fn test_get_path() {
        let mut inner = BTreeMap::new();
        inner.insert("AccountID".to_string(), TemplateValue::from("42"));

        let mut outer = BTreeMap::new();
        outer.insert("User".to_string(), TemplateValue::Map(inner));

        let value = TemplateValue::Map(outer);

        assert_eq!(
            value.get_path(&["User", "AccountID"]),
            Some(&TemplateValue::from("42"))
        );
        assert_eq!(value.get_path(&["User", "Name"]), None);
        assert_eq!(value.get_path(&["Missing"]), None);
        assert_eq!(value.get_path::<&str>(&[]), Some(&value));
    }

    #[test]
    fn test_render() {
        assert_eq!(TemplateValue::from("x").render(), "x");
        assert_eq!(TemplateValue::Bool(false).render(), "false");
        assert_eq!(TemplateValue::Integer(-3).render(), "-3");
        assert_eq!(TemplateValue::Null.render(), "");
        assert_eq!(
            TemplateValue::List(vec!["a".into(), "b".into()]).render(),
            "[a b]"
        );
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(TemplateValue::from(None::<&str>), TemplateValue::Null);
        assert_eq!(TemplateValue::from(Some("x")), TemplateValue::from("x"));
    }

    #[test]
    fn test_context_insert_default_keeps_existing() {
        let mut ctx = TemplateContext::new().with("Name", "alice");
        ctx.insert_default("Name", "bob");
        ctx.insert_default("Color", "Grey");

        assert_eq!(ctx.get("Name"), Some(&TemplateValue::from("alice")));
        assert_eq!(ctx.get("Color"), Some(&TemplateValue::from("Grey")));
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn test_context_to_value_is_map() {
        let ctx: TemplateContext = [("Ticket", "PROJ-1")].into_iter().collect();
        assert_eq!(
            ctx.to_value().get_path(&["Ticket"]),
            Some(&TemplateValue::from("PROJ-1"))
        );
    }
}
