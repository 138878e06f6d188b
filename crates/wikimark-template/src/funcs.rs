/*
 * funcs.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Built-in template functions and the helper function type.
//!
//! `or` is not listed here: its arguments are evaluated lazily and leniently
//! by the evaluator, which is what makes it the default-or-else guard.

use std::sync::Arc;

use crate::context::TemplateValue;

/// A helper function bound into a registry at construction time.
///
/// Helpers receive their evaluated arguments (a piped value comes last) and
/// return a value. A helper that cannot produce a result returns
/// [`TemplateValue::Null`] so that templates can branch on it with `with`.
pub type Helper = Arc<dyn Fn(&[TemplateValue]) -> TemplateValue + Send + Sync>;

/// Names of the functions every template can call.
pub const BUILTINS: &[&str] = &["and", "eq", "html", "len", "ne", "not", "or", "printf"];

/// Check whether `name` is a built-in function.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Call a built-in (other than `or`).
///
/// Returns `None` if `name` is not a built-in, otherwise the result or an
/// error message describing the bad arguments.
pub(crate) fn call_builtin(
    name: &str,
    args: &[TemplateValue],
) -> Option<Result<TemplateValue, String>> {
    let result = match name {
        "and" => and(args),
        "eq" => compare(name, args).map(TemplateValue::Bool),
        "ne" => compare(name, args).map(|eq| TemplateValue::Bool(!eq)),
        "not" => exactly_one(name, args).map(|v| TemplateValue::Bool(!v.is_truthy())),
        "html" => Ok(TemplateValue::String(escape_html(&concat(args)))),
        "len" => exactly_one(name, args).and_then(len),
        "printf" => printf(args).map(TemplateValue::String),
        _ => return None,
    };
    Some(result)
}

fn exactly_one<'a>(name: &str, args: &'a [TemplateValue]) -> Result<&'a TemplateValue, String> {
    match args {
        [value] => Ok(value),
        _ => Err(format!("{} expects 1 argument, got {}", name, args.len())),
    }
}

fn and(args: &[TemplateValue]) -> Result<TemplateValue, String> {
    if args.is_empty() {
        return Err("and expects at least 1 argument".to_string());
    }
    let value = args
        .iter()
        .find(|v| !v.is_truthy())
        .or_else(|| args.last())
        .cloned()
        .unwrap_or_default();
    Ok(value)
}

/// `eq a b c` is true when `a` equals any of the following arguments.
fn compare(name: &str, args: &[TemplateValue]) -> Result<bool, String> {
    let Some((first, rest)) = args.split_first() else {
        return Err(format!("{} expects at least 2 arguments", name));
    };
    if rest.is_empty() {
        return Err(format!("{} expects at least 2 arguments", name));
    }
    if name == "ne" && rest.len() > 1 {
        return Err("ne expects exactly 2 arguments".to_string());
    }
    Ok(rest.iter().any(|other| values_equal(first, other)))
}

/// Equality across kinds compares the rendered forms, so `eq .Level 2`
/// works whether the field holds `2` or `"2"`.
pub(crate) fn values_equal(a: &TemplateValue, b: &TemplateValue) -> bool {
    match (a, b) {
        (TemplateValue::Integer(_), TemplateValue::String(_))
        | (TemplateValue::String(_), TemplateValue::Integer(_)) => a.render() == b.render(),
        _ => a == b,
    }
}

fn len(value: &TemplateValue) -> Result<TemplateValue, String> {
    let n = match value {
        TemplateValue::String(s) => s.chars().count(),
        TemplateValue::List(items) => items.len(),
        TemplateValue::Map(m) => m.len(),
        TemplateValue::Null => 0,
        other => return Err(format!("len of {}", other.kind())),
    };
    i64::try_from(n)
        .map(TemplateValue::Integer)
        .map_err(|_| "len overflow".to_string())
}

fn concat(args: &[TemplateValue]) -> String {
    args.iter().map(|v| v.render()).collect()
}

/// Escape text for inclusion in XML/HTML markup.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// A reduced `printf`: `%s`, `%v`, `%d`, `%q` and `%%`.
fn printf(args: &[TemplateValue]) -> Result<String, String> {
    let Some((format, mut rest)) = args.split_first() else {
        return Err("printf expects a format string".to_string());
    };
    let Some(format) = format.as_str() else {
        return Err(format!("printf format must be a string, got {}", format.kind()));
    };

    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(verb) = chars.next() else {
            return Err("printf format ends with a bare '%'".to_string());
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some((arg, tail)) = rest.split_first() else {
            return Err(format!("printf is missing an argument for %{}", verb));
        };
        rest = tail;
        match verb {
            's' | 'v' => out.push_str(&arg.render()),
            'd' => match arg {
                TemplateValue::Integer(i) => out.push_str(&i.to_string()),
                other => return Err(format!("%d expects an integer, got {}", other.kind())),
            },
            'q' => out.push_str(&format!("{:?}", arg.render())),
            other => return Err(format!("unsupported printf verb %{}", other)),
        }
    }

    if !rest.is_empty() {
        return Err(format!("printf has {} unused argument(s)", rest.len()));
    }
    Ok(out)
}
