/*
 * registry.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Named template registry.
//!
//! A registry maps template names to compiled templates and owns the helper
//! functions those templates may call. Registries are layered: an overlay
//! resolves names locally first and then in a shared, read-only base, so a
//! document can redeclare templates without touching the shared set.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::context::{TemplateContext, TemplateValue};
use crate::error::{TemplateError, TemplateResult};
use crate::funcs::{Helper, is_builtin};
use crate::parser::Template;

/// A set of named templates plus the helper functions they can call.
#[derive(Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Arc<Template>>,
    helpers: HashMap<String, Helper>,
    base: Option<Arc<TemplateRegistry>>,
}

impl TemplateRegistry {
    /// Create a new empty registry with only the built-in functions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a private overlay on top of a shared registry.
    ///
    /// Registrations into the overlay shadow templates of the same name in
    /// `base`; `base` itself is never modified.
    pub fn overlay(base: &Arc<TemplateRegistry>) -> Self {
        Self {
            templates: HashMap::new(),
            helpers: HashMap::new(),
            base: Some(Arc::clone(base)),
        }
    }

    /// Bind a helper function under `name`.
    pub fn with_helper<F>(mut self, name: impl Into<String>, helper: F) -> Self
    where
        F: Fn(&[TemplateValue]) -> TemplateValue + Send + Sync + 'static,
    {
        self.helpers.insert(name.into(), Arc::new(helper));
        self
    }

    /// Compile `body` and register it under `name`.
    ///
    /// Fails if the body does not parse or calls a function that is neither
    /// built in nor a helper visible from this registry. Registering an
    /// existing name replaces the earlier template.
    pub fn register(&mut self, name: impl Into<String>, body: &str) -> TemplateResult<()> {
        let name = name.into();
        let template = Template::compile_with_name(body, &name)?;

        if let Some(function) = template
            .functions()
            .into_iter()
            .find(|f| !is_builtin(f) && self.helper(f).is_none())
        {
            return Err(TemplateError::UnknownFunction {
                template: name,
                function,
            });
        }

        if self.contains(&name) {
            debug!(template = %name, "redeclaring template");
        }
        self.templates.insert(name, Arc::new(template));
        Ok(())
    }

    /// Look up a template, checking the base registry when not found locally.
    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates
            .get(name)
            .map(|template| &**template)
            .or_else(|| self.base.as_ref().and_then(|b| b.get(name)))
    }

    /// Look up a helper function, checking the base registry when not found locally.
    pub fn helper(&self, name: &str) -> Option<&Helper> {
        self.helpers
            .get(name)
            .or_else(|| self.base.as_ref().and_then(|b| b.helper(name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All visible template names, sorted.
    pub fn names(&self) -> BTreeSet<&str> {
        let mut names = self.base.as_ref().map_or_else(BTreeSet::new, |b| b.names());
        names.extend(self.templates.keys().map(String::as_str));
        names
    }

    /// Number of visible templates.
    pub fn len(&self) -> usize {
        self.names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the template registered under `name`.
    pub fn render(&self, name: &str, context: &TemplateContext) -> TemplateResult<String> {
        self.render_value(name, &context.to_value())
    }

    /// Render the template registered under `name` with an arbitrary dot value.
    pub fn render_value(&self, name: &str, dot: &TemplateValue) -> TemplateResult<String> {
        let template = self.get(name).ok_or_else(|| TemplateError::UnknownTemplate {
            name: name.to_string(),
        })?;
        template.render_value(dot, Some(self), 0, 0)
    }
}

impl fmt::Debug for TemplateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut helpers: Vec<&str> = self.helpers.keys().map(String::as_str).collect();
        helpers.sort_unstable();
        f.debug_struct("TemplateRegistry")
            .field("templates", &self.templates.keys().collect::<BTreeSet<_>>())
            .field("helpers", &helpers)
            .field("base", &self.base)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::MAX_NESTING_DEPTH;
    use pretty_assertions::assert_eq;

    fn upper(args: &[TemplateValue]) -> TemplateValue {
        args.last()
            .map(|v| TemplateValue::String(v.render().to_uppercase()))
            .unwrap_or_default()
    }

    #[test]
    fn test_register_and_render() {
        let mut registry = TemplateRegistry::new();
        registry.register("ac:jira:ticket", "<key>{{ .Ticket }}</key>").unwrap();

        let ctx = TemplateContext::new().with("Ticket", "PROJ-1");
        assert_eq!(
            registry.render("ac:jira:ticket", &ctx).unwrap(),
            "<key>PROJ-1</key>"
        );
    }

    #[test]
    fn test_register_fails_fast_on_syntax_error() {
        let mut registry = TemplateRegistry::new();
        let err = registry.register("broken", "{{ if .A }}never closed").unwrap_err();
        assert!(err.is_compile_error());
        assert!(!registry.contains("broken"));
    }

    #[test]
    fn test_register_fails_on_unknown_function() {
        let mut registry = TemplateRegistry::new();
        let err = registry.register("t", "{{ .Name | shout }}").unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnknownFunction {
                template: "t".to_string(),
                function: "shout".to_string(),
            }
        );
    }

    #[test]
    fn test_helper_is_called_with_piped_value() {
        let mut registry = TemplateRegistry::new().with_helper("shout", upper);
        registry.register("t", "{{ .Name | shout }}!").unwrap();

        let ctx = TemplateContext::new().with("Name", "hey");
        assert_eq!(registry.render("t", &ctx).unwrap(), "HEY!");
    }

    #[test]
    fn test_redeclare_replaces() {
        let mut registry = TemplateRegistry::new();
        registry.register("t", "one").unwrap();
        registry.register("t", "two").unwrap();
        assert_eq!(registry.render("t", &TemplateContext::new()).unwrap(), "two");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_template() {
        let registry = TemplateRegistry::new();
        let err = registry.render("nope", &TemplateContext::new()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnknownTemplate {
                name: "nope".to_string()
            }
        );
    }

    #[test]
    fn test_overlay_shadows_without_touching_base() {
        let mut base = TemplateRegistry::new().with_helper("shout", upper);
        base.register("greeting", "hello").unwrap();
        base.register("other", "other").unwrap();
        let base = Arc::new(base);

        let mut overlay = TemplateRegistry::overlay(&base);
        overlay.register("greeting", "{{ \"hi\" | shout }}").unwrap();

        let ctx = TemplateContext::new();
        assert_eq!(overlay.render("greeting", &ctx).unwrap(), "HI");
        assert_eq!(overlay.render("other", &ctx).unwrap(), "other");
        assert_eq!(base.render("greeting", &ctx).unwrap(), "hello");
        assert_eq!(
            overlay.names().into_iter().collect::<Vec<_>>(),
            vec!["greeting", "other"]
        );
    }

    #[test]
    fn test_sub_template_invocation() {
        let mut registry = TemplateRegistry::new();
        registry.register("item", "<li>{{ . }}</li>").unwrap();
        registry
            .register("list", "<ul>{{ range .Items }}{{ template \"item\" . }}{{ end }}</ul>")
            .unwrap();

        let ctx = TemplateContext::new().with(
            "Items",
            TemplateValue::List(vec!["a".into(), "b".into()]),
        );
        assert_eq!(
            registry.render("list", &ctx).unwrap(),
            "<ul><li>a</li><li>b</li></ul>"
        );
    }

    #[test]
    fn test_recursive_template_is_bounded() {
        let mut registry = TemplateRegistry::new();
        registry.register("loop", "x{{ template \"loop\" }}").unwrap();

        let err = registry.render("loop", &TemplateContext::new()).unwrap_err();
        assert!(matches!(err, TemplateError::RecursiveTemplate { name, .. } if name == "loop"));
    }

    #[test]
    fn test_deep_template_rejected_at_registration() {
        let mut registry = TemplateRegistry::new();
        let body = format!(
            "{}x{}",
            "{{ if true }}".repeat(20_000),
            "{{ end }}".repeat(20_000)
        );
        let err = registry.register("t", &body).unwrap_err();
        assert!(matches!(err, TemplateError::Parse { .. }));
        assert!(!registry.contains("t"));
    }

    #[test]
    fn test_render_nesting_is_bounded_across_invocations() {
        let mut registry = TemplateRegistry::new();
        let body = format!(
            "{}{{{{ template \"deep\" }}}}{}",
            "{{ if true }}".repeat(MAX_NESTING_DEPTH - 1),
            "{{ end }}".repeat(MAX_NESTING_DEPTH - 1)
        );
        registry.register("deep", &body).unwrap();

        let err = registry.render("deep", &TemplateContext::new()).unwrap_err();
        assert!(matches!(
            &err,
            TemplateError::Evaluation { message, .. } if message.contains("nesting exceeds")
        ));
    }

    #[test]
    fn test_missing_field_reports_template_name() {
        let mut registry = TemplateRegistry::new();
        registry.register("ac:emoticon", "<e n=\"{{ .Name }}\"/>").unwrap();
        let err = registry
            .render("ac:emoticon", &TemplateContext::new())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Template 'ac:emoticon' references missing field '.Name'"
        );
    }
}
