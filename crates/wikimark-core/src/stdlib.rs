/*
 * stdlib.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Built-in templates, macros and helpers.
 */

//! Standard library.
//!
//! [`Stdlib::assemble`] builds the shared registry of storage-format templates
//! and the built-in macro set. The directory lookup used by `ac:link:user` is
//! injected here; assemble again to use a different one.
//!
//! The registry is wrapped in an `Arc` and never modified after assembly.
//! Documents register their own templates in an overlay
//! ([`TemplateRegistry::overlay`]).

use std::sync::Arc;

use tracing::{debug, warn};
use wikimark_macro::MacroSet;
use wikimark_template::{TemplateRegistry, TemplateValue};

use crate::Result;
use crate::directory::DirectoryLookup;

/// `(name, body)` of every built-in template.
const TEMPLATES: &[(&str, &str)] = &[
    (
        "ac:layout",
        concat!(
            r#"{{ if eq (or .Layout "") "article" }}"#,
            "<ac:layout>",
            r#"<ac:layout-section ac:type="two_right_sidebar">"#,
            "<ac:layout-cell>{{ .Body }}</ac:layout-cell>",
            "<ac:layout-cell></ac:layout-cell>",
            "</ac:layout-section>",
            "</ac:layout>",
            "{{ else }}",
            "{{ .Body }}",
            "{{ end }}",
        ),
    ),
    (
        "ac:code",
        concat!(
            r#"{{ if or .Collapse false }}<ac:structured-macro ac:name="expand">{{printf "\n"}}"#,
            r#"{{ if or .Title "" }}<ac:parameter ac:name="title">{{ .Title }}</ac:parameter>{{printf "\n"}}{{ end }}"#,
            r#"<ac:rich-text-body>{{printf "\n"}}{{ end }}"#,
            r#"<ac:structured-macro ac:name="code">{{printf "\n"}}"#,
            r#"<ac:parameter ac:name="language">{{ .Language }}</ac:parameter>{{printf "\n"}}"#,
            r#"<ac:parameter ac:name="collapse">{{ or .Collapse false }}</ac:parameter>{{printf "\n"}}"#,
            r#"{{ if or .Title "" }}<ac:parameter ac:name="title">{{ .Title }}</ac:parameter>{{printf "\n"}}{{ end }}"#,
            r#"<ac:plain-text-body><![CDATA[{{ .Text | cdata }}]]></ac:plain-text-body>{{printf "\n"}}"#,
            r#"</ac:structured-macro>{{printf "\n"}}"#,
            r#"{{ if or .Collapse false }}</ac:rich-text-body>{{printf "\n"}}"#,
            r#"</ac:structured-macro>{{printf "\n"}}{{ end }}"#,
        ),
    ),
    (
        "ac:status",
        concat!(
            r#"<ac:structured-macro ac:name="status">"#,
            r#"<ac:parameter ac:name="colour">{{ or .Color "Grey" }}</ac:parameter>"#,
            r#"<ac:parameter ac:name="title">{{ or .Title .Color }}</ac:parameter>"#,
            r#"<ac:parameter ac:name="subtle">{{ or .Subtle false }}</ac:parameter>"#,
            "</ac:structured-macro>",
        ),
    ),
    (
        "ac:link:user",
        concat!(
            "{{ with .Name | user }}",
            "<ac:link>",
            r#"<ri:user ri:account-id="{{ .AccountID }}"/>"#,
            "</ac:link>",
            "{{ else }}",
            "{{ .Name }}",
            "{{ end }}",
        ),
    ),
    (
        "ac:jira:ticket",
        concat!(
            r#"<ac:structured-macro ac:name="jira">"#,
            r#"<ac:parameter ac:name="key">{{ .Ticket }}</ac:parameter>"#,
            "</ac:structured-macro>",
        ),
    ),
    (
        "ac:box",
        concat!(
            r#"<ac:structured-macro ac:name="{{ .Name }}">{{printf "\n"}}"#,
            r#"<ac:parameter ac:name="icon">{{ or .Icon "false" }}</ac:parameter>{{printf "\n"}}"#,
            r#"<ac:parameter ac:name="title">{{ or .Title "" }}</ac:parameter>{{printf "\n"}}"#,
            r#"<ac:rich-text-body>{{printf "\n"}}"#,
            r#"{{ .Body }}{{printf "\n"}}"#,
            r#"</ac:rich-text-body>{{printf "\n"}}"#,
            r#"</ac:structured-macro>{{printf "\n"}}"#,
        ),
    ),
    (
        "ac:toc",
        concat!(
            r#"<ac:structured-macro ac:name="toc">{{printf "\n"}}"#,
            r#"<ac:parameter ac:name="printable">{{ or .Printable "true" }}</ac:parameter>{{printf "\n"}}"#,
            r#"<ac:parameter ac:name="style">{{ or .Style "disc" }}</ac:parameter>{{printf "\n"}}"#,
            r#"<ac:parameter ac:name="maxLevel">{{ or .MaxLevel "7" }}</ac:parameter>{{printf "\n"}}"#,
            r#"<ac:parameter ac:name="indent">{{ or .Indent "" }}</ac:parameter>{{printf "\n"}}"#,
            r#"<ac:parameter ac:name="minLevel">{{ or .MinLevel "1" }}</ac:parameter>{{printf "\n"}}"#,
            r#"<ac:parameter ac:name="exclude">{{ or .Exclude "" }}</ac:parameter>{{printf "\n"}}"#,
            r#"<ac:parameter ac:name="type">{{ or .Type "list" }}</ac:parameter>{{printf "\n"}}"#,
            r#"<ac:parameter ac:name="outline">{{ or .Outline "clear" }}</ac:parameter>{{printf "\n"}}"#,
            r#"<ac:parameter ac:name="include">{{ or .Include "" }}</ac:parameter>{{printf "\n"}}"#,
            r#"</ac:structured-macro>{{printf "\n"}}"#,
        ),
    ),
    (
        "ac:emoticon",
        r#"<ac:emoticon ac:name="{{ .Name }}"/>"#,
    ),
];

/// Built-in macros, written in the same declaration syntax documents use.
const MACROS: &str = concat!(
    "<!-- Macro: @\\{([^}]+)\\}\n",
    "     Template: ac:link:user\n",
    "     Name: ${1} -->\n",
);

/// Split a CDATA end marker across two sections.
pub fn escape_cdata(text: &str) -> String {
    text.replace("]]>", "]]]]><![CDATA[>")
}

fn cdata(args: &[TemplateValue]) -> TemplateValue {
    args.last()
        .map_or(TemplateValue::Null, |value| TemplateValue::String(escape_cdata(&value.render())))
}

/// The `user` helper: a name to its identity, or no-value.
fn user(
    lookup: Arc<dyn DirectoryLookup>,
) -> impl Fn(&[TemplateValue]) -> TemplateValue + Send + Sync + 'static {
    move |args: &[TemplateValue]| {
        let Some(name) = args.last().and_then(TemplateValue::as_str) else {
            return TemplateValue::Null;
        };
        match lookup.lookup(name) {
            Ok(Some(identity)) => identity.to_value(),
            Ok(None) => {
                debug!(name, "user not found in directory");
                TemplateValue::Null
            }
            Err(err) => {
                warn!(name, error = %err, "user lookup failed");
                TemplateValue::Null
            }
        }
    }
}

/// The assembled standard library.
#[derive(Debug, Clone)]
pub struct Stdlib {
    registry: Arc<TemplateRegistry>,
    macros: MacroSet,
}

impl Stdlib {
    /// Build the built-in templates and macros around `lookup`.
    ///
    /// A failure here means a built-in template or macro does not compile.
    pub fn assemble(lookup: Arc<dyn DirectoryLookup>) -> Result<Self> {
        let mut registry = TemplateRegistry::new()
            .with_helper("user", user(lookup))
            .with_helper("cdata", cdata);
        for (name, body) in TEMPLATES {
            registry.register(*name, body)?;
        }

        let (macros, _) = wikimark_macro::extract(MACROS)?;
        debug!(
            templates = registry.len(),
            macros = macros.len(),
            "assembled standard library"
        );
        Ok(Self {
            registry: Arc::new(registry),
            macros,
        })
    }

    /// The shared, read-only template registry.
    pub fn registry(&self) -> &Arc<TemplateRegistry> {
        &self.registry
    }

    pub fn macros(&self) -> &MacroSet {
        &self.macros
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Identity, LookupError, NullDirectory, StaticDirectory};
    use pretty_assertions::assert_eq;
    use wikimark_template::TemplateContext;

    fn stdlib() -> Stdlib {
        Stdlib::assemble(Arc::new(StaticDirectory::new().with_user("alice", "42"))).unwrap()
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` with a thread-local subscriber and return what it logged.
    fn with_captured_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let result = tracing::subscriber::with_default(subscriber, f);
        let logs = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        (result, logs)
    }

    #[test]
    fn test_all_templates_registered() {
        let lib = stdlib();
        assert_eq!(
            lib.registry().names().into_iter().collect::<Vec<_>>(),
            vec![
                "ac:box",
                "ac:code",
                "ac:emoticon",
                "ac:jira:ticket",
                "ac:layout",
                "ac:link:user",
                "ac:status",
                "ac:toc",
            ]
        );
        assert_eq!(lib.macros().patterns(), vec![r"@\{([^}]+)\}"]);
    }

    #[test]
    fn test_link_user_found() {
        let ctx = TemplateContext::new().with("Name", "alice");
        assert_eq!(
            stdlib().registry().render("ac:link:user", &ctx).unwrap(),
            r#"<ac:link><ri:user ri:account-id="42"/></ac:link>"#
        );
    }

    #[test]
    fn test_link_user_falls_back_to_name() {
        let lib = Stdlib::assemble(Arc::new(NullDirectory)).unwrap();
        let ctx = TemplateContext::new().with("Name", "Ghost");
        assert_eq!(lib.registry().render("ac:link:user", &ctx).unwrap(), "Ghost");
    }

    #[test]
    fn test_link_user_lookup_error_falls_back() {
        let failing = |name: &str| -> std::result::Result<Option<Identity>, LookupError> {
            Err(LookupError::Failed {
                name: name.to_string(),
                message: "directory offline".to_string(),
            })
        };
        let lib = Stdlib::assemble(Arc::new(failing)).unwrap();
        let ctx = TemplateContext::new().with("Name", "alice");

        let (rendered, logs) =
            with_captured_logs(|| lib.registry().render("ac:link:user", &ctx));
        assert_eq!(rendered.unwrap(), "alice");
        assert!(logs.contains("WARN"), "logs: {logs}");
        assert!(logs.contains("user lookup failed"), "logs: {logs}");
        assert!(logs.contains("directory offline"), "logs: {logs}");
    }

    #[test]
    fn test_link_user_not_found_is_not_a_warning() {
        let lib = stdlib();
        let ctx = TemplateContext::new().with("Name", "Ghost");

        let (rendered, logs) =
            with_captured_logs(|| lib.registry().render("ac:link:user", &ctx));
        assert_eq!(rendered.unwrap(), "Ghost");
        assert!(logs.contains("user not found in directory"), "logs: {logs}");
        assert!(!logs.contains("WARN"), "logs: {logs}");
    }

    #[test]
    fn test_status_defaults() {
        let out = stdlib()
            .registry()
            .render("ac:status", &TemplateContext::new())
            .unwrap();
        assert_eq!(
            out,
            concat!(
                r#"<ac:structured-macro ac:name="status">"#,
                r#"<ac:parameter ac:name="colour">Grey</ac:parameter>"#,
                r#"<ac:parameter ac:name="title"></ac:parameter>"#,
                r#"<ac:parameter ac:name="subtle">false</ac:parameter>"#,
                "</ac:structured-macro>",
            )
        );
    }

    #[test]
    fn test_code_escapes_cdata_end() {
        let ctx = TemplateContext::new()
            .with("Language", "xml")
            .with("Text", "<a><![CDATA[x]]></a>");
        let out = stdlib().registry().render("ac:code", &ctx).unwrap();
        insta::assert_snapshot!(out.trim_end(), @r#"
        <ac:structured-macro ac:name="code">
        <ac:parameter ac:name="language">xml</ac:parameter>
        <ac:parameter ac:name="collapse">false</ac:parameter>
        <ac:plain-text-body><![CDATA[<a><![CDATA[x]]]]><![CDATA[></a>]]></ac:plain-text-body>
        </ac:structured-macro>
        "#);
    }

    #[test]
    fn test_code_collapsed_with_title() {
        let ctx = TemplateContext::new()
            .with("Language", "sh")
            .with("Text", "ls")
            .with("Collapse", true)
            .with("Title", "Listing");
        let out = stdlib().registry().render("ac:code", &ctx).unwrap();
        assert!(out.starts_with(
            "<ac:structured-macro ac:name=\"expand\">\n<ac:parameter ac:name=\"title\">Listing</ac:parameter>\n<ac:rich-text-body>\n"
        ));
        assert!(out.contains("<ac:parameter ac:name=\"collapse\">true</ac:parameter>\n"));
        assert!(out.ends_with("</ac:rich-text-body>\n</ac:structured-macro>\n"));
    }

    #[test]
    fn test_code_requires_text() {
        let ctx = TemplateContext::new().with("Language", "sh");
        assert!(stdlib().registry().render("ac:code", &ctx).is_err());
    }

    #[test]
    fn test_layout() {
        let lib = stdlib();
        let plain = TemplateContext::new().with("Body", "<p>x</p>");
        assert_eq!(lib.registry().render("ac:layout", &plain).unwrap(), "<p>x</p>");

        let article = plain.clone().with("Layout", "article");
        assert!(
            lib.registry()
                .render("ac:layout", &article)
                .unwrap()
                .starts_with("<ac:layout><ac:layout-section ac:type=\"two_right_sidebar\"><ac:layout-cell><p>x</p>")
        );
    }

    #[test]
    fn test_toc_defaults() {
        let out = stdlib()
            .registry()
            .render("ac:toc", &TemplateContext::new().with("MaxLevel", "3"))
            .unwrap();
        insta::assert_snapshot!(out.trim_end(), @r#"
        <ac:structured-macro ac:name="toc">
        <ac:parameter ac:name="printable">true</ac:parameter>
        <ac:parameter ac:name="style">disc</ac:parameter>
        <ac:parameter ac:name="maxLevel">3</ac:parameter>
        <ac:parameter ac:name="indent"></ac:parameter>
        <ac:parameter ac:name="minLevel">1</ac:parameter>
        <ac:parameter ac:name="exclude"></ac:parameter>
        <ac:parameter ac:name="type">list</ac:parameter>
        <ac:parameter ac:name="outline">clear</ac:parameter>
        <ac:parameter ac:name="include"></ac:parameter>
        </ac:structured-macro>
        "#);
    }

    #[test]
    fn test_box_and_emoticon() {
        let lib = stdlib();
        let ctx = TemplateContext::new().with("Name", "info").with("Body", "Hi");
        let out = lib.registry().render("ac:box", &ctx).unwrap();
        assert!(out.contains("<ac:parameter ac:name=\"icon\">false</ac:parameter>\n"));
        assert!(out.contains("<ac:parameter ac:name=\"title\"></ac:parameter>\n"));

        let ctx = TemplateContext::new().with("Name", "smile");
        assert_eq!(
            lib.registry().render("ac:emoticon", &ctx).unwrap(),
            r#"<ac:emoticon ac:name="smile"/>"#
        );
    }

    #[test]
    fn test_escape_cdata() {
        assert_eq!(escape_cdata("a]]>b]]>"), "a]]]]><![CDATA[>b]]]]><![CDATA[>");
        assert_eq!(escape_cdata("plain"), "plain");
    }
}
