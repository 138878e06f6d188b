/*
 * pipeline.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Per-document processing.
 */

//! Per-document pipeline.
//!
//! ## Stages
//!
//! 1. **Metadata**: leading page headers are split off ([`extract_meta`])
//! 2. **Includes**: `Include:` directives are resolved to a fixed point in a
//!    private overlay of the standard registry
//! 3. **Extraction**: macro declarations are compiled and removed
//! 4. **Expansion**: document macros, then standard macros, are applied until
//!    the text stops changing
//! 5. **Layout**: the result is wrapped with `ac:layout`
//!
//! Stages 2 to 4 are [`Pipeline::extract_and_expand`]; all five are
//! [`Pipeline::compile_page`]. A pipeline holds only read-only state and can
//! process any number of documents.

use std::sync::Arc;

use tracing::{debug, info};
use wikimark_macro::{Expander, extract};
use wikimark_template::{TemplateContext, TemplateRegistry};

use crate::Result;
use crate::config::Config;
use crate::include::{FileSystemSource, NullSource, TemplateSource, resolve_includes};
use crate::meta::{PageMeta, extract_meta};
use crate::stdlib::Stdlib;

/// A compiled document.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPage {
    pub meta: Option<PageMeta>,
    /// Storage-format markup wrapped in the page layout.
    pub body: String,
}

pub struct Pipeline {
    stdlib: Arc<Stdlib>,
    source: Arc<dyn TemplateSource>,
    expander: Expander,
}

impl Pipeline {
    /// A pipeline without an include source; any `Include:` directive fails.
    pub fn new(stdlib: Stdlib) -> Self {
        Self {
            stdlib: Arc::new(stdlib),
            source: Arc::new(NullSource),
            expander: Expander::new(),
        }
    }

    /// Build the standard library and pipeline described by `config`.
    ///
    /// Includes are read relative to `templates_dir`, or the working
    /// directory when it is not set.
    pub fn from_config(config: &Config) -> Result<Self> {
        let stdlib = Stdlib::assemble(config.directory())?;
        let root = config
            .templates_dir
            .clone()
            .unwrap_or_else(|| ".".into());
        Ok(Self::new(stdlib)
            .with_source(FileSystemSource::new(root))
            .with_expander(Expander::new().with_max_sweeps(config.max_sweeps)))
    }

    pub fn with_source(mut self, source: impl TemplateSource + 'static) -> Self {
        self.source = Arc::new(source);
        self
    }

    pub fn with_expander(mut self, expander: Expander) -> Self {
        self.expander = expander;
        self
    }

    pub fn stdlib(&self) -> &Stdlib {
        &self.stdlib
    }

    /// Expand a document into storage-format markup.
    pub fn extract_and_expand(&self, text: &str) -> Result<String> {
        let (text, _) = self.expand_document(text)?;
        Ok(text)
    }

    /// Compile a whole page: metadata, expansion and layout.
    pub fn compile_page(&self, text: &str) -> Result<CompiledPage> {
        let (meta, body) = extract_meta(text);
        let (body, registry) = self.expand_document(body)?;

        let layout = meta.as_ref().map_or("", |m| m.layout.as_str());
        let context = TemplateContext::new()
            .with("Layout", layout)
            .with("Body", body);
        let body = registry.render("ac:layout", &context)?;

        info!(
            title = meta.as_ref().map_or("", |m| m.title.as_str()),
            bytes = body.len(),
            "compiled page"
        );
        Ok(CompiledPage { meta, body })
    }

    /// Run includes, extraction and expansion, returning the output and the
    /// document's registry.
    fn expand_document(&self, text: &str) -> Result<(String, TemplateRegistry)> {
        let mut registry = TemplateRegistry::overlay(self.stdlib.registry());
        let text = resolve_includes(text, &mut registry, self.source.as_ref())?;

        let (document_macros, text) = extract(&text)?;
        debug!(
            document = document_macros.len(),
            standard = self.stdlib.macros().len(),
            "expanding macros"
        );
        let macros = document_macros.then(self.stdlib.macros());

        let output = self.expander.expand(&text, &macros, &registry)?;
        Ok((output, registry))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stdlib", &self.stdlib)
            .field("expander", &self.expander)
            .finish_non_exhaustive()
    }
}
