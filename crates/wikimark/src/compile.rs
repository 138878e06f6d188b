/*
 * compile.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Compile-only output.
 */

//! Compile a document and print its storage-format markup.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use wikimark_core::{Config, Pipeline};

/// Arguments for compiling one document
#[derive(Debug)]
pub struct CompileArgs {
    /// Input file; stdin when `None`
    pub file: Option<PathBuf>,
    /// Explicit configuration file
    pub config: Option<PathBuf>,
    /// Overrides `templates_dir` from the configuration
    pub templates: Option<PathBuf>,
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read standard input")?;
            Ok(text)
        }
    }
}

/// Execute the compile command
pub fn execute(args: CompileArgs) -> Result<()> {
    let mut config =
        Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(templates) = args.templates {
        config.templates_dir = Some(templates);
    }
    debug!(?config, "configuration loaded");

    let input_name = args
        .file
        .as_deref()
        .map_or_else(|| "<stdin>".to_string(), |p| p.display().to_string());
    let text = read_input(args.file.as_deref())?;

    let pipeline =
        Pipeline::from_config(&config).context("Failed to assemble the standard library")?;
    let page = pipeline
        .compile_page(&text)
        .with_context(|| format!("Failed to compile {}", input_name))?;

    info!(input = %input_name, "compiled");
    println!("{}", page.body);
    Ok(())
}
