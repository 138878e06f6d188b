/*
 * main.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! wikimark CLI - Main entry point

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod compile;

#[derive(Parser)]
#[command(name = "wikimark")]
#[command(version)]
#[command(about = "Compile extended markdown into wiki storage format", long_about = None)]
struct Cli {
    /// Markdown file to compile (reads stdin when omitted)
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Configuration file (defaults to $HOME/.config/wikimark.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory that `Include:` paths are resolved against
    #[arg(long)]
    templates: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Enable trace logging
    #[arg(long, conflicts_with = "debug")]
    trace: bool,
}

fn log_filter(cli: &Cli) -> EnvFilter {
    if cli.trace {
        return EnvFilter::new("wikimark=trace");
    }
    if cli.debug {
        return EnvFilter::new("wikimark=debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| "wikimark=info".into())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the compiled page.
    tracing_subscriber::registry()
        .with(log_filter(&cli))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    compile::execute(compile::CompileArgs {
        file: cli.file,
        config: cli.config,
        templates: cli.templates,
    })
}
