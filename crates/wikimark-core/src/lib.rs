/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Core of wikimark: the standard template library, the collaborators it
//! talks to (directory lookup, include sources, configuration), and the
//! per-document pipeline that turns extended markdown into storage format.

pub mod config;
pub mod directory;
pub mod error;
pub mod include;
pub mod meta;
pub mod pipeline;
pub mod stdlib;

pub use config::Config;
pub use directory::{
    DirectoryLookup, Identity, LookupError, NullDirectory, StaticDirectory, TimeoutLookup,
};
pub use error::{CoreError, Result};
pub use include::{
    FileSystemSource, MAX_INCLUDE_PASSES, MemorySource, NullSource, TemplateSource,
    process_includes, resolve_includes,
};
pub use meta::{PageMeta, extract_meta};
pub use pipeline::{CompiledPage, Pipeline};
pub use stdlib::Stdlib;
