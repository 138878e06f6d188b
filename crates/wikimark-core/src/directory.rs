/*
 * directory.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Person directory used by the `user` template helper.
 */

//! Directory lookup.
//!
//! Templates resolve people by name through a [`DirectoryLookup`]. Lookups
//! may fail or be slow; [`TimeoutLookup::bounded`] puts a timeout on the ones
//! that can block, and the `user` helper turns any failure into a no-value
//! result.

use std::collections::BTreeMap;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::trace;
use wikimark_template::TemplateValue;

/// A resolved person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub account_id: String,
    pub name: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            name: name.into(),
        }
    }

    /// The identity as seen by templates: `.AccountID` and `.Name`.
    pub fn to_value(&self) -> TemplateValue {
        TemplateValue::Map(BTreeMap::from([
            ("AccountID".to_string(), TemplateValue::from(self.account_id.as_str())),
            ("Name".to_string(), TemplateValue::from(self.name.as_str())),
        ]))
    }
}

#[derive(Debug, Clone, Error)]
pub enum LookupError {
    #[error("lookup of '{name}' timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("lookup of '{name}' failed: {message}")]
    Failed { name: String, message: String },
}

/// Resolves a person's name to an [`Identity`].
///
/// `Ok(None)` means the directory has no such person.
pub trait DirectoryLookup: Send + Sync {
    fn lookup(&self, name: &str) -> Result<Option<Identity>, LookupError>;

    /// Whether a call can wait on something outside the process.
    fn is_blocking(&self) -> bool {
        true
    }
}

impl<F> DirectoryLookup for F
where
    F: Fn(&str) -> Result<Option<Identity>, LookupError> + Send + Sync,
{
    fn lookup(&self, name: &str) -> Result<Option<Identity>, LookupError> {
        self(name)
    }
}

/// An in-memory directory of name to account id.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    accounts: BTreeMap<String, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, name: impl Into<String>, account_id: impl Into<String>) -> Self {
        self.accounts.insert(name.into(), account_id.into());
        self
    }
}

impl From<BTreeMap<String, String>> for StaticDirectory {
    fn from(accounts: BTreeMap<String, String>) -> Self {
        Self { accounts }
    }
}

impl DirectoryLookup for StaticDirectory {
    fn lookup(&self, name: &str) -> Result<Option<Identity>, LookupError> {
        Ok(self
            .accounts
            .get(name)
            .map(|account_id| Identity::new(name, account_id.as_str())))
    }

    fn is_blocking(&self) -> bool {
        false
    }
}

/// A directory that knows nobody.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDirectory;

impl DirectoryLookup for NullDirectory {
    fn lookup(&self, _name: &str) -> Result<Option<Identity>, LookupError> {
        Ok(None)
    }

    fn is_blocking(&self) -> bool {
        false
    }
}

/// Bounds another lookup by a timeout.
///
/// The inner lookup runs on a worker thread. When it does not answer in
/// time the caller gets [`LookupError::Timeout`] and the worker is left to
/// finish on its own.
#[derive(Clone)]
pub struct TimeoutLookup {
    inner: Arc<dyn DirectoryLookup>,
    timeout: Duration,
}

impl TimeoutLookup {
    pub fn new(inner: Arc<dyn DirectoryLookup>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Wrap `inner` only if it is blocking; in-memory lookups run on the
    /// calling thread.
    pub fn bounded(inner: Arc<dyn DirectoryLookup>, timeout: Duration) -> Arc<dyn DirectoryLookup> {
        if inner.is_blocking() {
            Arc::new(Self::new(inner, timeout))
        } else {
            inner
        }
    }
}

impl std::fmt::Debug for TimeoutLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutLookup")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DirectoryLookup for TimeoutLookup {
    fn lookup(&self, name: &str) -> Result<Option<Identity>, LookupError> {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let owned = name.to_string();

        thread::Builder::new()
            .name("directory-lookup".to_string())
            .spawn(move || {
                // The receiver is gone if the caller already timed out.
                let _ = tx.send(inner.lookup(&owned));
            })
            .map_err(|e| LookupError::Failed {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                trace!(name, timeout = ?self.timeout, "directory lookup timed out");
                Err(LookupError::Timeout {
                    name: name.to_string(),
                    timeout: self.timeout,
                })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(LookupError::Failed {
                name: name.to_string(),
                message: "lookup worker exited without an answer".to_string(),
            }),
        }
    }

    fn is_blocking(&self) -> bool {
        false
    }
}
