//! Domain errors raised while validating a configuration or running a build
//!
//! Plumbing failures (reading files, parsing TOML) travel as `anyhow` errors
//! with context attached. The variants here are the ones callers are expected
//! to match on, so they are raised as `BundleError` and can be recovered with
//! `anyhow::Error::downcast_ref`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("context directory does not exist: {}", .0.display())]
    ContextNotFound(PathBuf),

    #[error("at least one entry must be declared under [entry]")]
    NoEntries,

    #[error("entry '{0}' lists no modules")]
    EmptyEntry(String),

    #[error("entry '{name}' points to a missing module: {}", .path.display())]
    EntryNotFound { name: String, path: PathBuf },

    #[error("external '{request}' needs a non-empty request and global name, got '{global}'")]
    InvalidExternal { request: String, global: String },

    #[error("cannot resolve '{request}' from {}", .importer.display())]
    ModuleNotFound { request: String, importer: PathBuf },

    #[error("invalid {field} pattern in rule #{rule}: {message}")]
    InvalidPattern {
        rule: usize,
        field: &'static str,
        message: String,
    },

    #[error("unknown loader '{loader}' in rule #{rule}")]
    UnknownLoader { rule: usize, loader: String },

    #[error("invalid options for loader in rule #{rule}: {message}")]
    InvalidLoaderOptions { rule: usize, message: String },

    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),

    #[error("invalid options for plugin '{plugin}': {message}")]
    InvalidPluginOptions { plugin: String, message: String },

    #[error("only one shared-chunk policy may be active per build, found {0}")]
    MultipleSharedChunkPolicies(usize),

    #[error("invalid filename template '{template}': {message}")]
    InvalidFilenameTemplate { template: String, message: String },

    #[error("chunks '{first}' and '{second}' would both be written to {filename}")]
    FilenameConflict {
        filename: String,
        first: String,
        second: String,
    },

    #[error("loader '{loader}' failed on {}: {message}", .path.display())]
    Loader {
        loader: String,
        path: PathBuf,
        message: String,
    },
}
