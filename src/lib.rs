//! Packwright library
//!
//! Loads a bundler configuration (entries, output naming, transform rules,
//! plugins, resolve extensions), builds the module graph and writes
//! content-hashed bundles.

pub mod bundler;
pub mod cli;
pub mod config;
pub mod error;
pub mod plugins;
pub mod resolver;
pub mod transform;
pub mod utils;

pub use bundler::{BuildResult, Bundler};
pub use cli::{BuildOptions, Cli};
pub use config::Config;
pub use error::BundleError;
