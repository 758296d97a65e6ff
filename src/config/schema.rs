//! Configuration schema definitions

use serde::{Deserialize, Serialize};

/// One entry point: a single module or a list executed in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryValue {
    Single(String),
    Multiple(Vec<String>),
}

impl EntryValue {
    /// Module paths declared for this entry, in declared order
    pub fn paths(&self) -> Vec<&str> {
        match self {
            EntryValue::Single(path) => vec![path.as_str()],
            EntryValue::Multiple(paths) => paths.iter().map(String::as_str).collect(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory, relative to the config file
    #[serde(default = "default_output_path")]
    pub path: String,

    /// Bundle filename template
    #[serde(default = "default_filename")]
    pub filename: String,

    /// Write manifest.json next to the bundles
    #[serde(default = "default_true")]
    pub manifest: bool,

    /// Remove previous output before writing
    #[serde(default)]
    pub clean: bool,

    /// Globs (relative to the output directory) that survive a clean
    #[serde(default)]
    pub keep: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            filename: default_filename(),
            manifest: true,
            clean: false,
            keep: Vec::new(),
        }
    }
}

fn default_output_path() -> String {
    "dist".to_string()
}

fn default_filename() -> String {
    "[name].bundle.[chunkhash].js".to_string()
}

fn default_true() -> bool {
    true
}

/// Module transform settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Ordered transform rules
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// A single transform rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Regex the module path must match
    pub test: String,

    /// Regex the module path must also match, if set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,

    /// Regex that disqualifies a module path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,

    /// Loader name
    pub loader: String,

    /// Loader-specific options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<toml::Table>,
}

/// Module resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// Suffixes tried, in order, when resolving a request
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec![String::new(), ".js".to_string(), ".json".to_string()]
}

/// Watch mode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Globs ignored by the watcher
    #[serde(default = "default_watch_ignore")]
    pub ignore: Vec<String>,

    /// Debounce window in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            ignore: default_watch_ignore(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_watch_ignore() -> Vec<String> {
    vec!["**/node_modules/**".to_string(), "**/.git/**".to_string()]
}

fn default_debounce_ms() -> u64 {
    100
}

/// Plugin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Plugin name/identifier
    pub name: String,

    /// Plugin-specific options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<toml::Table>,
}
