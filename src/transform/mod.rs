//! Code transformation
//!
//! Picks the transform rule for each module (first match wins) and runs the
//! loader it names. Modules that match no rule pass through unchanged.

mod jsx;
mod modules;

use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::config::RuleConfig;
use crate::error::BundleError;
use crate::utils::to_slash;

pub use jsx::{transform_jsx, JsxError};
pub use modules::lower_es_modules;

/// Options accepted by the babel loader
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BabelOptions {
    /// Function JSX elements are lowered to
    pub pragma: String,

    /// Expression used for `<>` fragments
    pub pragma_frag: String,

    /// Lower ES module syntax to CommonJS
    pub modules: bool,
}

impl Default for BabelOptions {
    fn default() -> Self {
        Self {
            pragma: "React.createElement".to_string(),
            pragma_frag: "React.Fragment".to_string(),
            modules: true,
        }
    }
}

/// The transform tools a rule can name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loader {
    /// JSX + ES module lowering
    Babel(BabelOptions),
    /// JSON document exported as a module
    Json,
    /// File content exported as a string
    Raw,
    /// CSS injected into the document
    Style,
}

impl Loader {
    /// Build a loader from its configured name; `-loader` suffixes are accepted
    fn from_config(rule: usize, name: &str, options: Option<&toml::Table>) -> Result<Self> {
        let loader = match name.trim_end_matches("-loader") {
            "babel" => {
                let options = match options {
                    Some(table) => toml::Value::Table(table.clone())
                        .try_into::<BabelOptions>()
                        .map_err(|e| BundleError::InvalidLoaderOptions {
                            rule,
                            message: e.to_string(),
                        })?,
                    None => BabelOptions::default(),
                };
                Loader::Babel(options)
            }
            "json" => Loader::Json,
            "raw" => Loader::Raw,
            "style" => Loader::Style,
            _ => {
                return Err(BundleError::UnknownLoader {
                    rule,
                    loader: name.to_string(),
                }
                .into())
            }
        };

        Ok(loader)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Loader::Babel(_) => "babel",
            Loader::Json => "json",
            Loader::Raw => "raw",
            Loader::Style => "style",
        }
    }

    /// Run the loader over one module's source
    pub fn run(&self, source: &str, path: &Path) -> Result<String> {
        let failed = |message: String| BundleError::Loader {
            loader: self.name().to_string(),
            path: path.to_path_buf(),
            message,
        };

        match self {
            Loader::Babel(options) => {
                let code = transform_jsx(source, &options.pragma, &options.pragma_frag)
                    .map_err(|e| failed(e.to_string()))?;

                if options.modules {
                    Ok(lower_es_modules(&code))
                } else {
                    Ok(code)
                }
            }
            Loader::Json => {
                serde_json::from_str::<serde_json::Value>(source)
                    .map_err(|e| failed(e.to_string()))?;
                Ok(format!("module.exports = {};", source.trim()))
            }
            Loader::Raw => Ok(format!("module.exports = {};", serde_json::to_string(source)?)),
            Loader::Style => Ok(format!(
                r#"(function() {{
  var style = document.createElement('style');
  style.textContent = {};
  document.head.appendChild(style);
}})();
module.exports = {{}};
"#,
                serde_json::to_string(source)?
            )),
        }
    }
}

/// A compiled transform rule
#[derive(Debug, Clone)]
pub struct Rule {
    pub test: Regex,
    pub include: Option<Regex>,
    pub exclude: Option<Regex>,
    pub loader: Loader,
}

impl Rule {
    /// Whether this rule governs the (slash-separated, absolute) path
    pub fn matches(&self, path: &str) -> bool {
        self.test.is_match(path)
            && self.include.as_ref().map_or(true, |re| re.is_match(path))
            && !self.exclude.as_ref().is_some_and(|re| re.is_match(path))
    }
}

/// Ordered transform rules
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compile rules, rejecting bad patterns and unknown loaders
    pub fn from_config(rules: &[RuleConfig]) -> Result<Self> {
        let compile = |index: usize, field: &'static str, pattern: &str| {
            Regex::new(pattern).map_err(|e| BundleError::InvalidPattern {
                rule: index,
                field,
                message: e.to_string(),
            })
        };

        let rules = rules
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                Ok(Rule {
                    test: compile(index, "test", &rule.test)?,
                    include: rule
                        .include
                        .as_deref()
                        .map(|p| compile(index, "include", p))
                        .transpose()?,
                    exclude: rule
                        .exclude
                        .as_deref()
                        .map(|p| compile(index, "exclude", p))
                        .transpose()?,
                    loader: Loader::from_config(index, &rule.loader, rule.options.as_ref())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// First rule that governs `path`, with its index
    pub fn select(&self, path: &Path) -> Option<(usize, &Rule)> {
        let path = to_slash(path);
        self.rules.iter().enumerate().find(|(_, rule)| rule.matches(&path))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }
}

/// Result of transforming one module
#[derive(Debug, Clone)]
pub struct Transformed {
    pub code: String,
    /// Index of the rule that applied, if any
    pub rule: Option<usize>,
}

/// Applies the rule set to module sources
pub struct Transformer {
    rules: RuleSet,
}

impl Transformer {
    /// Create a new transformer
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    /// Transform source code with the first matching rule's loader
    pub fn transform(&self, source: &str, path: &Path) -> Result<Transformed> {
        match self.rules.select(path) {
            Some((index, rule)) => {
                debug!(
                    "Rule #{} ({}) applies to {}",
                    index,
                    rule.loader.name(),
                    path.display()
                );
                let code = rule
                    .loader
                    .run(source, path)
                    .with_context(|| format!("Failed to transform {}", path.display()))?;

                Ok(Transformed {
                    code,
                    rule: Some(index),
                })
            }
            None => {
                debug!("No rule for {}, passing through", path.display());
                Ok(Transformed {
                    code: source.to_string(),
                    rule: None,
                })
            }
        }
    }
}
