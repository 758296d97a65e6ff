//! Check command implementation

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::{info, warn};

use crate::bundler::FilenameTemplate;
use crate::config::Config;
use crate::plugins;
use crate::transform::RuleSet;
use crate::utils::module_id;

/// Validate the configuration without building
#[derive(Args, Debug)]
pub struct CheckCommand {}

impl CheckCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        info!("Checking configuration {}", config_path);
        let config = Config::load(config_path)?;

        eprintln!("{} Entries", "→".blue());
        for (name, paths) in config.resolved_entries()? {
            let modules: Vec<String> = paths
                .iter()
                .map(|path| module_id(path, &config.context_dir))
                .collect();
            eprintln!("  {} {} {}", "•".dimmed(), name.cyan(), modules.join(", "));
        }

        let rules = RuleSet::from_config(&config.module.rules)?;
        eprintln!("\n{} Rules", "→".blue());
        if rules.is_empty() {
            eprintln!("  {} none, sources pass through", "•".dimmed());
        }
        for (index, rule) in rules.iter().enumerate() {
            eprintln!(
                "  {} #{} {} {}",
                "•".dimmed(),
                index,
                rule.test.as_str().yellow(),
                rule.loader.name().cyan()
            );
        }

        let plugins = plugins::from_config(&config.plugins)?;
        eprintln!("\n{} Plugins", "→".blue());
        for plugin in &plugins {
            eprintln!("  {} {}", "•".dimmed(), plugin.name().cyan());
        }

        eprintln!(
            "\n  {} output: {} ({})",
            "•".dimmed(),
            config.output_dir().display(),
            config.output.filename
        );
        let template = FilenameTemplate::parse(&config.output.filename)?;
        if !template.uses_chunk_hash() {
            warn!(
                "output.filename '{}' has no [chunkhash]; filenames will not follow content changes",
                template.as_str()
            );
        }
        eprintln!(
            "  {} extensions: {:?}",
            "•".dimmed(),
            config.resolve.extensions
        );

        eprintln!("\n{} Configuration is valid\n", "✓".green().bold());

        Ok(())
    }
}
