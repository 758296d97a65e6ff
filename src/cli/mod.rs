//! Command-line interface for Packwright
//!
//! Provides the main CLI structure using clap with subcommands for:
//! - `build`: Build the bundles once
//! - `watch`: Rebuild on file changes
//! - `check`: Validate the configuration
//! - `init`: Project scaffolding

mod build;
mod check;
mod init;
mod watch;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

pub use build::{BuildCommand, BuildOptions};
pub use check::CheckCommand;
pub use init::InitCommand;
pub use watch::WatchCommand;

/// Packwright - a content-hashing JavaScript bundler
#[derive(Parser, Debug)]
#[command(name = "packwright")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to packwright.toml config file
    #[arg(
        short,
        long,
        global = true,
        env = "PACKWRIGHT_CONFIG",
        default_value = crate::config::CONFIG_FILE
    )]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the project
    Build(BuildCommand),

    /// Build, then rebuild whenever sources change
    Watch(WatchCommand),

    /// Validate the configuration and print what it resolves to
    Check(CheckCommand),

    /// Initialize a new project
    Init(InitCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        print_banner();

        match &self.command {
            Commands::Build(cmd) => cmd.execute(&self.config).await,
            Commands::Watch(cmd) => cmd.execute(&self.config).await,
            Commands::Check(cmd) => cmd.execute(&self.config).await,
            Commands::Init(cmd) => cmd.execute().await,
        }
    }
}

/// Print the Packwright banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "📦".cyan(),
        "Packwright".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
