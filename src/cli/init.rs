//! Project initialization command

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use crate::config::CONFIG_FILE;

/// Initialize a new project
#[derive(Args, Debug)]
pub struct InitCommand {
    /// Project directory
    #[arg(default_value = ".")]
    pub name: String,

    /// Overwrite an existing packwright.toml
    #[arg(short, long)]
    pub force: bool,
}

const CONFIG_TEMPLATE: &str = r#"# Packwright configuration

[entry]
app = "./src/index"
vendor = "./src/vendor"

[output]
path = "dist"
filename = "[name].bundle.[chunkhash].js"

# First matching rule wins
[[module.rules]]
test = '\.js$'
exclude = 'node_modules'
loader = "babel"

[[module.rules]]
test = '\.jsx$'
loader = "babel"

[[plugins]]
name = "commons-chunk"
options = { name = "vendor" }

[resolve]
extensions = ["", ".js", ".jsx"]
"#;

const INDEX_JS: &str = r#"import { greet } from './greeting';
import { format } from './vendor';

console.log(format(greet('world')));
"#;

const GREETING_JSX: &str = r#"export function greet(name) {
  return 'Hello, ' + name + '!';
}

export function Greeting(props) {
  return <p className="greeting">{greet(props.name)}</p>;
}
"#;

const VENDOR_JS: &str = r#"export function format(message) {
  return '[app] ' + message;
}
"#;

impl InitCommand {
    pub async fn execute(&self) -> Result<()> {
        let project_dir = Path::new(&self.name);

        eprintln!("{} Initializing new project...\n", "→".blue());

        // Create project directory if needed
        if self.name != "." {
            fs::create_dir_all(project_dir).context("Failed to create project directory")?;
        }

        let config_path = project_dir.join(CONFIG_FILE);
        if config_path.exists() && !self.force {
            bail!(
                "{} already exists (use --force to overwrite)",
                config_path.display()
            );
        }

        write_file(project_dir, CONFIG_FILE, CONFIG_TEMPLATE)?;

        let src_dir = project_dir.join("src");
        fs::create_dir_all(&src_dir).context("Failed to create src directory")?;

        write_file(project_dir, "src/index.js", INDEX_JS)?;
        write_file(project_dir, "src/greeting.jsx", GREETING_JSX)?;
        write_file(project_dir, "src/vendor.js", VENDOR_JS)?;

        eprintln!("\n{} Project initialized successfully!\n", "✓".green().bold());

        eprintln!("  Next steps:");
        if self.name != "." {
            eprintln!("    {} cd {}", "→".dimmed(), self.name.cyan());
        }
        eprintln!("    {} packwright build", "→".dimmed());
        eprintln!();

        Ok(())
    }
}

fn write_file(project_dir: &Path, relative: &str, content: &str) -> Result<()> {
    fs::write(project_dir.join(relative), content)
        .with_context(|| format!("Failed to write {relative}"))?;
    eprintln!("  {} Created {}", "✓".green(), relative.cyan());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_scaffold_is_valid_config() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("site");

        InitCommand {
            name: project.to_string_lossy().into_owned(),
            force: false,
        }
        .execute()
        .await
        .unwrap();

        let config = Config::load(project.join(CONFIG_FILE)).unwrap();
        assert_eq!(config.entry.len(), 2);
        assert_eq!(config.module.rules.len(), 2);
        assert_eq!(config.plugins[0].name, "commons-chunk");
    }

    #[tokio::test]
    async fn test_existing_config_not_overwritten() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "# mine").unwrap();

        let result = InitCommand {
            name: dir.path().to_string_lossy().into_owned(),
            force: false,
        }
        .execute()
        .await;

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap(), "# mine");
    }
}
