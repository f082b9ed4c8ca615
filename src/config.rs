use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    pub command: String,
    pub check_command: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DdupConfig {
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

pub fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ddup.yml")
}

/// Load the config from `~/.ddup.yml`. Never fails: a missing file yields the
/// empty config, and an unreadable or malformed file yields the empty config
/// plus a diagnostic line for the caller to surface.
pub fn load() -> (DdupConfig, Option<String>) {
    load_from(&config_path())
}

pub fn load_from(path: &Path) -> (DdupConfig, Option<String>) {
    if !path.exists() {
        return (DdupConfig::default(), None);
    }

    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            let diag = format!("Error loading config from {}: {e}", path.display());
            return (DdupConfig::default(), Some(diag));
        }
    };

    match serde_yaml::from_str::<DdupConfig>(&content) {
        Ok(mut cfg) => {
            cfg.tasks.retain(|t| !t.disabled);
            (cfg, None)
        }
        Err(e) => {
            let diag = format!("Error loading config from {}: {e}", path.display());
            (DdupConfig::default(), Some(diag))
        }
    }
}

pub fn example_config() -> &'static str {
    r#"# DDUP Configuration
# ~/.ddup.yml

tasks:
  - name: Homebrew
    command: brew update && brew upgrade && brew cleanup
    check_command: brew
    description: Update Homebrew packages

  - name: npm
    command: npm update -g
    check_command: npm
    disabled: true
    description: Update global npm packages

  - name: Rustup
    command: rustup update
    check_command: rustup
    disabled: true
    description: Update Rust toolchain

# Add more tasks as needed
# Format:
#   - name: Tool Name
#     command: update command
#     check_command: command to verify tool exists (optional)
#     disabled: true  # Optional, defaults to false (enabled)
#     description: What this does (optional)
"#
}

pub fn write_example_config() -> Result<PathBuf> {
    let path = config_path();
    fs::write(&path, example_config())
        .with_context(|| format!("writing config file to {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, diag) = load_from(&dir.path().join(".ddup.yml"));
        assert!(cfg.tasks.is_empty());
        assert!(diag.is_none());
    }

    #[test]
    fn disabled_tasks_are_filtered_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".ddup.yml");
        fs::write(
            &path,
            "tasks:\n  - name: one\n    command: echo one\n  - name: two\n    command: echo two\n    disabled: true\n",
        )
        .unwrap();

        let (cfg, diag) = load_from(&path);
        assert!(diag.is_none());
        assert_eq!(cfg.tasks.len(), 1);
        assert_eq!(cfg.tasks[0].name, "one");
    }

    #[test]
    fn malformed_yaml_degrades_to_empty_with_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".ddup.yml");
        fs::write(&path, "tasks: [not: {closed\n").unwrap();

        let (cfg, diag) = load_from(&path);
        assert!(cfg.tasks.is_empty());
        let diag = diag.unwrap();
        assert!(diag.contains(".ddup.yml"));
    }

    #[test]
    fn optional_fields_default_permissively() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".ddup.yml");
        fs::write(&path, "tasks:\n  - name: bare\n    command: \"true\"\n").unwrap();

        let (cfg, _) = load_from(&path);
        assert_eq!(cfg.tasks.len(), 1);
        let t = &cfg.tasks[0];
        assert!(t.check_command.is_none());
        assert!(t.description.is_none());
        assert!(!t.disabled);
    }

    #[test]
    fn example_config_parses_and_only_homebrew_is_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".ddup.yml");
        fs::write(&path, example_config()).unwrap();

        let (cfg, diag) = load_from(&path);
        assert!(diag.is_none());
        assert_eq!(cfg.tasks.len(), 1);
        assert_eq!(cfg.tasks[0].name, "Homebrew");
        assert_eq!(cfg.tasks[0].check_command.as_deref(), Some("brew"));
    }
}
