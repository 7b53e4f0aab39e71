use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths::{self, Paths};
use crate::sandbox::{DEFAULT_MAX_SYMLINKS, Resolver};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// File this config was loaded from (not serialized)
    #[serde(skip)]
    pub path: PathBuf,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Directories writes are confined to. `~` is expanded.
    #[serde(default)]
    pub roots: Vec<String>,

    /// Symlinks followed per resolution before giving up (default: 40)
    #[serde(default = "default_max_symlink_hops")]
    pub max_symlink_hops: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "text" (default) or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_max_symlink_hops() -> u32 {
    DEFAULT_MAX_SYMLINKS
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            max_symlink_hops: default_max_symlink_hops(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load from `explicit` if given, else from the XDG config file.
    ///
    /// A missing default file yields the built-in defaults; a missing
    /// explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !path.exists() {
            if explicit.is_some() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Ok(Config {
                path,
                ..Config::default()
            });
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.path = path;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        paths::ensure_parent_dir(&self.path)?;

        let content = toml::to_string_pretty(self)?;
        fs::write(&self.path, content)?;

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let paths = Paths::resolve()?;
        Ok(paths.config_file())
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["sandbox", "roots"] => Ok(self.sandbox.roots.join(",")),
            ["sandbox", "max_symlink_hops"] => Ok(self.sandbox.max_symlink_hops.to_string()),
            ["logging", "level"] => Ok(self.logging.level.clone()),
            ["logging", "format"] => Ok(self.logging.format.clone()),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["sandbox", "roots"] => {
                self.sandbox.roots = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }
            ["sandbox", "max_symlink_hops"] => self.sandbox.max_symlink_hops = value.parse()?,
            ["logging", "level"] => self.logging.level = value.to_string(),
            ["logging", "format"] => match value {
                "text" | "json" => self.logging.format = value.to_string(),
                _ => anyhow::bail!("logging.format must be \"text\" or \"json\", got {:?}", value),
            },
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        Ok(())
    }

    /// Configured roots with `~` expanded.
    pub fn sandbox_roots(&self) -> Vec<PathBuf> {
        self.sandbox
            .roots
            .iter()
            .map(|r| PathBuf::from(shellexpand::tilde(r).to_string()))
            .collect()
    }

    pub fn resolver(&self) -> Resolver {
        Resolver::with_max_symlinks(self.sandbox.max_symlink_hops)
    }
}

/// Default config template with comments (written by `config init`)
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# sandboxfs configuration

[sandbox]
# Directories that writes, creates and removals are confined to.
# Paths are resolved (symlinks followed) when the sandbox is enabled.
# roots = ["~/sandbox", "/tmp/scratch"]
roots = []

# Symlinks followed per path before resolution fails as a loop.
max_symlink_hops = 40

[logging]
# Overridden by RUST_LOG or --verbose
level = "info"
# "text" or "json"
format = "text"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_to_defaults() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert!(config.sandbox.roots.is_empty());
        assert_eq!(config.sandbox.max_symlink_hops, DEFAULT_MAX_SYMLINKS);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.sandbox.max_symlink_hops, 40);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn load_and_save_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            "[sandbox]\nroots = [\"/srv/box\"]\nmax_symlink_hops = 8\n",
        )
        .unwrap();

        let mut config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.sandbox.roots, vec!["/srv/box"]);
        assert_eq!(config.resolver().max_symlinks(), 8);

        config.set_value("logging.level", "debug").unwrap();
        config.save().unwrap();

        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded.logging.level, "debug");
        assert_eq!(reloaded.sandbox.roots, vec!["/srv/box"]);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&tmp.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn get_and_set_values() {
        let mut config = Config::default();
        config.set_value("sandbox.roots", "/a, /b,").unwrap();
        assert_eq!(config.sandbox.roots, vec!["/a", "/b"]);
        assert_eq!(config.get_value("sandbox.roots").unwrap(), "/a,/b");

        config.set_value("sandbox.max_symlink_hops", "12").unwrap();
        assert_eq!(config.get_value("sandbox.max_symlink_hops").unwrap(), "12");

        assert!(config.set_value("sandbox.max_symlink_hops", "many").is_err());
        assert!(config.get_value("nope.key").is_err());

        config.set_value("logging.format", "json").unwrap();
        assert!(config.set_value("logging.format", "xml").is_err());
        assert_eq!(config.get_value("logging.format").unwrap(), "json");
    }

    #[test]
    fn roots_expand_tilde() {
        let mut config = Config::default();
        config.sandbox.roots = vec!["~/box".to_string(), "/abs".to_string()];
        let roots = config.sandbox_roots();
        if std::env::var_os("HOME").is_some() {
            assert!(!roots[0].starts_with("~"));
        }
        assert_eq!(roots[1], PathBuf::from("/abs"));
    }
}
