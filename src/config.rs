//! Configuration file and credential handling.
//!
//! Config lives at `<config dir>/komplete/config.toml`. The `config`
//! subcommand exposes a flat key/value view over an allowed key set; the rest
//! of the crate reads the typed struct.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

pub const ALLOWED_KEYS: &[&str] = &["model", "groq_model", "shell", "timeout", "cwd"];

pub const API_KEY_ENV: &str = "GROQ_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model for plan generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Model for inline suggestions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groq_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    /// Plan request timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Stored credential; environment takes precedence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groq_api_key: Option<String>,
}

impl Config {
    pub fn path() -> Result<PathBuf> {
        let dir = dirs::config_dir().context("no user config directory")?;
        Ok(dir.join("komplete").join("config.toml"))
    }

    /// Load the config, treating a missing file as empty.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("read config {}", path.display()))
            }
        };
        toml::from_str(&contents).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create config directory {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("serialize config")?;
        std::fs::write(path, contents).with_context(|| format!("write config {}", path.display()))
    }

    /// String view used by `config get`.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        if !ALLOWED_KEYS.contains(&key) {
            bail!("unknown key: {key}");
        }
        Ok(match key {
            "model" => self.model.clone(),
            "groq_model" => self.groq_model.clone(),
            "shell" => self.shell.clone(),
            "timeout" => self.timeout.map(|t| t.to_string()),
            "cwd" => self.cwd.clone(),
            _ => None,
        })
    }

    /// String view used by `config set`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if !ALLOWED_KEYS.contains(&key) {
            bail!("unknown key: {key}");
        }
        match key {
            "model" => self.model = Some(value.to_string()),
            "groq_model" => self.groq_model = Some(value.to_string()),
            "shell" => self.shell = Some(value.to_string()),
            "timeout" => {
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("timeout must be a number of seconds: {value}"))?;
                self.timeout = Some(secs);
            }
            "cwd" => self.cwd = Some(value.to_string()),
            _ => {}
        }
        Ok(())
    }
}

/// Resolve the completion API key: environment first, then the config file.
pub fn resolve_api_key(config: &Config) -> Result<Zeroizing<String>> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.is_empty() {
            return Ok(Zeroizing::new(key));
        }
    }
    if let Some(key) = &config.groq_api_key {
        if !key.is_empty() {
            return Ok(Zeroizing::new(key.clone()));
        }
    }
    bail!("{API_KEY_ENV} not set (export it or run `komplete config set`)");
}

/// Load a `.env`-style file into the process environment. Missing file is not
/// an error; malformed lines are skipped.
pub fn load_dotenv(path: &Path) {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return;
    };
    for line in contents.lines() {
        let mut line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("export ") {
            line = rest.trim();
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = strip_quotes(value.trim());
        if !key.is_empty() {
            std::env::set_var(key, value);
        }
    }
}

/// Export the config-stored API key when the environment does not already
/// have one, so child invocations inherit it.
pub fn load_api_keys_into_env() {
    if std::env::var(API_KEY_ENV).map(|v| !v.is_empty()).unwrap_or(false) {
        return;
    }
    let Ok(config) = Config::load() else {
        return;
    };
    if let Some(key) = config.groq_api_key {
        if !key.is_empty() {
            std::env::set_var(API_KEY_ENV, key);
        }
    }
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_default() {
        let cfg = Config::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert!(cfg.model.is_none());
        assert!(cfg.timeout.is_none());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.set("model", "qwen/qwen3-coder").unwrap();
        cfg.set("timeout", "30").unwrap();
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.model.as_deref(), Some("qwen/qwen3-coder"));
        assert_eq!(loaded.timeout, Some(30));
        assert_eq!(
            loaded.get("model").unwrap().as_deref(),
            Some("qwen/qwen3-coder")
        );
    }

    #[test]
    fn unknown_keys_rejected() {
        let mut cfg = Config::default();
        assert!(cfg.set("api_key", "oops").is_err());
        assert!(cfg.get("api_key").is_err());
    }

    #[test]
    fn timeout_must_be_numeric() {
        let mut cfg = Config::default();
        assert!(cfg.set("timeout", "fast").is_err());
    }

    #[test]
    fn dotenv_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "# comment\nexport FOO_TEST_KEY=\"quoted value\"\nBAR_TEST_KEY='single'\nmalformed line\n",
        )
        .unwrap();
        load_dotenv(&path);
        assert_eq!(std::env::var("FOO_TEST_KEY").unwrap(), "quoted value");
        assert_eq!(std::env::var("BAR_TEST_KEY").unwrap(), "single");
    }

    #[test]
    fn strip_quotes_variants() {
        assert_eq!(strip_quotes("\"a b\""), "a b");
        assert_eq!(strip_quotes("'a'"), "a");
        assert_eq!(strip_quotes("plain"), "plain");
        assert_eq!(strip_quotes("\"unbalanced'"), "\"unbalanced'");
    }
}
