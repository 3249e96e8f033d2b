use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Expand environment variables and tilde in a string.
/// Supports: $HOME, ${VAR}, ~/path
fn expand(value: &str) -> String {
    shellexpand::full(value)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Allowed CORS origins. Empty disables CORS, "*" allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:9002".to_string(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Documents sampled per collection during introspection
    pub sample_size: u32,
    pub default_query_limit: u64,
    pub default_query_skip: u64,
    pub connect_timeout_secs: u64,
    pub server_selection_timeout_secs: u64,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            sample_size: 20,
            default_query_limit: 100,
            default_query_skip: 0,
            connect_timeout_secs: 10,
            server_selection_timeout_secs: 30,
        }
    }
}

impl ExplorerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn server_selection_timeout(&self) -> Duration {
        Duration::from_secs(self.server_selection_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub enabled: bool,
    pub max_clients: usize,
    pub idle_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_clients: 8,
            idle_timeout_secs: 300,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    pub base_url: String,
    pub model: String,
    /// Missing or empty disables the translator
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com/v1/".to_string(),
            model: "claude-3-5-haiku-latest".to_string(),
            api_key: None,
            timeout_secs: 60,
            max_tokens: 1024,
        }
    }
}

impl TranslatorConfig {
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

// Keeps the API key out of logs.
impl std::fmt::Debug for TranslatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslatorConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub explorer: ExplorerConfig,
    pub pool: PoolConfig,
    pub translator: TranslatorConfig,
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("Failed to get config directory")?
            .join("mongodb-explorer-rs"))
    }

    pub fn default_config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.yaml"))
    }

    /// Resolve the config file location. An explicit path has `~` and
    /// environment variables expanded.
    pub fn resolve_path(explicit: Option<&str>) -> Result<PathBuf> {
        match explicit {
            Some(path) => Ok(PathBuf::from(expand(path))),
            None => Self::default_config_file(),
        }
    }

    /// Load configuration. A missing default file yields the built-in
    /// defaults; a missing explicit file is an error.
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        let config_file = Self::resolve_path(explicit)?;

        if !config_file.exists() {
            if explicit.is_some() {
                bail!("Configuration file not found: {}", config_file.display());
            }
            tracing::info!(
                "No configuration file at {}, using defaults",
                config_file.display()
            );
            let mut config = Self::default();
            config.expand_values();
            config.validate()?;
            return Ok(config);
        }

        let content = fs::read_to_string(&config_file).context("Failed to read config file")?;
        let config = Self::from_yaml(&content)?;
        tracing::info!("Configuration loaded from {}", config_file.display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut config: Self =
            serde_yaml::from_str(content).context("Failed to parse config file")?;
        config.expand_values();
        config.validate()?;
        Ok(config)
    }

    /// Write an annotated example configuration, refusing to overwrite.
    pub fn write_example(config_file: &Path) -> Result<()> {
        if config_file.exists() {
            bail!(
                "Configuration file already exists: {}",
                config_file.display()
            );
        }
        if let Some(parent) = config_file.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let example_content = r"# mongodb-explorer-rs configuration

server:
  # Address the HTTP API listens on
  bind: 127.0.0.1:9002
  # Browser origins allowed to call the API. Use ['*'] to allow any origin.
  cors_origins: []

explorer:
  # Documents sampled per collection on /connect
  sample_size: 20
  # Defaults for /query when the request omits limit/skip
  default_query_limit: 100
  default_query_skip: 0
  connect_timeout_secs: 10
  server_selection_timeout_secs: 30

# Reuse one driver client per connection string instead of opening a
# fresh client for every request.
pool:
  enabled: false
  max_clients: 8
  idle_timeout_secs: 300

# Natural-language to filter translation (POST /translate)
translator:
  base_url: https://api.anthropic.com/v1/
  model: claude-3-5-haiku-latest
  # Environment variables are expanded. Leave unset to disable translation.
  api_key: ${ANTHROPIC_API_KEY}
  timeout_secs: 60
  max_tokens: 1024
";

        fs::write(config_file, example_content).context("Failed to write example config file")?;

        Ok(())
    }

    /// Expand environment variables in values that may reference secrets
    fn expand_values(&mut self) {
        self.translator.base_url = expand(&self.translator.base_url);
        if let Some(key) = &self.translator.api_key {
            // An unset variable leaves the literal reference behind
            let expanded = expand(key);
            self.translator.api_key = if expanded.starts_with("${") {
                None
            } else {
                Some(expanded)
            };
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.explorer.sample_size == 0 {
            bail!("explorer.sample_size must be at least 1");
        }
        if self.pool.max_clients == 0 {
            bail!("pool.max_clients must be at least 1");
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("Invalid server.bind address '{}'", self.server.bind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.explorer.sample_size, 20);
        assert_eq!(config.explorer.default_query_limit, 100);
        assert_eq!(config.explorer.default_query_skip, 0);
        assert!(!config.pool.enabled);
        assert!(config.server.cors_origins.is_empty());
        assert_eq!(config.bind_addr().unwrap().port(), 9002);
    }

    #[test]
    fn test_partial_sections() {
        let yaml = r"
server:
  bind: 0.0.0.0:8080
pool:
  enabled: true
";
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert!(config.pool.enabled);
        assert_eq!(config.pool.max_clients, 8);
        assert_eq!(config.explorer.sample_size, 20);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_yaml("explorer:\n  sample_size: 0\n").is_err());
        assert!(Config::from_yaml("pool:\n  max_clients: 0\n").is_err());
        assert!(Config::from_yaml("server:\n  bind: not-an-address\n").is_err());
    }

    #[test]
    fn test_unset_api_key_variable_disables_translator() {
        let yaml = "translator:\n  api_key: ${MONGODB_EXPLORER_TEST_SURELY_UNSET_VAR}\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert!(config.translator.api_key.is_none());
        assert!(!config.translator.has_api_key());
    }

    #[test]
    fn test_api_key_redacted_in_debug() {
        let translator = TranslatorConfig {
            api_key: Some("sk-secret".to_string()),
            ..Default::default()
        };
        let rendered = format!("{translator:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_example_config_parses() {
        let dir = std::env::temp_dir().join(format!(
            "mongodb-explorer-rs-test-{}",
            std::process::id()
        ));
        let file = dir.join("config.yaml");
        let _ = fs::remove_file(&file);
        Config::write_example(&file).unwrap();
        let content = fs::read_to_string(&file).unwrap();
        let config = Config::from_yaml(&content).unwrap();
        assert_eq!(config.explorer.sample_size, 20);
        assert!(Config::write_example(&file).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
