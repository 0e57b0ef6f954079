use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::proxy::{ProxyCredentials, ProxyMode};
use crate::utils::mask_secret;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Inbound HTTP listener
    pub server: ServerConfig,

    /// Outbound proxy addressing and credentials
    pub proxy: ProxyConfig,

    /// Transcript provider settings
    pub transcript: TranscriptConfig,

    /// Egress IP probe settings
    pub probe: ProbeConfig,

    /// Log output settings
    pub logging: LoggingConfig,

    /// Bearer token callers must present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Rotating single endpoint or a pool of backbone endpoints
    pub mode: ProxyMode,

    pub rotating: RotatingEndpoint,

    pub backbone: BackbonePool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotatingEndpoint {
    pub host: String,
    pub port: u16,

    /// Appended to the username so the vendor rotates the exit IP per connection
    pub username_suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackbonePool {
    pub host: String,

    /// Port of endpoint #1; endpoint #i listens on `base_port + i - 1`
    pub base_port: u16,

    /// Number of endpoints in the pool
    pub pool_size: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    /// Languages tried in order before falling back to any track
    pub preferred_languages: Vec<String>,

    /// Upper bound for each provider HTTP call
    pub request_timeout_secs: u64,

    /// Base URL of the provider, overridable for testing
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Run the egress probe alongside every transcript fetch
    pub enabled: bool,

    /// Public IP-echo endpoint answering `{"origin": "<ip>"}`
    pub echo_url: String,

    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            proxy: ProxyConfig::default(),
            transcript: TranscriptConfig::default(),
            probe: ProbeConfig::default(),
            logging: LoggingConfig::default(),
            api_key: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            mode: ProxyMode::Rotating,
            rotating: RotatingEndpoint::default(),
            backbone: BackbonePool::default(),
            username: None,
            password: None,
        }
    }
}

impl Default for RotatingEndpoint {
    fn default() -> Self {
        Self {
            host: "p.webshare.io".to_string(),
            port: 80,
            username_suffix: "-rotate".to_string(),
        }
    }
}

impl Default for BackbonePool {
    fn default() -> Self {
        Self {
            host: "p.webshare.io".to_string(),
            base_port: 10000,
            pool_size: 25,
        }
    }
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            preferred_languages: vec!["en".to_string()],
            request_timeout_secs: 30,
            base_url: "https://www.youtube.com".to_string(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            echo_url: "https://httpbin.org/ip".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
        }
    }
}

impl Config {
    /// Load configuration from file (or defaults), then apply environment overrides
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            serde_yaml::from_str::<Config>(&content)
                .context("Failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(config_path)
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("transcript-proxy").join("config.yaml"))
    }

    /// Overlay secrets and deployment knobs from the environment.
    ///
    /// `lookup` is injected so tests can supply a fabricated environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(user) = non_empty("PROXY_USERNAME").or_else(|| non_empty("WEBSHARE_USERNAME")) {
            self.proxy.username = Some(user);
        }
        if let Some(pass) = non_empty("PROXY_PASSWORD").or_else(|| non_empty("WEBSHARE_PASSWORD")) {
            self.proxy.password = Some(pass);
        }
        if let Some(mode) = non_empty("PROXY_MODE") {
            self.proxy.mode = mode.parse()?;
        }
        if let Some(size) = non_empty("PROXY_POOL_SIZE") {
            self.proxy.backbone.pool_size = size
                .trim()
                .parse()
                .with_context(|| format!("PROXY_POOL_SIZE is not a number: {}", size))?;
        }
        if let Some(format) = non_empty("LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" | "pretty" => LogFormat::Text,
                other => anyhow::bail!("Unknown LOG_FORMAT: {}", other),
            };
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.transcript.preferred_languages.is_empty() {
            anyhow::bail!("transcript.preferred_languages must not be empty");
        }

        if self.proxy.mode == ProxyMode::Backbone {
            let pool = &self.proxy.backbone;
            if pool.pool_size == 0 {
                anyhow::bail!("proxy.backbone.pool_size must be at least 1");
            }
            if u32::from(pool.base_port) + u32::from(pool.pool_size) - 1 > u32::from(u16::MAX) {
                anyhow::bail!(
                    "proxy.backbone port range {}..{} exceeds 65535",
                    pool.base_port,
                    u32::from(pool.base_port) + u32::from(pool.pool_size) - 1
                );
            }
        }

        url::Url::parse(&self.transcript.base_url)
            .context("transcript.base_url is not a valid URL")?;
        url::Url::parse(&self.probe.echo_url)
            .context("probe.echo_url is not a valid URL")?;

        Ok(())
    }

    /// Proxy credentials, if both halves were configured
    pub fn proxy_credentials(&self) -> Option<ProxyCredentials> {
        match (&self.proxy.username, &self.proxy.password) {
            (Some(username), Some(password)) => Some(ProxyCredentials::new(username, password)),
            _ => None,
        }
    }

    /// Display current configuration with secrets masked
    pub fn display(&self) {
        let label = |s: &str| console::style(s.to_string()).bold();

        println!("{}", label("Current Configuration:"));
        println!("  Listen: {}:{}", self.server.host, self.server.port);
        println!("  Proxy Mode: {}", self.proxy.mode);
        match self.proxy.mode {
            ProxyMode::Rotating => println!(
                "  Rotating Endpoint: {}:{} (suffix {})",
                self.proxy.rotating.host, self.proxy.rotating.port, self.proxy.rotating.username_suffix
            ),
            ProxyMode::Backbone => println!(
                "  Backbone Pool: {} ports {}..{}",
                self.proxy.backbone.host,
                self.proxy.backbone.base_port,
                u32::from(self.proxy.backbone.base_port) + u32::from(self.proxy.backbone.pool_size.max(1)) - 1
            ),
        }
        println!(
            "  Proxy Username: {}",
            self.proxy.username.as_deref().map(mask_secret).unwrap_or_else(|| "<unset>".into())
        );
        println!(
            "  Proxy Password: {}",
            if self.proxy.password.is_some() { "<set>" } else { "<unset>" }
        );
        println!(
            "  API Key: {}",
            if self.api_key.is_some() { "<set>" } else { "<unset>" }
        );
        println!("  Languages: {}", self.transcript.preferred_languages.join(", "));
        println!("  Probe: {} ({})", self.probe.enabled, self.probe.echo_url);
        println!("  Log Format: {:?}", self.logging.format);
    }
}
