//! Configuration management for the collector
//!
//! Supports environment variables, config files, and runtime overrides.
//! Portal selectors and service endpoints are all adjustable via settings.
//!
//! Config file location: ~/.config/coletor/config.toml

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::error::{ColetorError, Result};

/// Main configuration for the collector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Portal configuration
    pub portal: PortalConfig,
    /// Browser driver configuration
    pub driver: DriverConfig,
    /// Registry lookup configuration
    pub registry: RegistryConfig,
    /// Challenge solving configuration
    #[serde(default)]
    pub captcha: CaptchaConfig,
    /// Run/concurrency configuration
    pub run: RunConfig,
    /// Input file configuration
    pub inputs: InputConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

/// Price-transparency portal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Base listing URL
    pub base_url: String,
    /// Jurisdiction code stamped onto every record
    pub jurisdiction: String,
    /// Post-navigation render settle in milliseconds.
    /// Navigation completion is not observable through the driver,
    /// so this is a fixed delay rather than a condition wait.
    pub settle_ms: u64,
    /// Bounded wait for search results in seconds
    pub search_timeout_secs: u64,
    /// Bounded wait for the "no results" marker in seconds
    pub no_results_timeout_secs: u64,
    /// Location name -> portal location code
    pub locations: BTreeMap<String, String>,
    /// Page selectors
    #[serde(default)]
    pub selectors: SelectorConfig,
}

/// CSS selectors for the portal pages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Search input field
    pub search_input: String,
    /// Search submission control
    pub search_button: String,
    /// Marker shown when a search yields nothing
    pub no_results: String,
    /// Price text of the first listing entry
    pub price: String,
    /// Establishment name of the first listing entry
    pub establishment: String,
    /// CNPJ of the first listing entry
    pub cnpj: String,
}

/// Browser driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// WebDriver endpoint (chromedriver/geckodriver)
    pub webdriver_url: String,
    /// Whether to run the browser headless
    pub headless: bool,
    /// Default bounded wait for element location in seconds
    pub element_timeout_secs: u64,
}

/// Registry lookup API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Whether records are enriched through the registry at all
    pub enabled: bool,
    /// Base URL of the registry API; lookups hit {base_url}/{cnpj}
    pub base_url: String,
    /// Requests allowed per window
    pub quota: u32,
    /// Window length in seconds
    pub window_secs: u64,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Challenge solving configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaConfig {
    /// Whether challenge solving is attempted at all
    pub enabled: bool,
    /// Token service base URL
    pub api_url: String,
    /// Token service API key
    pub api_key: String,
    /// Bounded wait when probing for the challenge marker, in seconds
    pub probe_timeout_secs: u64,
    /// Overall budget for the token service to produce a token, in seconds
    pub solve_timeout_secs: u64,
    /// Poll interval while waiting for a token, in seconds
    pub poll_secs: u64,
    /// Bounded wait for the page to accept an injected token, in seconds
    pub accept_timeout_secs: u64,
    /// Challenge widget marker selector
    pub marker: String,
    /// Attribute on the marker carrying the site key
    pub site_key_attr: String,
    /// Response field the token is injected into
    pub token_field: String,
    /// Submission control for the challenge form
    pub submit: String,
}

/// Run/concurrency configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Worker pool size; 1 means a single reused browser session
    pub workers: usize,
    /// Fixed delay between targets sharing a session, in milliseconds
    pub target_delay_ms: u64,
    /// Upper bound of the random jitter added to the delay, in milliseconds
    pub jitter_ms: u64,
}

/// Input file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// JSON array of EAN barcodes
    pub items: PathBuf,
    /// JSON array of descriptions, parallel to the items file
    pub descriptions: PathBuf,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// CSV file written at end of run
    pub path: PathBuf,
    /// Directory for page-source/screenshot dumps on empty extractions
    pub debug_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portal: PortalConfig::default(),
            driver: DriverConfig::default(),
            registry: RegistryConfig::default(),
            captcha: CaptchaConfig::default(),
            run: RunConfig::default(),
            inputs: InputConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        let mut locations = BTreeMap::new();
        locations.insert("Curitiba".to_string(), "4106902".to_string());
        locations.insert("Londrina".to_string(), "4113700".to_string());

        Self {
            base_url: env::var("COLETOR_PORTAL_URL")
                .unwrap_or_else(|_| "https://menorpreco.notaparana.pr.gov.br".to_string()),
            jurisdiction: "41".to_string(),
            settle_ms: 2000,
            search_timeout_secs: 15,
            no_results_timeout_secs: 3,
            locations,
            selectors: SelectorConfig::default(),
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            search_input: "input[name='termo']".to_string(),
            search_button: "button[type='submit']".to_string(),
            no_results: ".sem-resultados".to_string(),
            price: ".produto .preco".to_string(),
            establishment: ".produto .estabelecimento".to_string(),
            cnpj: ".produto .cnpj".to_string(),
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            webdriver_url: env::var("COLETOR_WEBDRIVER_URL")
                .unwrap_or_else(|_| "http://localhost:9515".to_string()),
            headless: env::var("COLETOR_HEADED")
                .map(|v| !(v == "true" || v == "1"))
                .unwrap_or(true),
            element_timeout_secs: 10,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: env::var("COLETOR_REGISTRY_URL")
                .unwrap_or_else(|_| "https://publica.cnpj.ws/cnpj".to_string()),
            quota: 3,
            window_secs: 60,
            timeout_secs: 10,
        }
    }
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        let api_key = env::var("COLETOR_CAPTCHA_KEY").unwrap_or_default();
        Self {
            enabled: !api_key.is_empty(),
            api_url: env::var("COLETOR_CAPTCHA_URL")
                .unwrap_or_else(|_| "https://2captcha.com".to_string()),
            api_key,
            probe_timeout_secs: 4,
            solve_timeout_secs: 120,
            poll_secs: 5,
            accept_timeout_secs: 15,
            marker: ".g-recaptcha".to_string(),
            site_key_attr: "data-sitekey".to_string(),
            token_field: "textarea[name='g-recaptcha-response']".to_string(),
            submit: "form button[type='submit']".to_string(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: env::var("COLETOR_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            target_delay_ms: 1500,
            jitter_ms: 500,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            items: PathBuf::from("lista_eans.json"),
            descriptions: PathBuf::from("lista_descricoes.json"),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("precos.csv"),
            debug_dir: None,
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("coletor")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load() -> Self {
        // Try to load .env file if it exists
        let _ = dotenvy::dotenv();

        // Try to load from config file
        if let Ok(config) = Self::load_from_file() {
            return config;
        }

        // Fall back to defaults (which respect env vars)
        Self::default()
    }

    /// Load configuration from file only
    pub fn load_from_file() -> Result<Self> {
        let config_path = Self::config_file();

        if !config_path.exists() {
            return Err(ColetorError::config("Config file not found"));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| ColetorError::config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ColetorError::config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .map_err(|e| ColetorError::config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ColetorError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| ColetorError::config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Generate a default config file content for display
    pub fn default_config_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config)
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }

    /// Build the portal listing URL for a location code
    pub fn listing_url(&self, location_code: &str) -> Result<String> {
        let url =
            url::Url::parse_with_params(&self.portal.base_url, &[("local", location_code)])?;
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.registry.quota, 3);
        assert_eq!(config.registry.window_secs, 60);
        assert_eq!(config.registry.timeout_secs, 10);
        assert_eq!(config.portal.jurisdiction, "41");
        assert!(config.run.workers >= 1);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("webdriver_url"));
        assert!(toml_str.contains("quota"));
        assert!(toml_str.contains("locations"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.registry.quota, config.registry.quota);
        assert_eq!(parsed.portal.locations, config.portal.locations);
    }

    #[test]
    fn test_config_dir() {
        let dir = Config::config_dir();
        assert!(dir.to_string_lossy().contains("coletor"));
    }

    #[test]
    fn test_listing_url() {
        let mut config = Config::default();
        config.portal.base_url = "https://portal.example.gov".to_string();
        let url = config.listing_url("4106902").unwrap();
        assert_eq!(url, "https://portal.example.gov/?local=4106902");
    }
}
