//! Configuration loading and validation

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::chain::Chain;
use crate::error::{Error, Result};
use crate::provider::ProviderKind;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Backend credentials and request shaping
#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub covalent_api_key: Option<String>,
    #[serde(default)]
    pub ethplorer_api_key: Option<String>,
    /// Applies to every chain's explorer when set
    #[serde(default)]
    pub explorer_api_key: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_covalent_page_size")]
    pub covalent_page_size: u32,
    #[serde(default = "default_ethplorer_max_holders")]
    pub ethplorer_max_holders: u32,
    #[serde(default = "default_explorer_page_size")]
    pub explorer_page_size: u32,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            covalent_api_key: None,
            ethplorer_api_key: None,
            explorer_api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            covalent_page_size: default_covalent_page_size(),
            ethplorer_max_holders: default_ethplorer_max_holders(),
            explorer_page_size: default_explorer_page_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Holder count requested when `--top` is not given
    #[serde(default = "default_top")]
    pub default_top: u32,
    /// Early transfer window when `--hours` is not given
    #[serde(default = "default_window_hours")]
    pub default_window_hours: u32,
    #[serde(default = "default_max_holder_pages")]
    pub max_holder_pages: u32,
    #[serde(default = "default_max_transfer_pages")]
    pub max_transfer_pages: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_top: default_top(),
            default_window_hours: default_window_hours(),
            max_holder_pages: default_max_holder_pages(),
            max_transfer_pages: default_max_transfer_pages(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_covalent_page_size() -> u32 {
    1000
}

fn default_ethplorer_max_holders() -> u32 {
    1000
}

fn default_explorer_page_size() -> u32 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8000
}

fn default_top() -> u32 {
    500
}

fn default_window_hours() -> u32 {
    48
}

fn default_max_holder_pages() -> u32 {
    20
}

fn default_max_transfer_pages() -> u32 {
    10
}

fn default_output_directory() -> String {
    ".".to_string()
}

/// Public Ethplorer key, heavily rate limited
pub const ETHPLORER_FREE_KEY: &str = "freekey";

/// Conventional environment variable holding a provider's credential
pub fn credential_env(provider: ProviderKind, chain: Chain) -> &'static str {
    match provider {
        ProviderKind::Covalent => "COVALENT_API_KEY",
        ProviderKind::Ethplorer => "ETHPLORER_API_KEY",
        ProviderKind::Explorer => chain.explorer_key_env(),
    }
}

fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

impl ProvidersConfig {
    pub fn covalent_key(&self) -> Option<String> {
        non_empty(&self.covalent_api_key).or_else(|| env_key("COVALENT_API_KEY"))
    }

    /// Falls back to the public free key
    pub fn ethplorer_key(&self) -> String {
        non_empty(&self.ethplorer_api_key)
            .or_else(|| env_key("ETHPLORER_API_KEY"))
            .unwrap_or_else(|| ETHPLORER_FREE_KEY.to_string())
    }

    /// Explorer key per chain, only chains with a key are present
    pub fn explorer_keys(&self) -> BTreeMap<Chain, String> {
        let shared = non_empty(&self.explorer_api_key);
        Chain::ALL
            .iter()
            .filter_map(|chain| {
                shared
                    .clone()
                    .or_else(|| env_key(chain.explorer_key_env()))
                    .map(|key| (*chain, key))
            })
            .collect()
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("retry.max_attempts", default_max_attempts() as i64)?
            .set_default("retry.base_delay_ms", default_base_delay_ms() as i64)?
            .set_default("retry.max_delay_ms", default_max_delay_ms() as i64)?
            .set_default("analysis.default_top", default_top() as i64)?
            .set_default("analysis.default_window_hours", default_window_hours() as i64)?
            .set_default("output.directory", default_output_directory())?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix TEAM_HOLDINGS_)
            .add_source(
                config::Environment::with_prefix("TEAM_HOLDINGS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::Config(format!(
                "retry.base_delay_ms ({}) cannot exceed retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }

        let pages = [
            ("providers.covalent_page_size", self.providers.covalent_page_size),
            ("providers.ethplorer_max_holders", self.providers.ethplorer_max_holders),
            ("providers.explorer_page_size", self.providers.explorer_page_size),
            ("analysis.max_holder_pages", self.analysis.max_holder_pages),
            ("analysis.max_transfer_pages", self.analysis.max_transfer_pages),
            ("analysis.default_top", self.analysis.default_top),
        ];
        for (name, value) in pages {
            if value == 0 {
                return Err(Error::Config(format!("{} must be positive", name)));
            }
        }

        if self.providers.request_timeout_secs == 0 {
            return Err(Error::Config("providers.request_timeout_secs must be positive".to_string()));
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        let explorer_chains: Vec<&str> = self
            .providers
            .explorer_keys()
            .keys()
            .map(|c| c.name())
            .collect();

        format!(
            r#"Configuration:
  Providers:
    covalent_api_key: {}
    ethplorer_api_key: {}
    explorer keys: {}
    request_timeout: {}s
    covalent_page_size: {}
    ethplorer_max_holders: {}
    explorer_page_size: {}
  Retry:
    max_attempts: {}
    delay: {}ms .. {}ms
  Analysis:
    default_top: {}
    default_window: {}h
    max_holder_pages: {}
    max_transfer_pages: {}
  Output:
    directory: {}
"#,
            mask_secret(self.providers.covalent_key().as_deref()),
            mask_secret(Some(&self.providers.ethplorer_key())),
            if explorer_chains.is_empty() {
                "(not set)".to_string()
            } else {
                explorer_chains.join(", ")
            },
            self.providers.request_timeout_secs,
            self.providers.covalent_page_size,
            self.providers.ethplorer_max_holders,
            self.providers.explorer_page_size,
            self.retry.max_attempts,
            self.retry.base_delay_ms,
            self.retry.max_delay_ms,
            self.analysis.default_top,
            self.analysis.default_window_hours,
            self.analysis.max_holder_pages,
            self.analysis.max_transfer_pages,
            self.output.directory,
        )
    }
}

/// Mask a credential for display, the public Ethplorer key stays readable
fn mask_secret(secret: Option<&str>) -> &'static str {
    match secret {
        None => "(not set)",
        Some(ETHPLORER_FREE_KEY) => "freekey (public)",
        Some(_) => "***",
    }
}
