//! Configuration management with TOML, environment variables, and CLI overrides.

use crate::catalog::locale::Locale;
use crate::catalog::params::MAX_PAGE_SIZE;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Application configuration with layered loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// ISO 3166-1 country code of the storefront
    #[serde(default = "default_country")]
    pub country: String,

    /// ISO 639-1 language code for display strings
    #[serde(default = "default_short_lang")]
    pub short_lang: String,

    /// RFC 5646 language tag; derived from language and country when unset
    #[serde(default)]
    pub long_lang: Option<String>,

    /// Storefront top-level domain; derived from country when unset
    #[serde(default)]
    pub tld: Option<String>,

    /// ISO 4217 currency code; derived from country when unset
    #[serde(default)]
    pub currency: Option<String>,

    /// Proxy URL (e.g., socks5://host:port)
    #[serde(default)]
    pub proxy: Option<String>,

    /// Base delay before each request in milliseconds
    #[serde(default)]
    pub delay_ms: u64,

    /// Random jitter added to delay (0 to this value)
    #[serde(default)]
    pub delay_jitter_ms: u64,

    /// Per-request deadline in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries for transient transport failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base of the exponential retry backoff in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Products requested per result page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Directory holding topology caches; platform cache dir when unset
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

fn default_country() -> String {
    "US".to_string()
}

fn default_short_lang() -> String {
    "en".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_page_size() -> u32 {
    25
}

impl Default for Config {
    fn default() -> Self {
        Self {
            country: default_country(),
            short_lang: default_short_lang(),
            long_lang: None,
            tld: None,
            currency: None,
            proxy: None,
            delay_ms: 0,
            delay_jitter_ms: 0,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            page_size: default_page_size(),
            cache_dir: None,
        }
    }
}

impl Config {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Loads configuration with fallback to default locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        // 1. Explicit path takes precedence
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        // 2. Try current directory
        let local_config = Path::new("config.toml");
        if local_config.exists() {
            debug!("Found config.toml in current directory");
            return Self::from_file(local_config);
        }

        // 3. Try XDG config directory
        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("dk-crawler").join("config.toml");
            if xdg_config.exists() {
                debug!("Found config in XDG config directory");
                return Self::from_file(xdg_config);
            }
        }

        // 4. Return default config
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Applies environment variable overrides.
    pub fn with_env(mut self) -> Self {
        if let Ok(country) = std::env::var("DK_COUNTRY") {
            self.country = country;
        }

        if let Ok(lang) = std::env::var("DK_LANG") {
            self.short_lang = lang;
        }

        if let Ok(currency) = std::env::var("DK_CURRENCY") {
            self.currency = Some(currency);
        }

        if let Ok(proxy) = std::env::var("DK_PROXY") {
            self.proxy = Some(proxy);
        }

        if let Ok(delay) = std::env::var("DK_DELAY") {
            if let Ok(d) = delay.parse() {
                self.delay_ms = d;
            }
        }

        if let Ok(dir) = std::env::var("DK_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }

        self
    }

    /// Pins the storefront to `locale`'s country and language.
    ///
    /// Derived fields left unset in the file are derived again from the new pair.
    pub fn set_locale(&mut self, locale: &Locale) {
        self.country = locale.country.clone();
        self.short_lang = locale.short_lang.clone();
    }

    /// Resolves the locale, filling in derived fields.
    pub fn locale(&self) -> Locale {
        Locale::resolve(
            &self.country,
            &self.short_lang,
            self.long_lang.as_deref(),
            self.tld.as_deref(),
            self.currency.as_deref(),
        )
    }

    /// Per-request deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Page size clamped to what the catalog serves.
    pub fn page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    /// Cache directory: configured, else the platform cache dir, else `.dk-crawler`.
    pub fn cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        dirs::cache_dir()
            .map(|d| d.join("dk-crawler"))
            .unwrap_or_else(|| PathBuf::from(".dk-crawler"))
    }

    /// Full path of this configuration's topology cache file.
    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir().join(self.locale().cache_file_name())
    }
}
