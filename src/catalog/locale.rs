//! Catalog locale: country, language, storefront domain, and currency.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Locale settings for one catalog session.
///
/// All fields are fixed once a session is built; they select the storefront
/// domain, the language of display strings, and the currency of price columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locale {
    /// ISO 3166-1 alpha-2 country code, uppercase (e.g. "US").
    pub country: String,
    /// ISO 639-1 language code, lowercase (e.g. "en").
    pub short_lang: String,
    /// RFC 5646 language tag (e.g. "en-US").
    pub long_lang: String,
    /// Top-level domain suffix of the storefront (e.g. "com", "de").
    pub tld: String,
    /// ISO 4217 currency code (e.g. "USD").
    pub currency: String,
}

impl Default for Locale {
    fn default() -> Self {
        Self::new("US", "en")
    }
}

impl Locale {
    /// Creates a locale from a country and language, deriving everything else.
    pub fn new(country: &str, short_lang: &str) -> Self {
        Self::resolve(country, short_lang, None, None, None)
    }

    /// Creates a locale with explicit overrides for the derived fields.
    ///
    /// Derivations when an override is absent:
    /// - `long_lang` = `{short_lang}-{country}`
    /// - `tld` = `com` for US, the lowercase country code otherwise
    /// - `currency` = `{country}D`, which is only a rough guess outside the dollar zones
    pub fn resolve(
        country: &str,
        short_lang: &str,
        long_lang: Option<&str>,
        tld: Option<&str>,
        currency: Option<&str>,
    ) -> Self {
        let country = country.trim().to_uppercase();
        let short_lang = short_lang.trim().to_lowercase();

        let long_lang = long_lang
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| format!("{}-{}", short_lang, country));
        let tld = tld.map(|s| s.trim().to_lowercase()).unwrap_or_else(|| {
            if country == "US" {
                "com".to_string()
            } else {
                country.to_lowercase()
            }
        });
        let currency = currency
            .map(|s| s.trim().to_uppercase())
            .unwrap_or_else(|| format!("{}D", country));

        Self { country, short_lang, long_lang, tld, currency }
    }

    /// Returns the storefront domain for this locale.
    pub fn domain(&self) -> String {
        format!("digikey.{}", self.tld)
    }

    /// Returns the base URL for this locale.
    pub fn base_url(&self) -> String {
        format!("https://www.{}", self.domain())
    }

    /// Returns the path of the top-level product index.
    pub fn index_path(&self) -> String {
        format!("products/{}", self.short_lang)
    }

    /// Returns the Accept-Language header value for this locale.
    pub fn accept_language(&self) -> String {
        format!("{},{};q=0.9", self.long_lang, self.short_lang)
    }

    /// Returns the cookies that pin the storefront to this locale.
    pub fn cookies(&self) -> Vec<(&'static str, String)> {
        vec![
            ("SiteForCur", self.country.clone()),
            ("cur", self.currency.clone()),
            ("website#lang", self.long_lang.clone()),
        ]
    }

    /// Returns the cache file name for this locale.
    ///
    /// Each locale gets its own file so several can share one cache directory.
    pub fn cache_file_name(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}.json.gz",
            self.short_lang, self.country, self.long_lang, self.tld, self.currency
        )
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.long_lang, self.domain(), self.currency)
    }
}

impl FromStr for Locale {
    type Err = LocaleParseError;

    /// Parses `en-US`, `en_US`, or a bare country code such as `de`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let is_code = |c: &str| c.len() == 2 && c.chars().all(|ch| ch.is_ascii_alphabetic());

        match s.split_once(|c: char| c == '-' || c == '_') {
            Some((lang, country)) if is_code(lang) && is_code(country) => {
                Ok(Locale::new(country, lang))
            }
            None if is_code(s) => {
                let lang = if s.eq_ignore_ascii_case("us") { "en" } else { s };
                Ok(Locale::new(s, lang))
            }
            _ => Err(LocaleParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocaleParseError(String);

impl fmt::Display for LocaleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unknown locale '{}'. Use a language-country pair such as en-US, or a country code such as de",
            self.0
        )
    }
}

impl std::error::Error for LocaleParseError {}
