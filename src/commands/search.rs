//! Search command implementation.

use crate::catalog::client::{CatalogClient, CatalogFetch};
use crate::catalog::models::Product;
use crate::catalog::params::{FilterMap, FilterValue};
use crate::commands::{ensure_params, open_session};
use crate::config::Config;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parses `Name=Value` arguments into a filter map.
///
/// A name given more than once collects all of its values into a choice set.
pub fn parse_filters(args: &[String]) -> Result<FilterMap> {
    let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for arg in args {
        let (name, value) = arg
            .split_once('=')
            .with_context(|| format!("Filter {:?} is not of the form Name=Value", arg))?;
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("Filter {:?} has an empty name", arg);
        }
        values.entry(name.to_string()).or_default().push(value.trim().to_string());
    }

    Ok(values
        .into_iter()
        .map(|(name, mut values)| {
            let value = if values.len() == 1 {
                FilterValue::Scalar(values.remove(0))
            } else {
                FilterValue::choices(values)
            };
            (name, value)
        })
        .collect())
}

/// Executes a filtered product search in one category.
pub struct SearchCommand {
    config: Config,
}

impl SearchCommand {
    /// Creates a new search command.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Executes the search and returns JSON output.
    pub async fn execute(&self, path: &str, filters: &[String], max: usize) -> Result<String> {
        let client = CatalogClient::new(&self.config).context("Failed to create HTTP client")?;

        self.execute_with_client(Arc::new(client), path, filters, max).await
    }

    /// Executes the search with a provided client (for testing).
    pub async fn execute_with_client(
        &self,
        client: Arc<dyn CatalogFetch>,
        path: &str,
        filters: &[String],
        max: usize,
    ) -> Result<String> {
        let filters = parse_filters(filters)?;
        let mut session = open_session(&self.config, client).await?;
        ensure_params(&mut session, path).await?;

        info!("Searching {} for up to {} products", path, max);
        let mut search = session.search(path, &filters)?;

        let mut products: Vec<Product> = Vec::new();
        while products.len() < max {
            match search.next().await {
                Ok(Some(product)) => products.push(product),
                Ok(None) => break,
                Err(e) if !products.is_empty() => {
                    warn!("Returning {} products; {}", products.len(), e);
                    break;
                }
                Err(e) => return Err(e).context("Search failed"),
            }
        }

        debug!("Collected {} products", products.len());
        let rows: Vec<BTreeMap<&str, &str>> = products.iter().map(Product::by_title).collect();
        Ok(serde_json::to_string_pretty(&rows)?)
    }
}
