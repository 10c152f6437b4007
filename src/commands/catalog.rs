//! Topology commands: groups, categories, parameters, and cache maintenance.

use crate::cache::CacheStore;
use crate::catalog::client::{CatalogClient, CatalogFetch};
use crate::catalog::models::Category;
use crate::catalog::params::SpecKind;
use crate::commands::{ensure_params, open_session};
use crate::config::Config;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Browses the catalog topology.
pub struct CatalogCommand {
    config: Config,
}

impl CatalogCommand {
    /// Creates a new catalog command.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn client(&self) -> Result<Arc<dyn CatalogFetch>> {
        let client = CatalogClient::new(&self.config).context("Failed to create HTTP client")?;
        Ok(Arc::new(client))
    }

    /// Lists groups as JSON.
    pub async fn groups(&self) -> Result<String> {
        self.groups_with_client(self.client()?).await
    }

    /// Lists groups with a provided client (for testing).
    pub async fn groups_with_client(&self, client: Arc<dyn CatalogFetch>) -> Result<String> {
        let session = open_session(&self.config, client).await?;

        let groups: Vec<Value> = session
            .groups()
            .iter()
            .map(|g| {
                json!({
                    "title": g.title,
                    "slug": g.slug,
                    "id": g.id,
                    "categories": g.categories.len(),
                    "size": g.size(),
                })
            })
            .collect();

        Ok(serde_json::to_string_pretty(&groups)?)
    }

    /// Lists categories as JSON, optionally only those of one group.
    pub async fn categories(&self, group: Option<&str>) -> Result<String> {
        self.categories_with_client(self.client()?, group).await
    }

    /// Lists categories with a provided client (for testing).
    pub async fn categories_with_client(
        &self,
        client: Arc<dyn CatalogFetch>,
        group: Option<&str>,
    ) -> Result<String> {
        let session = open_session(&self.config, client).await?;

        let categories: Vec<&Category> = match group {
            Some(title) => {
                let group = session
                    .graph()
                    .group(title)
                    .with_context(|| format!("Unknown group: {}", title))?;
                group.categories.iter().collect()
            }
            None => session.graph().categories().collect(),
        };

        let summary: Vec<Value> = categories
            .iter()
            .map(|c| {
                json!({
                    "path": c.path,
                    "id": c.id,
                    "size": c.size,
                    "params": c.params.name(),
                })
            })
            .collect();

        Ok(serde_json::to_string_pretty(&summary)?)
    }

    /// Describes the search parameters of a category as JSON.
    pub async fn params(&self, path: &str) -> Result<String> {
        self.params_with_client(self.client()?, path).await
    }

    /// Describes parameters with a provided client (for testing).
    pub async fn params_with_client(&self, client: Arc<dyn CatalogFetch>, path: &str) -> Result<String> {
        let mut session = open_session(&self.config, client).await?;
        let params = ensure_params(&mut session, path).await?;

        let specs: Vec<Value> = params
            .iter()
            .map(|spec| {
                let mut entry = json!({
                    "title": spec.title,
                    "name": spec.name,
                    "default": spec.default,
                });
                match &spec.kind {
                    SpecKind::Choice { options } => {
                        entry["kind"] = json!("choice");
                        entry["options"] = json!(options.keys().collect::<Vec<_>>());
                    }
                    SpecKind::Range { min, max } => {
                        entry["kind"] = json!("range");
                        entry["min"] = json!(min);
                        entry["max"] = json!(max);
                    }
                    SpecKind::Flag { .. } => entry["kind"] = json!("flag"),
                    SpecKind::Text => entry["kind"] = json!("text"),
                    SpecKind::Sort { columns } => {
                        entry["kind"] = json!("sort");
                        entry["columns"] = json!(columns.keys().collect::<Vec<_>>());
                    }
                }
                entry
            })
            .collect();

        Ok(serde_json::to_string_pretty(&specs)?)
    }

    /// Deletes this locale's cache file.
    pub fn clear_cache(&self) -> Result<String> {
        let store = CacheStore::for_locale(self.config.cache_dir(), &self.config.locale());
        let removed = store
            .clear()
            .with_context(|| format!("Failed to remove {}", store.path().display()))?;
        info!("Cache {} removed: {}", store.path().display(), removed);

        Ok(serde_json::to_string_pretty(&json!({
            "path": store.path(),
            "removed": removed,
        }))?)
    }
}
