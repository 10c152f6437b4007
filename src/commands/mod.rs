//! CLI command implementations.

pub mod catalog;
pub mod search;

pub use catalog::CatalogCommand;
pub use search::SearchCommand;

use crate::cache::CacheStore;
use crate::catalog::client::CatalogFetch;
use crate::catalog::params::ParameterSet;
use crate::config::Config;
use crate::session::Session;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Opens a session for `config`, restoring the cached topology or fetching it on a miss.
pub(crate) async fn open_session(config: &Config, fetcher: Arc<dyn CatalogFetch>) -> Result<Session> {
    let store = CacheStore::for_locale(config.cache_dir(), &config.locale());
    let (session, restored) = Session::restore_or_init(fetcher, Some(store));
    let mut session = session.with_page_size(config.page_size());

    if !restored || session.graph().is_empty() {
        info!("Building catalog topology for {}", session.locale());
        session.init_groups().await.context("Failed to load the product index")?;
        save(&session);
    }
    Ok(session)
}

/// Returns the category's parameters, discovering and caching them if needed.
pub(crate) async fn ensure_params(session: &mut Session, path: &str) -> Result<Arc<ParameterSet>> {
    let category = session.lookup_category(path)?;
    if let Some(params) = category.params.params() {
        return Ok(Arc::clone(params));
    }

    let params = session
        .init_params(path)
        .await
        .with_context(|| format!("Failed to discover search parameters for {}", path))?;
    save(session);
    Ok(params)
}

// A cache that cannot be written only costs the next run a refetch.
fn save(session: &Session) {
    if let Err(e) = session.save_cache() {
        warn!("Failed to write cache: {}", e);
    }
}
