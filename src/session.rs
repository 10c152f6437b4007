//! Catalog session: owns the group/category graph, parameter discovery, and cache.

use crate::cache::{CacheEnvelope, CacheStore};
use crate::catalog::classify::{classify, classify_expecting, ClassifiedPage, PageShape};
use crate::catalog::client::{build_url, fetch_or_cancel, CatalogFetch};
use crate::catalog::locale::Locale;
use crate::catalog::models::{Category, Graph, Group};
use crate::catalog::params::{FilterMap, ParamState, ParameterSet, MAX_PAGE_SIZE, PAGE_SIZE_KEY};
use crate::error::{Error, Result};
use crate::search::ProductSearch;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of products requested per result page.
pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// A crawl session against one storefront locale.
///
/// The session is the only writer of the graph. Topology changes are built
/// aside and swapped in whole, so a failed refresh leaves the previous graph.
pub struct Session {
    locale: Locale,
    fetcher: Arc<dyn CatalogFetch>,
    graph: Graph,
    cache: Option<CacheStore>,
    cancel: CancellationToken,
    page_size: u32,
}

impl Session {
    /// Creates a session with an empty graph and no cache.
    pub fn new(fetcher: Arc<dyn CatalogFetch>) -> Self {
        Self {
            locale: fetcher.locale().clone(),
            fetcher,
            graph: Graph::default(),
            cache: None,
            cancel: CancellationToken::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the default page size, clamped to what the catalog serves.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Uses a caller-owned token; cancelling it stops every in-flight fetch.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Creates a session and populates it from `cache` when possible.
    ///
    /// Returns whether the cache was used. A missing, unreadable, or stale
    /// cache yields an empty graph and `false`; it is never an error.
    pub fn restore_or_init(fetcher: Arc<dyn CatalogFetch>, cache: Option<CacheStore>) -> (Self, bool) {
        let mut session = Self::new(fetcher);
        session.cache = cache;
        let restored = session.restore();
        (session, restored)
    }

    /// Replaces the graph with the cached one. Returns false on a cache miss.
    pub fn restore(&mut self) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };

        match cache.load() {
            Ok(envelope) => {
                self.graph = Graph::from_groups(envelope.groups);
                info!(
                    "Restored {} groups and {} categories from {}",
                    self.graph.groups().len(),
                    self.graph.category_count(),
                    cache.path().display()
                );
                true
            }
            Err(e) => {
                warn!("Cache miss, starting from scratch: {}", e);
                false
            }
        }
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn groups(&self) -> &[Group] {
        self.graph.groups()
    }

    pub fn cache(&self) -> Option<&CacheStore> {
        self.cache.as_ref()
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Token shared by every fetch this session and its searches issue.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fetches the product index and replaces the graph with it.
    ///
    /// On failure the graph is left exactly as it was and the cause is
    /// wrapped in [`Error::TopologyFetch`]. Discovered parameters of
    /// categories that survive the refresh are carried over.
    pub async fn init_groups(&mut self) -> Result<()> {
        let groups = self.fetch_groups().await.map_err(|e| Error::TopologyFetch(Box::new(e)))?;

        let mut graph = Graph::from_groups(groups);
        let mut carried = 0;
        for old in self.graph.categories() {
            if let (Some(new), ParamState::Ready(params)) = (graph.category_mut(&old.path), &old.params) {
                new.params = ParamState::Ready(Arc::clone(params));
                carried += 1;
            }
        }
        if carried > 0 {
            debug!("Carried parameters of {} categories into the new graph", carried);
        }

        info!(
            "Loaded {} groups and {} categories",
            graph.groups().len(),
            graph.category_count()
        );
        self.graph = graph;
        Ok(())
    }

    async fn fetch_groups(&self) -> Result<Vec<Group>> {
        let path = self.locale.index_path();
        let url = build_url(&self.locale.base_url(), &path, &[]);
        info!("Fetching product index for {}", self.locale);

        let html = fetch_or_cancel(self.fetcher.as_ref(), &self.cancel, &path, &[]).await?;
        match classify(&html, &url)? {
            ClassifiedPage::CategoryListing(groups) if !groups.is_empty() => Ok(groups),
            ClassifiedPage::CategoryListing(_) => Err(Error::UnrecognizedPageShape {
                url,
                expected: "CategoryListing with at least one group".to_string(),
                observed: "empty CategoryListing".to_string(),
            }),
            other => Err(Error::UnrecognizedPageShape {
                url,
                expected: "CategoryListing".to_string(),
                observed: other.shape().to_string(),
            }),
        }
    }

    /// Looks up a category by its exact `Group/Category` path.
    pub fn lookup_category(&self, path: &str) -> Result<&Category> {
        self.graph.category(path).ok_or_else(|| Error::UnknownCategory(path.to_string()))
    }

    /// Categories whose path contains `needle`, ignoring case.
    pub fn categories_matching(&self, needle: &str) -> Vec<&Category> {
        let needle = needle.to_lowercase();
        self.graph.categories().filter(|c| c.path.to_lowercase().contains(&needle)).collect()
    }

    /// Discovers the searchable parameters of a category.
    ///
    /// Issues one parameter-less request and expects a filter interface.
    /// Success moves the category to `Ready`, replacing any earlier set; a
    /// fetch or classification failure moves it to `Failed`, which is final.
    /// Cancellation restores the state the category had before the call.
    /// Taking `&mut self` keeps initialization to one caller at a time.
    pub async fn init_params(&mut self, path: &str) -> Result<Arc<ParameterSet>> {
        let category = self
            .graph
            .category_mut(path)
            .ok_or_else(|| Error::UnknownCategory(path.to_string()))?;

        if let ParamState::Failed(reason) = &category.params {
            return Err(Error::ParametersNotInitialized {
                category: path.to_string(),
                state: format!("failed: {}", reason),
            });
        }

        let href = category.href.clone();
        let previous = std::mem::replace(&mut category.params, ParamState::Initializing);
        info!("Initializing search parameters for {}", path);

        // Restores `previous` if this future is dropped before the fetch settles.
        let guard = InitGuard { graph: &mut self.graph, path, previous: Some(previous) };
        let result = fetch_params(self.fetcher.as_ref(), &self.cancel, &self.locale, &href).await;

        match result {
            Ok(params) => {
                let params = Arc::new(params);
                info!("{} has {} search parameters", path, params.len());
                guard.settle(ParamState::Ready(Arc::clone(&params)));
                Ok(params)
            }
            Err(e) if e.is_cancelled() => {
                debug!("Parameter initialization for {} cancelled", path);
                drop(guard);
                Err(e)
            }
            Err(e) => {
                warn!("Parameter initialization for {} failed: {}", path, e);
                guard.settle(ParamState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Starts a filtered search in a category whose parameters are `Ready`.
    ///
    /// The filter map is validated and encoded before anything is fetched;
    /// the first page is requested on the first call to `next`.
    pub fn search(&self, path: &str, filters: &FilterMap) -> Result<ProductSearch> {
        let category = self.lookup_category(path)?;
        let params = category.params.params().ok_or_else(|| Error::ParametersNotInitialized {
            category: path.to_string(),
            state: category.params.name().to_string(),
        })?;

        let encoded = params.encode(path, filters)?;
        let page_size = encoded.page_size.unwrap_or(self.page_size);
        debug!("Encoded filters for {}: {:?}", path, encoded.pairs);

        let quantity = encoded.quantity();
        Ok(ProductSearch::new(
            Arc::clone(&self.fetcher),
            self.cancel.clone(),
            path,
            category.href.clone(),
            encoded.pairs,
            page_size,
        )
        .with_quantity(quantity))
    }

    /// Snapshot of the graph at the current cache format version.
    pub fn serialize(&self) -> CacheEnvelope {
        CacheEnvelope::new(self.graph.groups().to_vec())
    }

    /// Writes the graph to the cache. Returns false when the session has no cache.
    pub fn save_cache(&self) -> Result<bool> {
        let Some(cache) = &self.cache else {
            return Ok(false);
        };
        cache.save(&self.serialize())?;
        Ok(true)
    }
}

/// A category whose parameter discovery is in flight.
///
/// Dropping it unsettled puts back the state the category had before, so an
/// abandoned or cancelled discovery never leaves it `Initializing`.
struct InitGuard<'a> {
    graph: &'a mut Graph,
    path: &'a str,
    previous: Option<ParamState>,
}

impl InitGuard<'_> {
    fn settle(mut self, state: ParamState) {
        self.previous = None;
        if let Some(category) = self.graph.category_mut(self.path) {
            category.params = state;
        }
    }
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        let Some(previous) = self.previous.take() else {
            return;
        };
        if let Some(category) = self.graph.category_mut(self.path) {
            category.params = match previous {
                ParamState::Ready(params) => ParamState::Ready(params),
                _ => ParamState::Uninitialized,
            };
        }
    }
}

/// Fetches a category's one-row result page and reads its filter controls.
async fn fetch_params(
    fetcher: &dyn CatalogFetch,
    cancel: &CancellationToken,
    locale: &Locale,
    href: &str,
) -> Result<ParameterSet> {
    let query = vec![(PAGE_SIZE_KEY.to_string(), "1".to_string())];
    let url = build_url(&locale.base_url(), href, &query);

    let html = fetch_or_cancel(fetcher, cancel, href, &query).await?;
    match classify_expecting(&html, &url, PageShape::FilterInterface)? {
        ClassifiedPage::FilterInterface(params) => Ok(params),
        other => Err(Error::UnrecognizedPageShape {
            url,
            expected: "FilterInterface".to_string(),
            observed: other.shape().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::params::{FilterValue, PAGE_KEY, RESULTS_PER_PAGE};
    use crate::testing::{self, page_param, results_page, MockFetch, DETAIL, FILTERS, LISTING};
    use std::time::Duration;
    use tempfile::TempDir;

    const TH: &str = "Resistors/Through Hole Resistors";

    /// Serves the index, a filter form for unpaged requests, and results otherwise.
    fn catalog() -> MockFetch {
        MockFetch::new(|path, query| {
            if path == "products/en" {
                Ok(LISTING.to_string())
            } else if !query.iter().any(|(k, _)| k == PAGE_KEY) {
                Ok(FILTERS.to_string())
            } else {
                Ok(results_page(0, 3, page_param(query), 1))
            }
        })
    }

    async fn ready_session() -> Session {
        let mut session = Session::new(Arc::new(catalog()));
        session.init_groups().await.unwrap();
        session.init_params(TH).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_init_groups_builds_graph() {
        let mut session = Session::new(Arc::new(catalog()));
        assert!(session.graph().is_empty());

        session.init_groups().await.unwrap();
        assert_eq!(session.groups().len(), 2);
        assert_eq!(session.graph().category_count(), 3);
        assert_eq!(session.lookup_category(TH).unwrap().id, "53");
    }

    #[tokio::test]
    async fn test_init_groups_failure_keeps_previous_graph() {
        let mut session = ready_session().await;
        let before = session.graph().clone();

        session.fetcher = Arc::new(MockFetch::fixed(DETAIL));
        match session.init_groups().await.unwrap_err() {
            Error::TopologyFetch(source) => {
                assert!(matches!(*source, Error::UnrecognizedPageShape { .. }))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(session.graph(), &before);

        session.fetcher = Arc::new(MockFetch::new(|path, _| Err(testing::transport_error(path))));
        assert!(matches!(session.init_groups().await, Err(Error::TopologyFetch(_))));
        assert_eq!(session.graph(), &before);
    }

    #[tokio::test]
    async fn test_init_groups_keeps_ready_params() {
        let mut session = ready_session().await;
        session.init_groups().await.unwrap();
        assert!(session.lookup_category(TH).unwrap().params.is_ready());
    }

    #[tokio::test]
    async fn test_lookup_unknown_category() {
        let session = ready_session().await;
        match session.lookup_category("Not/A/Real/Path").unwrap_err() {
            Error::UnknownCategory(path) => assert_eq!(path, "Not/A/Real/Path"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_categories_matching() {
        let mut session = Session::new(Arc::new(catalog()));
        session.init_groups().await.unwrap();
        let found = session.categories_matching("resistor");
        assert_eq!(found.len(), 2);
        assert!(session.categories_matching("inductor").is_empty());
    }

    #[tokio::test]
    async fn test_init_params_ready() {
        let mut session = Session::new(Arc::new(catalog()));
        session.init_groups().await.unwrap();
        let params = session.init_params(TH).await.unwrap();

        assert_eq!(params.len(), 2);
        assert!(params.get("Resistance").is_some());
        assert!(session.lookup_category(TH).unwrap().params.is_ready());
        assert_eq!(
            session.lookup_category("Resistors/Chip Resistor - Surface Mount").unwrap().params,
            ParamState::Uninitialized
        );
    }

    #[tokio::test]
    async fn test_init_params_failure_is_terminal() {
        let mut session = Session::new(Arc::new(catalog()));
        session.init_groups().await.unwrap();
        session.fetcher = Arc::new(MockFetch::fixed(LISTING));

        let err = session.init_params(TH).await.unwrap_err();
        assert!(matches!(err, Error::UnrecognizedPageShape { .. }));
        assert!(matches!(session.lookup_category(TH).unwrap().params, ParamState::Failed(_)));

        session.fetcher = Arc::new(catalog());
        assert!(matches!(
            session.init_params(TH).await,
            Err(Error::ParametersNotInitialized { .. })
        ));
        assert!(matches!(
            session.search(TH, &FilterMap::new()),
            Err(Error::ParametersNotInitialized { .. })
        ));
    }

    #[tokio::test]
    async fn test_init_params_cancelled_returns_to_uninitialized() {
        let mut session = Session::new(Arc::new(catalog()));
        session.init_groups().await.unwrap();
        session.fetcher = Arc::new(catalog().with_delay(Duration::from_secs(30)));

        let trigger = session.cancel_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = session.init_params(TH).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(session.lookup_category(TH).unwrap().params, ParamState::Uninitialized);
    }

    #[tokio::test]
    async fn test_init_params_dropped_mid_fetch_is_not_stuck() {
        let mut session = Session::new(Arc::new(catalog()));
        session.init_groups().await.unwrap();
        session.fetcher = Arc::new(catalog().with_delay(Duration::from_millis(200)));

        let abandoned = tokio::time::timeout(Duration::from_millis(10), session.init_params(TH)).await;
        assert!(abandoned.is_err());
        assert_eq!(session.lookup_category(TH).unwrap().params, ParamState::Uninitialized);

        // A later attempt runs to completion
        let params = session.init_params(TH).await.unwrap();
        assert!(session.lookup_category(TH).unwrap().params.is_ready());

        // Abandoning a refresh keeps the parameters already discovered
        let abandoned = tokio::time::timeout(Duration::from_millis(10), session.init_params(TH)).await;
        assert!(abandoned.is_err());
        assert_eq!(session.lookup_category(TH).unwrap().params, ParamState::Ready(params));
    }

    #[tokio::test]
    async fn test_search_carries_requested_quantity() {
        let session = ready_session().await;
        assert_eq!(session.search(TH, &FilterMap::new()).unwrap().quantity(), None);

        let with_quantity = FILTERS.replace(
            "</div>",
            r#"<input type="number" id="qty" name="quantity" min="0" placeholder="Enter Quantity"></div>"#,
        );
        let mut session = Session::new(Arc::new(MockFetch::new(move |path, query| {
            if path == "products/en" {
                Ok(LISTING.to_string())
            } else if !query.iter().any(|(k, _)| k == PAGE_KEY) {
                Ok(with_quantity.clone())
            } else {
                Ok(results_page(0, 3, 1, 1))
            }
        })));
        session.init_groups().await.unwrap();
        session.init_params(TH).await.unwrap();

        let filters = FilterMap::from([("Quantity".to_string(), FilterValue::scalar("10"))]);
        assert_eq!(session.search(TH, &filters).unwrap().quantity(), Some(10));
        assert_eq!(session.search(TH, &FilterMap::new()).unwrap().quantity(), Some(1));
    }

    #[tokio::test]
    async fn test_init_params_unknown_category() {
        let mut session = ready_session().await;
        assert!(matches!(
            session.init_params("Not/A/Real/Path").await,
            Err(Error::UnknownCategory(_))
        ));
    }

    #[tokio::test]
    async fn test_search_requires_ready_params() {
        let mut session = Session::new(Arc::new(catalog()));
        session.init_groups().await.unwrap();

        let filters = FilterMap::from([("Resistance".to_string(), FilterValue::choices(["1 kOhms"]))]);
        for filters in [FilterMap::new(), filters] {
            match session.search(TH, &filters).unwrap_err() {
                Error::ParametersNotInitialized { category, state } => {
                    assert_eq!(category, TH);
                    assert_eq!(state, "uninitialized");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_search_rejects_bad_filters_before_fetching() {
        let fetcher = Arc::new(catalog());
        let mut session = Session::new(fetcher.clone());
        session.init_groups().await.unwrap();
        session.init_params(TH).await.unwrap();
        let calls = fetcher.call_count();

        let filters =
            FilterMap::from([("Resistance".to_string(), FilterValue::choices(["9999 Exaohms"]))]);
        assert!(matches!(session.search(TH, &filters), Err(Error::InvalidFilterValue { .. })));

        let filters = FilterMap::from([("Colour".to_string(), FilterValue::scalar("red"))]);
        assert!(matches!(session.search(TH, &filters), Err(Error::UnknownFilterKey { .. })));

        assert!(matches!(
            session.search("Not/A/Real/Path", &FilterMap::new()),
            Err(Error::UnknownCategory(_))
        ));
        assert_eq!(fetcher.call_count(), calls);
    }

    #[tokio::test]
    async fn test_search_encodes_filters_and_page_size() {
        let session = ready_session().await.with_page_size(50);

        let search = session.search(TH, &FilterMap::new()).unwrap();
        assert_eq!(search.page_size(), 50);
        assert!(search.query().contains(&("stock".to_string(), "1".to_string())));

        let filters = FilterMap::from([
            ("Resistance".to_string(), FilterValue::choices(["1 kOhms", "10 kOhms"])),
            (RESULTS_PER_PAGE.to_string(), FilterValue::scalar("100")),
        ]);
        let search = session.search(TH, &filters).unwrap();
        assert_eq!(search.page_size(), 100);
        let resistance: Vec<&str> = search
            .query()
            .iter()
            .filter(|(k, _)| k == "pv2085")
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(resistance, vec!["1001", "1002"]);

        let products = search.collect_all().await.unwrap();
        assert_eq!(products.len(), 3);
    }

    #[tokio::test]
    async fn test_cache_miss_then_hit() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::for_locale(dir.path(), &Locale::default());

        let (mut first, used) = Session::restore_or_init(Arc::new(catalog()), Some(store.clone()));
        assert!(!used);
        assert!(first.graph().is_empty());
        first.init_groups().await.unwrap();
        first.init_params(TH).await.unwrap();
        assert!(first.save_cache().unwrap());

        let (second, used) = Session::restore_or_init(Arc::new(catalog()), Some(store));
        assert!(used);
        assert_eq!(second.graph(), first.graph());
        assert!(second.lookup_category(TH).unwrap().params.is_ready());
        assert!(second.search(TH, &FilterMap::new()).is_ok());
    }

    #[tokio::test]
    async fn test_serialize_is_idempotent() {
        let session = ready_session().await;
        let a = session.serialize();
        let b = session.serialize();
        assert_eq!(a, b);
        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
    }

    #[tokio::test]
    async fn test_restore_without_cache() {
        let (session, used) = Session::restore_or_init(Arc::new(catalog()), None);
        assert!(!used);
        assert!(!session.save_cache().unwrap());
    }
}
