//! Lazy, paginated product search over one category.

use crate::catalog::classify::{classify, ClassifiedPage};
use crate::catalog::client::{build_url, fetch_or_cancel, CatalogFetch};
use crate::catalog::models::Product;
use crate::catalog::params::{PAGE_KEY, PAGE_SIZE_KEY};
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A single-consumer cursor over the products matching a filtered search.
///
/// Pages are fetched only when the buffered products run out. The first
/// failure ends the search: it is returned as [`Error::SearchInterrupted`]
/// and every later call yields `Ok(None)`. Products already returned stay
/// valid. A search cannot be restarted; call `Session::search` again.
///
/// When the query carries an order quantity, rows whose minimum order
/// quantity exceeds it are dropped; the catalog lists them regardless.
pub struct ProductSearch {
    fetcher: Arc<dyn CatalogFetch>,
    cancel: CancellationToken,
    category: String,
    href: String,
    query: Vec<(String, String)>,
    page_size: u32,
    next_page: Option<u32>,
    buffer: VecDeque<Product>,
    yielded: usize,
    skipped: usize,
    quantity: Option<u64>,
    total_pages: Option<u32>,
}

impl ProductSearch {
    pub(crate) fn new(
        fetcher: Arc<dyn CatalogFetch>,
        cancel: CancellationToken,
        category: impl Into<String>,
        href: impl Into<String>,
        query: Vec<(String, String)>,
        page_size: u32,
    ) -> Self {
        Self {
            fetcher,
            cancel,
            category: category.into(),
            href: href.into(),
            query,
            page_size,
            next_page: Some(1),
            buffer: VecDeque::new(),
            yielded: 0,
            skipped: 0,
            quantity: None,
            total_pages: None,
        }
    }

    /// Drops rows that cannot be ordered in `quantity` units.
    pub(crate) fn with_quantity(mut self, quantity: Option<u64>) -> Self {
        self.quantity = quantity;
        self
    }

    /// Keeps every row regardless of its minimum order quantity.
    pub fn without_quantity_filter(mut self) -> Self {
        self.quantity = None;
        self
    }

    /// Order quantity rows are checked against, if any.
    pub fn quantity(&self) -> Option<u64> {
        self.quantity
    }

    /// Rows dropped so far for a minimum order above the requested quantity.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Path of the category being searched.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Encoded filter pairs sent with every page request.
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of products returned so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Total page count, known once the first page has been fetched.
    pub fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }

    /// True once no further products will be returned.
    pub fn is_finished(&self) -> bool {
        self.buffer.is_empty() && self.next_page.is_none()
    }

    /// Returns the next product, fetching the next page if the buffer is empty.
    pub async fn next(&mut self) -> Result<Option<Product>> {
        loop {
            if let Some(product) = self.buffer.pop_front() {
                self.yielded += 1;
                return Ok(Some(product));
            }

            let Some(page) = self.next_page.take() else {
                return Ok(None);
            };

            if let Err(source) = self.load_page(page).await {
                return Err(Error::SearchInterrupted {
                    page,
                    yielded: self.yielded,
                    source: Box::new(source),
                });
            }
        }
    }

    /// Drains up to `max` products.
    ///
    /// On failure the products gathered so far are dropped along with the
    /// error; use [`ProductSearch::next`] to keep partial results.
    pub async fn take(&mut self, max: usize) -> Result<Vec<Product>> {
        let mut products = Vec::new();
        while products.len() < max {
            match self.next().await? {
                Some(product) => products.push(product),
                None => break,
            }
        }
        Ok(products)
    }

    /// Drains every remaining product.
    pub async fn collect_all(mut self) -> Result<Vec<Product>> {
        self.take(usize::MAX).await
    }

    async fn load_page(&mut self, page: u32) -> Result<()> {
        let mut query = self.query.clone();
        query.push((PAGE_SIZE_KEY.to_string(), self.page_size.to_string()));
        query.push((PAGE_KEY.to_string(), page.to_string()));

        let url = build_url(&self.fetcher.locale().base_url(), &self.href, &query);
        if page == 1 {
            info!("Searching {} ({} filter values)", self.category, self.query.len());
        }
        debug!("Fetching result page {} of {}", page, self.category);

        let html = fetch_or_cancel(self.fetcher.as_ref(), &self.cancel, &self.href, &query).await?;

        match classify(&html, &url)? {
            ClassifiedPage::ProductListing(result) => {
                if result.page != page {
                    return Err(Error::UnrecognizedPageShape {
                        url,
                        expected: format!("ProductListing page {}", page),
                        observed: format!("ProductListing page {}", result.page),
                    });
                }
                debug!(
                    "Page {}/{} of {} holds {} products",
                    result.page,
                    result.total_pages,
                    self.category,
                    result.products.len()
                );
                self.total_pages = Some(result.total_pages);
                self.next_page = result.next_page;
                self.accept(result.products);
            }
            // A search matching exactly one product renders its detail page.
            ClassifiedPage::SingleProduct(product) if page == 1 => {
                debug!("Single product result for {}", self.category);
                self.total_pages = Some(1);
                self.accept(vec![product]);
            }
            other => {
                return Err(Error::UnrecognizedPageShape {
                    url,
                    expected: "ProductListing or SingleProduct".to_string(),
                    observed: other.shape().to_string(),
                })
            }
        }
        Ok(())
    }

    fn accept(&mut self, products: Vec<Product>) {
        for product in products {
            match (self.quantity, product.minimum_quantity()) {
                (Some(quantity), Some(minimum)) if minimum > quantity => {
                    debug!(
                        "Dropping {} with minimum order {} above {}",
                        product.part_number().unwrap_or("<unnumbered>"),
                        minimum,
                        quantity
                    );
                    self.skipped += 1;
                }
                _ => self.buffer.push_back(product),
            }
        }
    }
}
