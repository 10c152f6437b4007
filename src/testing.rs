//! Canned-page fetcher and markup builders shared by unit tests.

use crate::catalog::client::CatalogFetch;
use crate::catalog::locale::Locale;
use crate::catalog::params::PAGE_KEY;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

type Responder = Box<dyn Fn(&str, &[(String, String)]) -> Result<String> + Send + Sync>;

/// Serves pages from a closure and records every request.
pub struct MockFetch {
    locale: Locale,
    responder: Responder,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl MockFetch {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &[(String, String)]) -> Result<String> + Send + Sync + 'static,
    {
        Self { locale: Locale::default(), responder: Box::new(responder), delay: None, calls: Mutex::new(Vec::new()) }
    }

    /// Serves the same markup for every request.
    pub fn fixed(html: impl Into<String>) -> Self {
        let html = html.into();
        Self::new(move |_, _| Ok(html.clone()))
    }

    /// Sleeps before every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CatalogFetch for MockFetch {
    async fn fetch(&self, path: &str, query: &[(String, String)]) -> Result<String> {
        self.calls.lock().unwrap().push((path.to_string(), query.to_vec()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(path, query)
    }

    fn locale(&self) -> &Locale {
        &self.locale
    }
}

/// The requested page number, defaulting to 1.
pub fn page_param(query: &[(String, String)]) -> u32 {
    query.iter().find(|(k, _)| k == PAGE_KEY).and_then(|(_, v)| v.parse().ok()).unwrap_or(1)
}

pub fn transport_error(path: &str) -> Error {
    Error::transport(path, "status 500 Internal Server Error", true)
}

pub const LISTING: &str = r#"<html><head><title>Products</title></head><body>
    <div id="productIndexList">
        <h2><a href="/products/en/resistors/2">Resistors</a></h2>
        <ul>
            <li><a href="/products/en/resistors/chip-resistor-surface-mount/52">Chip Resistor - Surface Mount</a> (612,345 items)</li>
            <li><a href="/products/en/resistors/through-hole-resistors/53">Through Hole Resistors</a> (150,012 items)</li>
        </ul>
        <h2><a href="/products/en/capacitors/3">Capacitors</a></h2>
        <ul>
            <li><a href="/products/en/capacitors/ceramic-capacitors/60">Ceramic Capacitors</a> (800,001 items)</li>
        </ul>
    </div></body></html>"#;

/// A `pageSize=1` category page: filter controls above a one-row result table.
pub const FILTERS: &str = r#"<html><body><div id="filters-group">
    <span class="filters-headline">Resistance</span>
    <select class="filter-selectors" name="pv2085" multiple>
        <option value="1001">1 kOhms</option>
        <option value="1002">10 kOhms</option>
    </select>
    <input type="checkbox" id="stock" name="stock" checked><label for="stock">In Stock</label>
</div>
<table id="productTable">
    <thead id="tblhead"><tr><th class="th-dkPartNumber">Digi-Key Part Number</th></tr></thead>
    <tbody id="lnkPart"><tr><td class="tr-dkPartNumber">P0-ND</td></tr></tbody>
</table>
<span class="current-page">Page 1/40</span></body></html>"#;

pub const DETAIL: &str = r#"<html><body><table id="product-attribute-table">
    <tr class="tr-dkPartNumber"><th>Digi-Key Part Number</th><td>P0-ND</td></tr>
    <tr class="tr-vendor"><th>Manufacturer</th><td>Vendor 0</td></tr>
</table></body></html>"#;

/// A result table page holding part numbers `P{first}-ND` .. for `count` rows.
pub fn results_page(first: usize, count: usize, page: u32, total_pages: u32) -> String {
    let mut html = String::from(
        r#"<html><body><table id="productTable">
        <thead id="tblhead"><tr>
            <th class="th-dkPartNumber">Digi-Key Part Number</th>
            <th class="th-vendor">Manufacturer</th>
        </tr></thead><tbody id="lnkPart">"#,
    );
    for i in first..first + count {
        html.push_str(&format!(
            r#"<tr><td class="tr-dkPartNumber">P{i}-ND</td><td class="tr-vendor">Vendor {i}</td></tr>"#
        ));
    }
    html.push_str(&format!(
        r#"</tbody></table><span class="current-page">Page {page}/{total_pages}</span></body></html>"#
    ));
    html
}

/// The requested page of `total` products split into pages of `page_size`.
pub fn paginated_page(total: usize, page_size: usize, query: &[(String, String)]) -> String {
    let pages = total.div_ceil(page_size).max(1) as u32;
    let page = page_param(query);
    let first = (page as usize - 1) * page_size;
    let count = page_size.min(total.saturating_sub(first));
    results_page(first, count, page, pages)
}

/// Serves `total` products split into pages of `page_size`.
pub fn paginated(total: usize, page_size: usize) -> MockFetch {
    MockFetch::new(move |_, query| Ok(paginated_page(total, page_size, query)))
}
