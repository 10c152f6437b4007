//! Page classifier: decides which shape a fetched catalog page has and extracts its data.
//!
//! Detection is structural. The same URL can render as a category listing, a
//! filter form, a result table, or a single product depending on how many
//! categories or products match, so nothing here looks at the URL except to
//! label errors. A page that matches no known shape, or more than one, is an
//! error; there is no fallback guess.

use crate::catalog::models::{Attribute, Category, Group, Product, LINK};
use crate::catalog::params::{FilterValue, ParameterSet, ParameterSpec, SpecKind, QUANTITY_KEY, SORT_KEY};
use crate::catalog::selectors::{cells, detail, filters, listing, results, PAGE_TITLE};
use crate::error::{Error, Result};
use regex_lite::Regex;
use scraper::{ElementRef, Html};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::LazyLock;
use tracing::{debug, trace, warn};

static ITEM_COUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(\s*([\d,.\s]+)").unwrap());
static PAGE_OF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d[\d,.]*)\s*/\s*(\d[\d,.]*)\s*$").unwrap());
static SORT_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"sort\(([0-9-]+)\);").unwrap());

/// Wire value of the part status option that means "Active" in every language.
const ACTIVE_STATUS: &str = "0";

/// The four page shapes the catalog serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageShape {
    CategoryListing,
    FilterInterface,
    ProductListing,
    SingleProduct,
}

impl fmt::Display for PageShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageShape::CategoryListing => "CategoryListing",
            PageShape::FilterInterface => "FilterInterface",
            PageShape::ProductListing => "ProductListing",
            PageShape::SingleProduct => "SingleProduct",
        };
        write!(f, "{}", name)
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductPage {
    pub products: Vec<Product>,
    /// 1-based index of this page.
    pub page: u32,
    pub total_pages: u32,
    /// Index of the following page, if there is one.
    pub next_page: Option<u32>,
}

/// A classified page with its shape-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedPage {
    CategoryListing(Vec<Group>),
    FilterInterface(ParameterSet),
    ProductListing(ProductPage),
    SingleProduct(Product),
}

impl ClassifiedPage {
    pub fn shape(&self) -> PageShape {
        match self {
            ClassifiedPage::CategoryListing(_) => PageShape::CategoryListing,
            ClassifiedPage::FilterInterface(_) => PageShape::FilterInterface,
            ClassifiedPage::ProductListing(_) => PageShape::ProductListing,
            ClassifiedPage::SingleProduct(_) => PageShape::SingleProduct,
        }
    }
}

/// Classifies raw page markup fetched from `url`.
pub fn classify(html: &str, url: &str) -> Result<ClassifiedPage> {
    let document = Html::parse_document(html);
    classify_document(&document, url, None)
}

/// Classifies markup fetched for a known purpose.
///
/// Parameter discovery requests a one-row result page, which carries the
/// filter controls next to the product table. When `expected` is
/// [`PageShape::FilterInterface`] that pairing reads as a filter interface, and
/// the table contributes the sort columns and the part status default. Any
/// other combination classifies exactly as [`classify`] does.
pub fn classify_expecting(html: &str, url: &str, expected: PageShape) -> Result<ClassifiedPage> {
    let document = Html::parse_document(html);
    classify_document(&document, url, Some(expected))
}

/// Classifies an already parsed document.
///
/// Exactly one of the listing index, the result table (or its no-results
/// marker), and the detail table must be present. With none of them, a lone
/// filter container is a filter interface. Result pages also carry the filter
/// container; it only outranks results when a filter interface is expected.
pub fn classify_document(document: &Html, url: &str, expected: Option<PageShape>) -> Result<ClassifiedPage> {
    let has_listing = document.select(&listing::INDEX).next().is_some();
    let has_results = document.select(&results::TABLE).next().is_some()
        || document.select(&results::NO_RESULTS).next().is_some();
    let has_detail = document.select(&detail::TABLE).next().is_some();
    let has_filters = document.select(&filters::CONTAINER).next().is_some();

    let primary = [
        (has_listing, PageShape::CategoryListing),
        (has_results, PageShape::ProductListing),
        (has_detail, PageShape::SingleProduct),
    ];
    let found: Vec<PageShape> =
        primary.iter().filter(|(present, _)| *present).map(|(_, shape)| *shape).collect();

    let shape = match found.as_slice() {
        [PageShape::ProductListing] if has_filters && expected == Some(PageShape::FilterInterface) => {
            PageShape::FilterInterface
        }
        [shape] => *shape,
        [] if has_filters => PageShape::FilterInterface,
        [] => {
            return Err(unrecognized(url, "any known page shape", describe(document, has_filters, &found)))
        }
        _ => {
            return Err(unrecognized(
                url,
                "exactly one page shape",
                describe(document, has_filters, &found),
            ))
        }
    };

    debug!("Classified {} as {}", url, shape);

    let page = match shape {
        PageShape::CategoryListing => ClassifiedPage::CategoryListing(parse_listing(document, url)?),
        PageShape::FilterInterface => ClassifiedPage::FilterInterface(parse_filters(document, url)?),
        PageShape::ProductListing => ClassifiedPage::ProductListing(parse_results(document, url)?),
        PageShape::SingleProduct => ClassifiedPage::SingleProduct(parse_detail(document, url)?),
    };
    Ok(page)
}

fn unrecognized(url: &str, expected: impl Into<String>, observed: impl Into<String>) -> Error {
    Error::UnrecognizedPageShape {
        url: url.to_string(),
        expected: expected.into(),
        observed: observed.into(),
    }
}

fn malformed(url: &str, shape: PageShape, detail: impl fmt::Display) -> Error {
    unrecognized(url, format!("well-formed {}", shape), format!("malformed {}: {}", shape, detail))
}

/// Summarizes what a page looked like, for error context.
fn describe(document: &Html, has_filters: bool, found: &[PageShape]) -> String {
    let title = document
        .select(&PAGE_TITLE)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "<no title>".to_string());

    let mut markers: Vec<String> = found.iter().map(|s| s.to_string()).collect();
    if has_filters {
        markers.push("filter controls".to_string());
    }
    let markers = if markers.is_empty() { "none".to_string() } else { markers.join(", ") };

    format!("page titled {:?} with markers [{}]", title, markers)
}

/// Whitespace-collapsed text content of an element.
fn text_of(element: ElementRef) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

/// Whitespace-collapsed text of an element's own text nodes, excluding children.
fn own_text(element: ElementRef) -> String {
    element
        .children()
        .filter_map(|node| node.value().as_text())
        .flat_map(|t| t.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Direct child elements named `tag`; nested tables never leak into a row.
fn child_elements<'a>(element: ElementRef<'a>, tag: &'static str) -> impl Iterator<Item = ElementRef<'a>> {
    element.children().filter_map(ElementRef::wrap).filter(move |e| e.value().name() == tag)
}

/// Last two path segments of a catalog href: (slug, id).
fn href_slug_id(href: &str) -> Option<(String, String)> {
    let path = href.split(|c: char| c == '?' || c == '#').next()?.trim_end_matches('/');
    let mut segments = path.rsplit('/');
    let id = segments.next().filter(|s| !s.is_empty())?;
    let slug = segments.next().filter(|s| !s.is_empty())?;
    Some((slug.to_string(), id.to_string()))
}

fn parse_count(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

// Category listing

fn parse_listing(document: &Html, url: &str) -> Result<Vec<Group>> {
    let shape = PageShape::CategoryListing;
    let mut groups = Vec::new();

    for head in document.select(&listing::GROUP_HEAD) {
        let link = head
            .select(&listing::LINK)
            .next()
            .ok_or_else(|| malformed(url, shape, "group heading without a link"))?;
        let href = link.value().attr("href").unwrap_or_default().to_string();
        let (slug, id) = href_slug_id(&href)
            .ok_or_else(|| malformed(url, shape, format!("group link {:?} has no id", href)))?;
        let title = text_of(head);

        let list = head
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .next()
            .filter(|e| e.value().name() == "ul")
            .ok_or_else(|| malformed(url, shape, format!("group {:?} has no category list", title)))?;

        let mut categories = Vec::new();
        for item in list.select(&listing::CATEGORY_ITEM) {
            let Some(link) = item.select(&listing::LINK).next() else {
                trace!("Skipping category entry without link in {}", title);
                continue;
            };
            let href = link.value().attr("href").unwrap_or_default().to_string();
            let (_, cat_id) = href_slug_id(&href)
                .ok_or_else(|| malformed(url, shape, format!("category link {:?} has no id", href)))?;
            let size = ITEM_COUNT
                .captures(&own_text(item))
                .and_then(|c| c.get(1))
                .and_then(|m| parse_count(m.as_str()));

            categories.push(Category::new(&title, cat_id, text_of(link), href, size));
        }

        trace!("Parsed group {} with {} categories", title, categories.len());
        groups.push(Group { id, slug, title, href, categories });
    }

    if groups.is_empty() {
        return Err(malformed(url, shape, "no groups"));
    }

    debug!(
        "Parsed {} groups, {} categories",
        groups.len(),
        groups.iter().map(|g| g.categories.len()).sum::<usize>()
    );
    Ok(groups)
}

// Filter interface

fn parse_filters(document: &Html, url: &str) -> Result<ParameterSet> {
    let shape = PageShape::FilterInterface;
    let mut set = ParameterSet::new();

    let Some(container) = document.select(&filters::CONTAINER).next() else {
        return Err(malformed(url, shape, "filter container vanished"));
    };

    let headlines: Vec<String> = container.select(&filters::HEADLINE).map(text_of).collect();
    let selects: Vec<ElementRef> = container.select(&filters::SELECT).collect();
    if headlines.len() != selects.len() {
        return Err(malformed(
            url,
            shape,
            format!("{} filter headlines for {} filter selectors", headlines.len(), selects.len()),
        ));
    }

    let table = document.select(&results::TABLE).next();
    let columns = table.map(columns_of).unwrap_or_default();
    let status_title = table.and_then(|t| part_status_title(t, &columns));

    for (title, select) in headlines.into_iter().zip(selects) {
        if title.is_empty() {
            return Err(malformed(url, shape, "filter selector without a headline"));
        }
        let mut spec = choice_spec(&title, select)
            .ok_or_else(|| malformed(url, shape, format!("filter {:?} has no options", title)))?;
        if status_title.as_deref() == Some(title.as_str()) {
            spec = with_active_status(spec);
        }
        add_spec(&mut set, spec, url);
    }

    if let Some(spec) = table.and_then(|t| sort_spec(t, &columns)) {
        add_spec(&mut set, spec, url);
    }

    for spec in control_specs(document, table) {
        add_spec(&mut set, spec, url);
    }

    if set.is_empty() {
        return Err(malformed(url, shape, "no search parameters"));
    }
    debug!("Parsed {} search parameters", set.len());
    Ok(set)
}

fn add_spec(set: &mut ParameterSet, spec: ParameterSpec, url: &str) {
    trace!("Discovered parameter {} ({})", spec.title, spec.name);
    let title = spec.title.clone();
    if !set.insert(spec) {
        warn!("Duplicate filter title {:?} at {}; keeping the first", title, url);
    }
}

fn choice_spec(title: &str, select: ElementRef) -> Option<ParameterSpec> {
    let name = select.value().attr("name")?;
    let mut options = BTreeMap::new();
    let mut selected = BTreeSet::new();
    for option in select.select(&filters::OPTION) {
        let label = text_of(option);
        let value = option.value().attr("value").unwrap_or_default();
        if option.value().attr("selected").is_some() {
            selected.insert(label.clone());
        }
        options.entry(label).or_insert_with(|| value.to_string());
    }
    if options.is_empty() {
        return None;
    }

    let spec = ParameterSpec::new(title, name, SpecKind::Choice { options });
    Some(if selected.is_empty() { spec } else { spec.with_default(FilterValue::Choices(selected)) })
}

/// Defaults the part status filter to active parts.
fn with_active_status(spec: ParameterSpec) -> ParameterSpec {
    let active = match &spec.kind {
        SpecKind::Choice { options } => {
            options.iter().find(|(_, code)| code.as_str() == ACTIVE_STATUS).map(|(label, _)| label.clone())
        }
        _ => None,
    };
    match active {
        Some(label) => spec.with_default(FilterValue::choices([label])),
        None => spec,
    }
}

/// Title of the column whose first row carries the part status marker.
fn part_status_title(table: ElementRef, columns: &[Column]) -> Option<String> {
    let row = table.select(&results::ROW).next()?;
    columns
        .iter()
        .zip(child_elements(row, "td"))
        .find(|(_, cell)| cell.select(&results::PART_STATUS).next().is_some())
        .map(|(column, _)| column.title.clone())
}

/// Result ordering from the table's sort row; defaults to ascending unit price.
fn sort_spec(table: ElementRef, columns: &[Column]) -> Option<ParameterSpec> {
    let mut sortable = BTreeMap::new();
    for (column, cell) in columns.iter().zip(table.select(&results::SORT_CELL)) {
        let code = cell
            .select(&results::SORT_BUTTON)
            .next()
            .and_then(|button| button.value().attr("onclick"))
            .and_then(|js| SORT_CODE.captures(js))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<i64>().ok());
        match code {
            Some(code) if code > 0 => {
                sortable.entry(column.title.clone()).or_insert(code);
            }
            Some(code) => trace!("Ignoring non-ascending sort code {} for {}", code, column.title),
            None => {}
        }
    }
    if sortable.is_empty() {
        return None;
    }

    let directions: Vec<&str> = table
        .select(&results::SORT_ICON)
        .filter_map(|img| img.value().attr("alt"))
        .map(str::trim)
        .filter(|alt| !alt.is_empty())
        .take(2)
        .collect();
    let title = if directions.is_empty() { SORT_KEY.to_string() } else { directions.join("/") };

    let default = columns
        .iter()
        .find(|c| c.name == "unitPrice" && sortable.contains_key(&c.title))
        .map(|c| FilterValue::scalar(c.title.as_str()));
    let spec = ParameterSpec::new(title, SORT_KEY, SpecKind::Sort { columns: sortable });
    Some(match default {
        Some(default) => spec.with_default(default),
        None => spec,
    })
}

/// Labelled stock, media, and compliance flags plus the quantity and keyword inputs.
///
/// Controls inside the product table (row comparison boxes) are not parameters.
fn control_specs(document: &Html, table: Option<ElementRef>) -> Vec<ParameterSpec> {
    let labels: HashMap<&str, String> = document
        .select(&filters::LABEL)
        .filter_map(|label| Some((label.value().attr("for")?, text_of(label))))
        .filter(|(_, text)| !text.is_empty())
        .collect();

    let in_table = |input: &ElementRef| table.is_some_and(|t| input.ancestors().any(|a| a.id() == t.id()));
    let label_of = |input: &ElementRef| {
        let value = input.value();
        value
            .id()
            .and_then(|id| labels.get(id))
            .or_else(|| value.attr("name").and_then(|name| labels.get(name)))
            .cloned()
    };

    let mut specs = Vec::new();

    for input in document.select(&filters::CHECKBOX).filter(|i| !in_table(i)) {
        let Some(title) = label_of(&input) else {
            trace!("Skipping unlabelled checkbox {:?}", input.value().attr("name"));
            continue;
        };
        let name = input.value().attr("name").unwrap_or_default();
        let off_name = filters::NEGATED_FLAGS
            .iter()
            .find(|(on, _)| *on == name)
            .map(|(_, off)| off.to_string());
        let spec = ParameterSpec::new(title, name, SpecKind::Flag { off_name });
        specs.push(if input.value().attr("checked").is_some() {
            spec.with_default(FilterValue::from(true))
        } else {
            spec
        });
    }

    for input in document.select(&filters::NUMBER).filter(|i| !in_table(i)) {
        let Some(title) = label_of(&input).or_else(|| placeholder_title(input)) else {
            continue;
        };
        let name = input.value().attr("name").unwrap_or_default();
        let attr = |n: &str| input.value().attr(n).and_then(|v| v.trim().parse::<i64>().ok());
        let spec = with_value_default(
            ParameterSpec::new(title, name, SpecKind::Range { min: attr("min"), max: attr("max") }),
            input,
        );
        specs.push(if spec.default.is_none() && name == QUANTITY_KEY {
            spec.with_default(FilterValue::scalar("1"))
        } else {
            spec
        });
    }

    for input in document.select(&filters::TEXT).filter(|i| !in_table(i)) {
        let Some(title) = label_of(&input) else {
            continue;
        };
        let name = input.value().attr("name").unwrap_or_default();
        specs.push(with_value_default(ParameterSpec::new(title, name, SpecKind::Text), input));
    }

    specs
}

/// "Enter Quantity" titles its input "Quantity".
fn placeholder_title(input: ElementRef) -> Option<String> {
    let placeholder = input.value().attr("placeholder")?.trim();
    placeholder.rsplit(' ').next().filter(|w| !w.is_empty()).map(String::from)
}

fn with_value_default(spec: ParameterSpec, input: ElementRef) -> ParameterSpec {
    match input.value().attr("value").map(str::trim) {
        Some(v) if !v.is_empty() => spec.with_default(FilterValue::scalar(v)),
        _ => spec,
    }
}

// Product listing

/// Column of the result table: stable name and display title.
struct Column {
    name: String,
    title: String,
}

fn class_name(element: ElementRef, prefix: &str) -> Option<String> {
    element
        .value()
        .classes()
        .find_map(|c| c.strip_prefix(prefix))
        .filter(|n| !n.is_empty())
        .map(String::from)
}

fn columns_of(table: ElementRef) -> Vec<Column> {
    table
        .select(&results::HEAD)
        .map(|th| {
            let title = text_of(th);
            let name = class_name(th, "th-").unwrap_or_else(|| title.clone());
            let title = if title.is_empty() { name.clone() } else { title };
            Column { name, title }
        })
        .collect()
}

fn parse_results(document: &Html, url: &str) -> Result<ProductPage> {
    let shape = PageShape::ProductListing;

    let Some(table) = document.select(&results::TABLE).next() else {
        debug!("No-results marker at {}", url);
        return Ok(ProductPage { products: Vec::new(), page: 1, total_pages: 1, next_page: None });
    };

    let columns = columns_of(table);
    if columns.is_empty() {
        return Err(malformed(url, shape, "result table without column heads"));
    }

    let mut products = Vec::new();
    for (row_index, row) in table.select(&results::ROW).enumerate() {
        let mut attributes = Vec::new();
        for (column, cell) in columns.iter().zip(child_elements(row, "td")) {
            let name = class_name(cell, "tr-").unwrap_or_else(|| column.name.clone());
            push_cell(&mut attributes, name, &column.title, cell);
        }
        if attributes.is_empty() {
            trace!("Skipping empty result row {}", row_index);
            continue;
        }
        products.push(Product::new(attributes));
    }

    let (page, total_pages) = match document.select(&results::CURRENT_PAGE).next() {
        Some(span) => {
            let text = text_of(span);
            let caps = PAGE_OF
                .captures(&text)
                .ok_or_else(|| malformed(url, shape, format!("pagination text {:?}", text)))?;
            let page = caps.get(1).and_then(|m| parse_count(m.as_str()));
            let total = caps.get(2).and_then(|m| parse_count(m.as_str()));
            match (page, total) {
                (Some(p), Some(t)) if p >= 1 && p <= t => (p as u32, t as u32),
                _ => return Err(malformed(url, shape, format!("pagination text {:?}", text))),
            }
        }
        None => (1, 1),
    };

    let next_page = (page < total_pages).then_some(page + 1);
    debug!("Parsed {} products from page {}/{}", products.len(), page, total_pages);

    Ok(ProductPage { products, page, total_pages, next_page })
}

// Single product

fn parse_detail(document: &Html, url: &str) -> Result<Product> {
    let shape = PageShape::SingleProduct;
    if document.select(&detail::TABLE).next().is_none() {
        return Err(malformed(url, shape, "detail table vanished"));
    }

    let mut attributes = Vec::new();
    for row in document.select(&detail::ROW) {
        let Some(name) = class_name(row, "tr-") else {
            continue;
        };
        let (Some(th), Some(td)) = (child_elements(row, "th").next(), child_elements(row, "td").next()) else {
            continue;
        };
        let title = text_of(th);
        let title = if title.is_empty() { name.clone() } else { title };
        push_cell(&mut attributes, name, &title, td);
    }

    if attributes.is_empty() {
        return Err(malformed(url, shape, "detail table without attributes"));
    }
    Ok(Product::new(attributes))
}

/// Appends the attributes one cell yields: usually one, none for dropped
/// columns, and the product link next to the part number.
fn push_cell(attributes: &mut Vec<Attribute>, name: String, title: &str, cell: ElementRef) {
    let link = (name == "dkPartNumber")
        .then(|| child_elements(cell, "a").find_map(|a| a.value().attr("href")))
        .flatten()
        .map(|href| href.trim().to_string());

    if let Some(value) = cell_value(&name, cell) {
        attributes.push(Attribute { name, title: title.to_string(), value });
    }
    if let Some(href) = link {
        attributes.push(Attribute { name: LINK.to_string(), title: "Link".to_string(), value: href });
    }
}

/// Extracts the value of one attribute cell; `None` drops the attribute.
fn cell_value(name: &str, cell: ElementRef) -> Option<String> {
    match name {
        "compareParts" => None,
        "datasheet" => cell
            .select(&cells::DATASHEET_LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|href| href.trim().to_string()),
        "image" => {
            let img = cell.select(&cells::IMAGE).next()?;
            if img.value().attr("src").unwrap_or_default().contains("NoPhoto") {
                return None;
            }
            img.value().attr("zoomimg").map(|s| s.trim().to_string())
        }
        "unitPrice" => cell
            .select(&cells::SPAN)
            .next()
            .map(own_text)
            .or_else(|| Some(text_of(cell))),
        "qtyAvailable" | "minQty" => cell
            .select(&cells::DESKTOP)
            .next()
            .map(text_of)
            .or_else(|| Some(text_of(cell))),
        // Packaging cells append reel and tape notes as child elements.
        "packaging" => Some(own_text(cell)).filter(|t| !t.is_empty()).or_else(|| Some(text_of(cell))),
        _ => Some(text_of(cell)),
    }
}
