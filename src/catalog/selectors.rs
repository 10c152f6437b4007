//! CSS selectors for Digi-Key catalog page parsing.
//!
//! This file contains every selector the classifier and extractors rely on.
//! Update this file when the catalog changes its HTML structure.
//!
//! **Update process**: when classification fails, capture the HTML sample,
//! update selectors, and add a test fixture.

use scraper::Selector;
use std::sync::LazyLock;

/// Selectors for the product index (groups and their categories).
pub mod listing {
    use super::*;

    /// Product index container; its presence marks a category listing.
    pub static INDEX: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("div#productIndexList").unwrap());

    /// Group heading, a direct child of the index container.
    pub static GROUP_HEAD: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("div#productIndexList > h2").unwrap());

    /// Link inside a group heading or a category entry.
    pub static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

    /// Category entry inside the list that follows a group heading.
    pub static CATEGORY_ITEM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li").unwrap());
}

/// Selectors for the category filter controls.
pub mod filters {
    use super::*;

    /// Filter container; without results, listing, or detail it marks a filter interface.
    pub static CONTAINER: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("#filters-group").unwrap());

    /// Parametric filter title; pairs in order with [`SELECT`].
    pub static HEADLINE: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("span.filters-headline").unwrap());

    /// Parametric filter listbox.
    pub static SELECT: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("select.filter-selectors[name]").unwrap());

    /// Option of a listbox.
    pub static OPTION: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("option[value]").unwrap());

    /// Control label, matched to its control by `for`.
    pub static LABEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("label[for]").unwrap());

    /// Numeric control, e.g. the order quantity.
    pub static NUMBER: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("input[type='number'][name]").unwrap());

    /// Boolean flag control.
    pub static CHECKBOX: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("input[type='checkbox'][name]").unwrap());

    /// Free-text control.
    pub static TEXT: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("input[type='text'][name]").unwrap());

    /// Flags whose "off" value is sent as a separate key.
    pub static NEGATED_FLAGS: &[(&str, &str)] = &[("rohs", "nonrohs")];
}

/// Selectors for paginated product result tables.
pub mod results {
    use super::*;

    /// Product table; its presence marks a product listing.
    pub static TABLE: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("table#productTable").unwrap());

    /// Explicit "no matching products" marker, an empty product listing.
    pub static NO_RESULTS: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("div#noResults").unwrap());

    /// Column heads, in column order.
    pub static HEAD: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("thead#tblhead > tr:first-child > th").unwrap());

    /// Sort controls, one cell per column.
    pub static SORT_CELL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("thead#tblhead > tr:nth-of-type(2) > td").unwrap());

    /// Sort button; the first in a cell sorts ascending.
    pub static SORT_BUTTON: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("button.ps-sortButtons[onclick]").unwrap());

    /// Sort direction icons; their alt text names the directions.
    pub static SORT_ICON: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("button.ps-sortButtons > img[alt]").unwrap());

    /// Result rows.
    pub static ROW: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("tbody#lnkPart > tr").unwrap());

    /// Lifecycle status inside a result cell.
    pub static PART_STATUS: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("span#part-status").unwrap());

    /// Pagination text such as "Page 1/12".
    pub static CURRENT_PAGE: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("span.current-page").unwrap());
}

/// Selectors for single product detail pages.
pub mod detail {
    use super::*;

    /// Attribute table; its presence marks a single product.
    pub static TABLE: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("table#product-attribute-table").unwrap());

    /// Attribute rows of the table itself, not of tables nested in its cells.
    pub static ROW: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse("table#product-attribute-table > tbody > tr[class]").unwrap()
    });
}

/// Selectors for individual cell payloads, shared by result rows and detail rows.
pub mod cells {
    use super::*;

    /// Datasheet link.
    pub static DATASHEET_LINK: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("a.lnkDatasheet[href]").unwrap());

    /// Product photo.
    pub static IMAGE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());

    /// Desktop rendering of a quantity.
    pub static DESKTOP: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("span.desktop").unwrap());

    /// Price span.
    pub static SPAN: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span").unwrap());
}

/// Page title, used only for diagnostics.
pub static PAGE_TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
