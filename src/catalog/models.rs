//! Data models for the catalog topology and product records.

use crate::catalog::params::ParamState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Attribute name of the product detail link taken from the part number cell.
pub const LINK: &str = "link";

/// A searchable leaf division of the catalog, e.g. "Through Hole Resistors".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Numeric identifier from the catalog URL.
    pub id: String,
    /// Display name within its group.
    pub title: String,
    /// Lookup key: `{group title}/{category title}`.
    pub path: String,
    /// URL path of the category's search page.
    pub href: String,
    /// Item count shown on the product index, if present.
    pub size: Option<u64>,
    /// Parameter discovery state; only `Ready` sets survive a cache round trip.
    #[serde(default)]
    pub params: ParamState,
}

impl Category {
    /// Creates an uninitialized category belonging to `group_title`.
    pub fn new(
        group_title: &str,
        id: impl Into<String>,
        title: impl Into<String>,
        href: impl Into<String>,
        size: Option<u64>,
    ) -> Self {
        let title = title.into();
        Self {
            id: id.into(),
            path: format!("{}/{}", group_title, title),
            title,
            href: href.into(),
            size,
            params: ParamState::Uninitialized,
        }
    }
}

/// A top-level division of the catalog, e.g. "Resistors".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Numeric identifier from the catalog URL.
    pub id: String,
    /// URL slug, e.g. "resistors".
    pub slug: String,
    pub title: String,
    pub href: String,
    /// Categories in index order.
    pub categories: Vec<Category>,
}

impl Group {
    /// Total item count over categories that report one.
    pub fn size(&self) -> u64 {
        self.categories.iter().filter_map(|c| c.size).sum()
    }
}

/// The group/category tree plus a flat, non-owning path index.
///
/// Groups own their categories; the index maps each category path to its
/// position and is rebuilt whenever the tree is replaced.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    groups: Vec<Group>,
    index: HashMap<String, (usize, usize)>,
}

impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.groups == other.groups
    }
}

impl Eq for Graph {}

impl Graph {
    /// Builds a graph and its path index from groups in index order.
    pub fn from_groups(groups: Vec<Group>) -> Self {
        let mut index = HashMap::new();
        for (gi, group) in groups.iter().enumerate() {
            for (ci, category) in group.categories.iter().enumerate() {
                if index.contains_key(&category.path) {
                    warn!("Duplicate category path {:?}; keeping the first", category.path);
                    continue;
                }
                index.insert(category.path.clone(), (gi, ci));
            }
        }
        Self { groups, index }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group(&self, title: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.title == title)
    }

    /// All categories, group by group, in index order.
    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.groups.iter().flat_map(|g| g.categories.iter())
    }

    pub fn category_count(&self) -> usize {
        self.index.len()
    }

    pub fn category(&self, path: &str) -> Option<&Category> {
        let (gi, ci) = *self.index.get(path)?;
        self.groups.get(gi)?.categories.get(ci)
    }

    pub fn category_mut(&mut self, path: &str) -> Option<&mut Category> {
        let (gi, ci) = *self.index.get(path)?;
        self.groups.get_mut(gi)?.categories.get_mut(ci)
    }

    pub fn into_groups(self) -> Vec<Group> {
        self.groups
    }
}

/// One attribute of a product: a display title, a stable name, and a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Stable key derived from the column class, e.g. "dkPartNumber".
    pub name: String,
    /// Column heading as displayed, e.g. "Digi-Key Part Number".
    pub title: String,
    pub value: String,
}

/// A product record from a search result.
///
/// Holds two views of the same attributes: by display title and by stable name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Attributes in column order.
    pub attributes: Vec<Attribute>,
}

impl Product {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        Self { attributes }
    }

    /// Value under a display title.
    pub fn get(&self, title: &str) -> Option<&str> {
        self.attributes.iter().find(|a| a.title == title).map(|a| a.value.as_str())
    }

    /// Value under a stable attribute name.
    pub fn get_by_name(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|a| a.name == name).map(|a| a.value.as_str())
    }

    /// Title-keyed view.
    pub fn by_title(&self) -> BTreeMap<&str, &str> {
        self.attributes.iter().map(|a| (a.title.as_str(), a.value.as_str())).collect()
    }

    /// Name-keyed view.
    pub fn by_name(&self) -> BTreeMap<&str, &str> {
        self.attributes.iter().map(|a| (a.name.as_str(), a.value.as_str())).collect()
    }

    pub fn part_number(&self) -> Option<&str> {
        self.get_by_name("dkPartNumber")
    }

    pub fn manufacturer_part_number(&self) -> Option<&str> {
        self.get_by_name("mfgPartNumber")
    }

    pub fn manufacturer(&self) -> Option<&str> {
        self.get_by_name("vendor")
    }

    pub fn description(&self) -> Option<&str> {
        self.get_by_name("description")
    }

    /// Detail page link, as the catalog printed it.
    pub fn link(&self) -> Option<&str> {
        self.get_by_name(LINK)
    }

    /// Quantity in stock, ignoring thousands separators and trailing text.
    pub fn quantity_available(&self) -> Option<u64> {
        self.get_by_name("qtyAvailable").and_then(leading_count)
    }

    /// Smallest orderable quantity.
    pub fn minimum_quantity(&self) -> Option<u64> {
        self.get_by_name("minQty").and_then(leading_count)
    }
}

/// First word of `text` as a count, e.g. 1000 from "1,000 - Immediate".
fn leading_count(text: &str) -> Option<u64> {
    let digits: String = text
        .split_whitespace()
        .next()?
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::params::ParameterSet;
    use std::sync::Arc;

    fn attr(name: &str, title: &str, value: &str) -> Attribute {
        Attribute { name: name.to_string(), title: title.to_string(), value: value.to_string() }
    }

    fn make_test_product() -> Product {
        Product::new(vec![
            attr("dkPartNumber", "Digi-Key Part Number", "CF14JT10K0CT-ND"),
            attr("mfgPartNumber", "Manufacturer Part Number", "CF14JT10K0"),
            attr("vendor", "Manufacturer", "Stackpole Electronics Inc"),
            attr("description", "Description", "RES 10K OHM 1/4W 5% AXIAL"),
            attr("qtyAvailable", "Quantity Available", "1,234,567 - Immediate"),
        ])
    }

    fn make_test_groups() -> Vec<Group> {
        vec![
            Group {
                id: "2".to_string(),
                slug: "resistors".to_string(),
                title: "Resistors".to_string(),
                href: "/products/en/resistors/2".to_string(),
                categories: vec![
                    Category::new("Resistors", "52", "Chip Resistor - Surface Mount", "/c/52", Some(600_000)),
                    Category::new("Resistors", "53", "Through Hole Resistors", "/c/53", Some(150_000)),
                ],
            },
            Group {
                id: "3".to_string(),
                slug: "capacitors".to_string(),
                title: "Capacitors".to_string(),
                href: "/products/en/capacitors/3".to_string(),
                categories: vec![Category::new("Capacitors", "60", "Ceramic Capacitors", "/c/60", None)],
            },
        ]
    }

    #[test]
    fn test_category_path() {
        let c = Category::new("Resistors", "53", "Through Hole Resistors", "/c/53", None);
        assert_eq!(c.path, "Resistors/Through Hole Resistors");
        assert_eq!(c.params, ParamState::Uninitialized);
    }

    #[test]
    fn test_group_size() {
        let groups = make_test_groups();
        assert_eq!(groups[0].size(), 750_000);
        assert_eq!(groups[1].size(), 0);
    }

    #[test]
    fn test_graph_lookup() {
        let graph = Graph::from_groups(make_test_groups());
        assert_eq!(graph.category_count(), 3);
        assert_eq!(graph.categories().count(), 3);

        let c = graph.category("Resistors/Through Hole Resistors").unwrap();
        assert_eq!(c.id, "53");
        assert!(graph.category("Resistors").is_none());
        assert!(graph.category("Not/A/Real/Path").is_none());
        assert_eq!(graph.group("Capacitors").unwrap().categories.len(), 1);
    }

    #[test]
    fn test_graph_category_mut() {
        let mut graph = Graph::from_groups(make_test_groups());
        graph.category_mut("Capacitors/Ceramic Capacitors").unwrap().params =
            ParamState::Ready(Arc::new(ParameterSet::new()));
        assert!(graph.category("Capacitors/Ceramic Capacitors").unwrap().params.is_ready());
    }

    #[test]
    fn test_graph_duplicate_paths_keep_first() {
        let mut groups = make_test_groups();
        groups[1].categories.push(Category::new("Resistors", "99", "Through Hole Resistors", "/c/99", None));
        let graph = Graph::from_groups(groups);
        assert_eq!(graph.category("Resistors/Through Hole Resistors").unwrap().id, "53");
        assert_eq!(graph.category_count(), 3);
    }

    #[test]
    fn test_graph_equality_ignores_index() {
        let a = Graph::from_groups(make_test_groups());
        let b = Graph::from_groups(make_test_groups());
        assert_eq!(a, b);
        assert_ne!(a, Graph::default());
    }

    #[test]
    fn test_product_views() {
        let product = make_test_product();
        assert_eq!(product.get("Manufacturer"), Some("Stackpole Electronics Inc"));
        assert_eq!(product.get_by_name("vendor"), Some("Stackpole Electronics Inc"));
        assert_eq!(product.by_title().len(), 5);
        assert_eq!(product.by_name()["dkPartNumber"], "CF14JT10K0CT-ND");
        assert!(product.get("Nope").is_none());
    }

    #[test]
    fn test_product_accessors() {
        let product = make_test_product();
        assert_eq!(product.part_number(), Some("CF14JT10K0CT-ND"));
        assert_eq!(product.manufacturer_part_number(), Some("CF14JT10K0"));
        assert_eq!(product.manufacturer(), Some("Stackpole Electronics Inc"));
        assert_eq!(product.description(), Some("RES 10K OHM 1/4W 5% AXIAL"));
        assert_eq!(product.quantity_available(), Some(1_234_567));
        assert_eq!(Product::default().quantity_available(), None);
        assert_eq!(Product::default().minimum_quantity(), None);
    }

    #[test]
    fn test_minimum_quantity_and_link() {
        let attr = |name: &str, value: &str| Attribute {
            name: name.to_string(),
            title: name.to_string(),
            value: value.to_string(),
        };
        let product = Product::new(vec![
            attr("dkPartNumber", "A-ND"),
            attr(LINK, "/product-detail/en/acme/A/A-ND/1"),
            attr("minQty", "2,500 Non-Stock"),
        ]);
        assert_eq!(product.minimum_quantity(), Some(2_500));
        assert_eq!(product.link(), Some("/product-detail/en/acme/A/A-ND/1"));
    }

    #[test]
    fn test_product_serde() {
        let product = make_test_product();
        let json = serde_json::to_string(&product).unwrap();
        assert!(json.contains("CF14JT10K0CT-ND"));
        let parsed: Product = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, product);
    }
}
