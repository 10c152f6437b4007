//! Search parameters discovered per category, and encoding of caller filter maps.

use crate::catalog::units::si_to_int;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Reserved filter key controlling page size; never validated against a [`ParameterSet`].
pub const RESULTS_PER_PAGE: &str = "Results per Page";

/// Query key the catalog reads the page size from.
pub const PAGE_SIZE_KEY: &str = "pageSize";

/// Query key the catalog reads the 1-based page index from.
pub const PAGE_KEY: &str = "page";

/// Query key of the order quantity; rows whose minimum order exceeds it are dropped.
pub const QUANTITY_KEY: &str = "quantity";

/// Query key of the result ordering.
pub const SORT_KEY: &str = "ColumnSort";

/// Largest page size the catalog serves.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Caller-supplied filters: parameter title to value.
pub type FilterMap = BTreeMap<String, FilterValue>;

/// A filter value: a set of discrete choices, or a single scalar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Choices(BTreeSet<String>),
    Scalar(String),
}

impl FilterValue {
    /// A single scalar value.
    pub fn scalar(value: impl Into<String>) -> Self {
        FilterValue::Scalar(value.into())
    }

    /// A set of discrete choices.
    pub fn choices<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilterValue::Choices(values.into_iter().map(Into::into).collect())
    }

    /// Returns the single value if this is a scalar or a one-element set.
    fn single(&self) -> Option<&str> {
        match self {
            FilterValue::Scalar(s) => Some(s),
            FilterValue::Choices(set) if set.len() == 1 => set.iter().next().map(String::as_str),
            FilterValue::Choices(_) => None,
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Scalar(s) => write!(f, "{}", s),
            FilterValue::Choices(set) => {
                let joined: Vec<&str> = set.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", joined.join(", "))
            }
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Scalar(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Scalar(s)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Scalar(b.to_string())
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        FilterValue::Scalar(n.to_string())
    }
}

/// How a parameter's values are encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpecKind {
    /// Enumerated choice set: display title to wire value. Multi-valued keys repeat.
    Choice { options: BTreeMap<String, String> },
    /// Integer range; values may use SI prefixes ("2.2k").
    Range { min: Option<i64>, max: Option<i64> },
    /// Boolean flag. `true` sends `name=1`; `false` sends `off_name=1` when the
    /// catalog uses a paired negative key, otherwise `name=0`.
    Flag { off_name: Option<String> },
    /// Free text, sent verbatim.
    Text,
    /// Result ordering: column title to its positive sort code. A value is a
    /// column title, ascending, or the title prefixed with `-` for descending.
    Sort { columns: BTreeMap<String, i64> },
}

/// One searchable attribute of a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Display title, the key callers use in a [`FilterMap`].
    pub title: String,
    /// Query key the catalog expects.
    pub name: String,
    pub kind: SpecKind,
    /// Value applied when the caller omits this parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<FilterValue>,
}

impl ParameterSpec {
    pub fn new(title: impl Into<String>, name: impl Into<String>, kind: SpecKind) -> Self {
        Self { title: title.into(), name: name.into(), kind, default: None }
    }

    pub fn with_default(mut self, default: FilterValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Encodes a value into query pairs, or explains why it cannot be encoded.
    pub fn encode(&self, value: &FilterValue) -> Result<Vec<(String, String)>> {
        let invalid = |reason: &str| Error::invalid_value(&self.title, value.to_string(), reason);

        match &self.kind {
            SpecKind::Choice { options } => {
                let titles: Vec<&str> = match value {
                    FilterValue::Scalar(s) => vec![s.as_str()],
                    FilterValue::Choices(set) => set.iter().map(String::as_str).collect(),
                };
                titles
                    .into_iter()
                    .map(|title| match options.get(title) {
                        Some(code) => Ok((self.name.clone(), code.clone())),
                        None => Err(Error::invalid_value(
                            &self.title,
                            title,
                            format!("not one of the {} listed options", options.len()),
                        )),
                    })
                    .collect()
            }

            SpecKind::Range { min, max } => {
                let raw = value.single().ok_or_else(|| invalid("expects a single number"))?;
                let n = si_to_int(raw, 1000).ok_or_else(|| invalid("not an integer"))?;
                if let Some(min) = min {
                    if n < *min {
                        return Err(invalid(&format!("below minimum {}", min)));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return Err(invalid(&format!("above maximum {}", max)));
                    }
                }
                Ok(vec![(self.name.clone(), n.to_string())])
            }

            SpecKind::Flag { off_name } => {
                let raw = value.single().ok_or_else(|| invalid("expects true or false"))?;
                let on = parse_bool(raw).ok_or_else(|| invalid("expects true or false"))?;
                Ok(match (on, off_name) {
                    (true, _) => vec![(self.name.clone(), "1".to_string())],
                    (false, Some(off)) => vec![(off.clone(), "1".to_string())],
                    (false, None) => vec![(self.name.clone(), "0".to_string())],
                })
            }

            SpecKind::Sort { columns } => {
                let raw = value.single().ok_or_else(|| invalid("expects one column"))?.trim();
                let (column, descending) = match raw.strip_prefix('-') {
                    Some(column) => (column, true),
                    None => (raw.strip_prefix('+').unwrap_or(raw), false),
                };
                let code = columns
                    .get(column.trim())
                    .ok_or_else(|| invalid(&format!("not one of the {} sortable columns", columns.len())))?;
                let code = if descending { -code } else { *code };
                Ok(vec![(self.name.clone(), code.to_string())])
            }

            SpecKind::Text => Ok(match value {
                FilterValue::Scalar(s) => vec![(self.name.clone(), s.clone())],
                FilterValue::Choices(set) => {
                    set.iter().map(|s| (self.name.clone(), s.clone())).collect()
                }
            }),
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Every searchable attribute of one category, keyed by title.
///
/// Built once by the parameter initializer and shared read-only afterwards;
/// re-initialization replaces the whole set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSet {
    specs: BTreeMap<String, ParameterSpec>,
}

/// A filter map translated to query pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedQuery {
    pub pairs: Vec<(String, String)>,
    /// Page size requested through [`RESULTS_PER_PAGE`], if any.
    pub page_size: Option<u32>,
}

impl EncodedQuery {
    /// Order quantity carried by the query, if any.
    pub fn quantity(&self) -> Option<u64> {
        self.pairs
            .iter()
            .find(|(key, _)| key == QUANTITY_KEY)
            .and_then(|(_, value)| value.parse().ok())
    }
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a spec; returns false and keeps the first if the title is already present.
    pub fn insert(&mut self, spec: ParameterSpec) -> bool {
        if self.specs.contains_key(&spec.title) {
            return false;
        }
        self.specs.insert(spec.title.clone(), spec);
        true
    }

    pub fn get(&self, title: &str) -> Option<&ParameterSpec> {
        self.specs.get(title)
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Validates and encodes a filter map for `category`.
    ///
    /// Unknown keys fail with [`Error::UnknownFilterKey`]; unencodable values
    /// with [`Error::InvalidFilterValue`]. Parameters the map omits fall back
    /// to their defaults.
    pub fn encode(&self, category: &str, filters: &FilterMap) -> Result<EncodedQuery> {
        let mut encoded = EncodedQuery::default();

        for (key, value) in filters {
            if key == RESULTS_PER_PAGE {
                encoded.page_size = Some(parse_page_size(value)?);
            } else if !self.specs.contains_key(key) {
                return Err(Error::UnknownFilterKey {
                    category: category.to_string(),
                    key: key.clone(),
                });
            }
        }

        for spec in self.specs.values() {
            let value = filters.get(&spec.title).or(spec.default.as_ref());
            if let Some(value) = value {
                encoded.pairs.extend(spec.encode(value)?);
            }
        }

        Ok(encoded)
    }
}

fn parse_page_size(value: &FilterValue) -> Result<u32> {
    let invalid = |reason: &str| Error::invalid_value(RESULTS_PER_PAGE, value.to_string(), reason);
    let raw = value.single().ok_or_else(|| invalid("expects a single number"))?;
    let size: u32 = raw.trim().parse().map_err(|_| invalid("not a positive integer"))?;
    if size == 0 || size > MAX_PAGE_SIZE {
        return Err(invalid(&format!("must be between 1 and {}", MAX_PAGE_SIZE)));
    }
    Ok(size)
}

/// Lifecycle of a category's parameter discovery.
///
/// `Uninitialized -> Initializing -> Ready | Failed`. Only `Ready` permits
/// filtered search; a failed category can still be listed and browsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<ParameterSet>", into = "Option<ParameterSet>")]
pub enum ParamState {
    #[default]
    Uninitialized,
    Initializing,
    Ready(Arc<ParameterSet>),
    Failed(String),
}

impl ParamState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ParamState::Ready(_))
    }

    pub fn params(&self) -> Option<&Arc<ParameterSet>> {
        match self {
            ParamState::Ready(params) => Some(params),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParamState::Uninitialized => "uninitialized",
            ParamState::Initializing => "initializing",
            ParamState::Ready(_) => "ready",
            ParamState::Failed(_) => "failed",
        }
    }
}

// Only discovered parameters are worth persisting; transient states load back as uninitialized.
impl From<ParamState> for Option<ParameterSet> {
    fn from(state: ParamState) -> Self {
        match state {
            ParamState::Ready(params) => Some(Arc::unwrap_or_clone(params)),
            _ => None,
        }
    }
}

impl From<Option<ParameterSet>> for ParamState {
    fn from(params: Option<ParameterSet>) -> Self {
        match params {
            Some(params) => ParamState::Ready(Arc::new(params)),
            None => ParamState::Uninitialized,
        }
    }
}
