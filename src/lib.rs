//! dk-crawler - Crawler and search client for the Digi-Key parametric catalog
//!
//! Discovers the group/category topology, learns each category's search
//! parameters from its filter form, and pages through filtered results.
//! Pages are recognized by structure, never by URL.

pub mod cache;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod error;
pub mod search;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheEnvelope, CacheStore, CACHE_FORMAT_VERSION};
pub use catalog::{
    CatalogClient, CatalogFetch, Category, ClassifiedPage, FilterMap, FilterValue, Graph, Group, Locale,
    PageShape, ParamState, ParameterSet, ParameterSpec, Product, SpecKind,
};
pub use config::Config;
pub use error::{Error, Result};
pub use search::ProductSearch;
pub use session::Session;
