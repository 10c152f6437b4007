//! Digi-Key catalog: transport, page classification, and data models.

pub mod classify;
pub mod client;
pub mod locale;
pub mod models;
pub mod params;
pub mod selectors;
pub mod units;

pub use classify::{classify, classify_expecting, ClassifiedPage, PageShape, ProductPage};
pub use client::{CatalogClient, CatalogFetch};
pub use locale::Locale;
pub use models::{Attribute, Category, Graph, Group, Product};
pub use params::{FilterMap, FilterValue, ParamState, ParameterSet, ParameterSpec, SpecKind};
