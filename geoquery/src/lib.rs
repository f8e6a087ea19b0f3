//! geoquery - natural-language questions over pesantren / santri data,
//! answered as tabular JSON or GeoJSON.
//!
//! This library provides the pipeline stages and the HTTP API used by the
//! `geoquery` server.

pub mod api;
pub mod audit;
pub mod catalog;
pub mod config;
pub mod enricher;
pub mod entity;
pub mod executor;
pub mod geojson;
pub mod intent;
pub mod llm;
pub mod normalizer;
pub mod pipeline;
pub mod prompt;
pub mod sql_refs;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;
