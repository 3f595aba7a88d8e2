//! Configuration module for Trawl
//!
//! Two inputs configure a run: an optional TOML settings file (crawler,
//! retry, state and identity sections) and an optional JSON file of
//! per-site selector schemas.
//!
//! # Example
//!
//! ```no_run
//! use trawl::config::{find_schema, load_config, load_schemas};
//! use std::path::Path;
//! use url::Url;
//!
//! let config = load_config(Path::new("trawl.toml")).unwrap();
//! let schemas = load_schemas(Path::new("selectors.json")).unwrap();
//! let seed = Url::parse("https://books.toscrape.com/").unwrap();
//! let schema = find_schema(&schemas, None, &seed).unwrap();
//! println!("concurrency {} schema {:?}", config.crawler.concurrency, schema.map(|s| &s.name));
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    split_field_selector, Config, CrawlerConfig, IdentityConfig, PaginationKind, PaginationRule,
    RetryConfig, Rotation, SelectorSchema, StateConfig, PAGE_PLACEHOLDER,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, find_schema, hash_content, load_config, load_config_with_hash,
    load_schemas, parse_schemas,
};

pub use validation::{validate, validate_pagination, validate_schema, validate_seed_url};
