use crate::config::types::{Config, SelectorSchema, SiteEntry};
use crate::config::validation::{validate, validate_schema};
use crate::url::{extract_domain, matches_domain};
use crate::ConfigError;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;
use url::Url;

/// Loads and parses a crawl settings file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML settings file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use trawl::config::load_config;
///
/// let config = load_config(Path::new("trawl.toml")).unwrap();
/// println!("Concurrency: {}", config.crawler.concurrency);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Loads a selector schema file
///
/// Three layouts are accepted:
///
/// ```text
/// [ {"domain": ...}, ... ]                 top-level list of site entries
/// { "sites": [ {"domain": ...}, ... ] }    list under a "sites" key
/// { "books": {"domain": ...}, ... }        entries keyed by schema name
/// ```
///
/// Every schema is validated; a bad selector or pagination rule anywhere in
/// the file is a startup error.
pub fn load_schemas(path: &Path) -> Result<Vec<SelectorSchema>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_schemas(&content)
}

/// Parses selector schema JSON (see [`load_schemas`])
pub fn parse_schemas(content: &str) -> Result<Vec<SelectorSchema>, ConfigError> {
    let value: Value = serde_json::from_str(content)?;

    let schemas = match value {
        Value::Array(entries) => parse_entry_list(entries)?,
        Value::Object(mut map) => match map.remove("sites") {
            Some(Value::Array(entries)) => parse_entry_list(entries)?,
            Some(other) => {
                return Err(ConfigError::Validation(format!(
                    "\"sites\" must be a list of site entries, got {}",
                    json_kind(&other)
                )))
            }
            None => {
                let mut schemas = Vec::with_capacity(map.len());
                for (name, entry) in map {
                    let entry: SiteEntry = serde_json::from_value(entry)?;
                    schemas.push(entry.into_schema(Some(&name)));
                }
                schemas
            }
        },
        other => {
            return Err(ConfigError::Validation(format!(
                "selector schema file must be a list or an object, got {}",
                json_kind(&other)
            )))
        }
    };

    for schema in &schemas {
        validate_schema(schema)?;
    }

    debug!("Loaded {} selector schema(s)", schemas.len());
    Ok(schemas)
}

fn parse_entry_list(entries: Vec<Value>) -> Result<Vec<SelectorSchema>, ConfigError> {
    entries
        .into_iter()
        .map(|entry| {
            let entry: SiteEntry = serde_json::from_value(entry)?;
            Ok(entry.into_schema(None))
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Picks the schema for a run
///
/// An explicit `name` must exist, otherwise this is a startup error. Without
/// a name, the first schema whose domain pattern matches the seed host wins;
/// no match is not an error (extraction falls back to the heuristic).
///
/// # Arguments
///
/// * `schemas` - All loaded schemas, in file order
/// * `name` - Explicit schema key, if the user gave one
/// * `seed` - The seed URL of the run
pub fn find_schema<'a>(
    schemas: &'a [SelectorSchema],
    name: Option<&str>,
    seed: &Url,
) -> Result<Option<&'a SelectorSchema>, ConfigError> {
    if let Some(name) = name {
        return schemas
            .iter()
            .find(|s| s.name == name)
            .map(Some)
            .ok_or_else(|| ConfigError::SchemaNotFound(name.to_string()));
    }

    let host = match extract_domain(seed) {
        Some(host) => host,
        None => return Ok(None),
    };

    Ok(schemas
        .iter()
        .find(|s| matches_domain(&s.domain_pattern, &host)))
}

/// Computes a SHA-256 hash of a configuration file's content
///
/// This is used to detect if the configuration has changed between runs.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(hash_content(&content))
}

/// Hex-encoded SHA-256 of arbitrary configuration text
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::PaginationKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[crawler]
concurrency = 3
rate-limit = 2.5
max-items = 100

[retry]
max-attempts = 4

[state]
database-path = "./state.db"
flush-every = 20

[identity]
user-agents = ["TestAgent/1.0"]
rotation = "random"
"#;

        let file = create_temp_file(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.concurrency, 3);
        assert_eq!(config.crawler.rate_limit, 2.5);
        assert_eq!(config.crawler.max_items, Some(100));
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.state.flush_every, 20);
        assert_eq!(config.identity.user_agents, vec!["TestAgent/1.0"]);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/trawl.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_file("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let file = create_temp_file("[crawler]\nconcurrency = 0\n");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_parse_schema_list() {
        let json = r#"[
            {
                "domain": "books.toscrape.com",
                "name": "books",
                "container": "article.product_pod",
                "selectors": {"title": "h3 a@title", "price": ".price_color"},
                "pagination": {"type": "next_button", "selector": "li.next a"}
            }
        ]"#;

        let schemas = parse_schemas(json).unwrap();
        assert_eq!(schemas.len(), 1);

        let schema = &schemas[0];
        assert_eq!(schema.name, "books");
        assert_eq!(schema.container_selector.as_deref(), Some("article.product_pod"));
        let keys: Vec<_> = schema.fields.keys().cloned().collect();
        assert_eq!(keys, vec!["title", "price"]);
        assert_eq!(
            schema.pagination.as_ref().map(|p| p.kind),
            Some(PaginationKind::NextButton)
        );
    }

    #[test]
    fn test_parse_schema_sites_key() {
        let json = r#"{"sites": [{"domain": "example.com", "container": ".item", "fields": {"t": "h2"}}]}"#;
        let schemas = parse_schemas(json).unwrap();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "example.com");
    }

    #[test]
    fn test_parse_schema_keyed_by_name() {
        let json = r#"{
            "quotes": {"domain": "quotes.toscrape.com", "container": ".quote", "selectors": {"text": ".text"}},
            "shop": {"domain": "shop.example.com", "selectors": {"name": "h1"}}
        }"#;
        let schemas = parse_schemas(json).unwrap();
        let names: Vec<_> = schemas.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"quotes"));
        assert!(names.contains(&"shop"));
    }

    #[test]
    fn test_parse_schema_rejects_bad_pagination() {
        let json = r#"[{"domain": "example.com", "pagination": {"type": "page_param", "template": "/list?page=2"}}]"#;
        let result = parse_schemas(json);
        assert!(matches!(result, Err(ConfigError::InvalidPagination(_))));
    }

    #[test]
    fn test_parse_schema_rejects_scalar() {
        assert!(matches!(
            parse_schemas("42"),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_find_schema_by_domain() {
        let schemas = vec![
            SelectorSchema::new("a", "other.com"),
            SelectorSchema::new("b", "example.com"),
        ];
        let seed = Url::parse("https://www.example.com/list").unwrap();
        let found = find_schema(&schemas, None, &seed).unwrap();
        assert_eq!(found.map(|s| s.name.as_str()), Some("b"));
    }

    #[test]
    fn test_find_schema_by_name_wins() {
        let schemas = vec![
            SelectorSchema::new("a", "example.com"),
            SelectorSchema::new("b", "other.com"),
        ];
        let seed = Url::parse("https://example.com/list").unwrap();
        let found = find_schema(&schemas, Some("b"), &seed).unwrap();
        assert_eq!(found.map(|s| s.name.as_str()), Some("b"));
    }

    #[test]
    fn test_find_schema_unknown_name() {
        let schemas = vec![SelectorSchema::new("a", "example.com")];
        let seed = Url::parse("https://example.com/").unwrap();
        assert!(matches!(
            find_schema(&schemas, Some("missing"), &seed),
            Err(ConfigError::SchemaNotFound(_))
        ));
    }

    #[test]
    fn test_find_schema_no_match() {
        let schemas = vec![SelectorSchema::new("a", "example.com")];
        let seed = Url::parse("https://unrelated.org/").unwrap();
        assert!(find_schema(&schemas, None, &seed).unwrap().is_none());
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_file("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
        assert_ne!(hash1, hash_content("other content"));
    }
}
