use crate::config::types::{
    split_field_selector, Config, CrawlerConfig, IdentityConfig, PaginationKind, PaginationRule,
    RetryConfig, SelectorSchema, StateConfig, PAGE_PLACEHOLDER,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire crawl settings file
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_state_config(&config.state)?;
    validate_identity_config(&config.identity)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if !config.rate_limit.is_finite() || config.rate_limit < 0.0 {
        return Err(ConfigError::Validation(format!(
            "rate-limit must be a non-negative number, got {}",
            config.rate_limit
        )));
    }

    if config.max_items == Some(0) {
        return Err(ConfigError::Validation(
            "max-items must be >= 1 when set".to_string(),
        ));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max-pages must be >= 1 when set".to_string(),
        ));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.backoff_max_ms < config.backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "backoff-max-ms ({}) must not be below backoff-base-ms ({})",
            config.backoff_max_ms, config.backoff_base_ms
        )));
    }

    Ok(())
}

fn validate_state_config(config: &StateConfig) -> Result<(), ConfigError> {
    if !config.enabled {
        return Ok(());
    }

    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.flush_every < 1 {
        return Err(ConfigError::Validation(
            "flush-every must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_identity_config(config: &IdentityConfig) -> Result<(), ConfigError> {
    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agents cannot contain empty entries".to_string(),
        ));
    }

    for proxy in &config.proxies {
        let url = Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(format!(
                "Proxy '{}' has unsupported scheme '{}'",
                proxy,
                url.scheme()
            )));
        }
    }

    Ok(())
}

/// Validates one selector schema
///
/// All selectors must parse, field names must be non-empty and the
/// pagination rule must carry what its kind needs.
pub fn validate_schema(schema: &SelectorSchema) -> Result<(), ConfigError> {
    if let Some(container) = &schema.container_selector {
        validate_selector(container)?;
    }

    for (name, spec) in &schema.fields {
        if name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "schema '{}' has a field with an empty name",
                schema.name
            )));
        }

        let (css, _) = split_field_selector(spec);
        validate_selector(css)?;
    }

    if let Some(rule) = &schema.pagination {
        validate_pagination(rule)?;
    }

    Ok(())
}

/// Checks the kind-specific requirements of a pagination rule
pub fn validate_pagination(rule: &PaginationRule) -> Result<(), ConfigError> {
    match rule.kind {
        PaginationKind::NextButton | PaginationKind::InfiniteScroll => {
            let selector = rule
                .selector
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    ConfigError::InvalidPagination(format!(
                        "{:?} pagination requires a non-empty selector",
                        rule.kind
                    ))
                })?;
            validate_selector(selector)?;
        }
        PaginationKind::PageParam => {
            let template = rule.template.as_deref().unwrap_or_default();
            if !template.contains(PAGE_PLACEHOLDER) {
                return Err(ConfigError::InvalidPagination(format!(
                    "page_param pagination requires a template containing '{}', got '{}'",
                    PAGE_PLACEHOLDER, template
                )));
            }
        }
    }

    if rule.max_pages == Some(0) {
        return Err(ConfigError::InvalidPagination(
            "max_pages must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Checks that a CSS selector parses
pub fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    if selector.trim().is_empty() {
        return Err(ConfigError::InvalidSelector {
            selector: selector.to_string(),
            message: "selector is empty".to_string(),
        });
    }

    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })?;

    Ok(())
}

/// Parses and checks the seed URL of a run
pub fn validate_seed_url(seed: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(seed)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' must use http or https",
            seed
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' has no host",
            seed
        )));
    }

    Ok(url)
}
