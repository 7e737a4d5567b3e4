//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate URLs, addresses and value ranges
//! - Detect duplicate endpoint names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: WalletConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use url::Url;

use crate::config::schema::WalletConfig;
use crate::keys::Address;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub(crate) fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check a parsed configuration.
pub fn validate_config(config: &WalletConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.endpoints.is_empty() {
        errors.push(ValidationError::new("endpoints", "at least one endpoint is required"));
    }

    let mut names = HashSet::new();
    for (i, endpoint) in config.endpoints.iter().enumerate() {
        let field = format!("endpoints[{}]", i);
        if !names.insert(endpoint.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                format!("duplicate endpoint name '{}'", endpoint.name),
            ));
        }
        check_url(&mut errors, &format!("{}.url", field), &endpoint.url, &["http", "https"]);
        if let Some(ws_url) = &endpoint.ws_url {
            check_url(&mut errors, &format!("{}.ws_url", field), ws_url, &["ws", "wss"]);
        }
    }

    let pool = &config.pool;
    if pool.failure_ceiling == 0 {
        errors.push(ValidationError::new("pool.failure_ceiling", "must be greater than 0"));
    }
    if pool.backoff_base_selections > pool.backoff_max_selections {
        errors.push(ValidationError::new(
            "pool.backoff_base_selections",
            "must not exceed pool.backoff_max_selections",
        ));
    }
    if pool.probe_timeout_ms == 0 {
        errors.push(ValidationError::new("pool.probe_timeout_ms", "must be greater than 0"));
    }

    if config.rpc.request_timeout_ms == 0 {
        errors.push(ValidationError::new("rpc.request_timeout_ms", "must be greater than 0"));
    }
    if config.rpc.confirm_poll_interval_ms == 0 {
        errors.push(ValidationError::new("rpc.confirm_poll_interval_ms", "must be greater than 0"));
    }

    if config.balance.poll_interval_ms == 0 {
        errors.push(ValidationError::new("balance.poll_interval_ms", "must be greater than 0"));
    }

    let settlement = &config.settlement;
    if settlement.platform_fee_bps > 10_000 {
        errors.push(ValidationError::new("settlement.platform_fee_bps", "must be at most 10000"));
    }
    if settlement.fee_destination.parse::<Address>().is_err() {
        errors.push(ValidationError::new(
            "settlement.fee_destination",
            "must be a base58 address",
        ));
    }
    if settlement.confirmation_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "settlement.confirmation_timeout_ms",
            "must be greater than 0",
        ));
    }
    if settlement.primary_build_attempts == 0 {
        errors.push(ValidationError::new(
            "settlement.primary_build_attempts",
            "must be greater than 0",
        ));
    }
    if settlement.max_slippage_bps > 10_000 {
        errors.push(ValidationError::new("settlement.max_slippage_bps", "must be at most 10000"));
    }
    if settlement.default_slippage_bps > settlement.max_slippage_bps {
        errors.push(ValidationError::new(
            "settlement.default_slippage_bps",
            "must not exceed settlement.max_slippage_bps",
        ));
    }

    if config.quoting.enabled {
        check_url(&mut errors, "quoting.base_url", &config.quoting.base_url, &["http", "https"]);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if matches!(&config.identity.salt, Some(salt) if salt.is_empty()) {
        errors.push(ValidationError::new("identity.salt", "must not be empty when set"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, raw: &str, schemes: &[&str]) {
    match Url::parse(raw) {
        Ok(url) if schemes.contains(&url.scheme()) => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}', expected one of {:?}", url.scheme(), schemes),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::EndpointConfig;

    fn valid_config() -> WalletConfig {
        let mut config = WalletConfig::default();
        config.settlement.fee_destination = "11111111111111111111111111111112".to_string();
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_default_requires_fee_destination() {
        let errors = validate_config(&WalletConfig::default()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "settlement.fee_destination");
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = valid_config();
        config.endpoints.push(EndpointConfig {
            name: "mainnet-beta".to_string(),
            url: "ftp://rpc.example.com".to_string(),
            ws_url: Some("https://not-a-socket".to_string()),
        });
        config.pool.failure_ceiling = 0;
        config.settlement.platform_fee_bps = 20_000;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"endpoints[1].name"));
        assert!(fields.contains(&"endpoints[1].url"));
        assert!(fields.contains(&"endpoints[1].ws_url"));
        assert!(fields.contains(&"pool.failure_ceiling"));
        assert!(fields.contains(&"settlement.platform_fee_bps"));
    }

    #[test]
    fn test_empty_endpoint_list() {
        let mut config = valid_config();
        config.endpoints.clear();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].to_string(), "endpoints: at least one endpoint is required");
    }
}
