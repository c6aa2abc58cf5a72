//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, loader budget within request timeout)
//! - Validate addresses and the base path shape
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::RouterConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address `{0}`")]
    InvalidBindAddress(String),

    #[error("invalid metrics address `{0}`")]
    InvalidMetricsAddress(String),

    #[error("base path `{0}` must start with `/` and contain no parameters")]
    InvalidBasePath(String),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("loader timeout ({loader_ms}ms) exceeds the request timeout ({request_secs}s)")]
    LoaderExceedsRequest { loader_ms: u64, request_secs: u64 },

    #[error("max_body_size must be greater than zero")]
    ZeroBodyLimit,

    #[error("unknown log level `{0}`")]
    UnknownLogLevel(String),
}

pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let base = &config.router.base_path;
    if !base.is_empty() && (!base.starts_with('/') || base.contains([':', '*'])) {
        errors.push(ValidationError::InvalidBasePath(base.clone()));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("timeouts.request_secs"));
    }
    if config.router.loader_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("router.loader_timeout_ms"));
    }
    if config.timeouts.request_secs > 0
        && config.router.loader_timeout_ms > config.timeouts.request_secs.saturating_mul(1000)
    {
        errors.push(ValidationError::LoaderExceedsRequest {
            loader_ms: config.router.loader_timeout_ms,
            request_secs: config.timeouts.request_secs,
        });
    }

    if config.limits.max_body_size == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::UnknownLogLevel(observability.log_level.clone()));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
