//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges (timeouts > 0, attempts > 0)
//! - Detect duplicate nodes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BalancerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::BalancerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no backend nodes configured")]
    NoNodes,
    #[error("invalid address for {field}: {value}")]
    InvalidAddress { field: String, value: String },
    #[error("duplicate node address: {0}")]
    DuplicateNode(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address".to_string(),
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_connections"));
    }

    if config.nodes.is_empty() {
        errors.push(ValidationError::NoNodes);
    }
    let mut seen = HashSet::new();
    for (i, node) in config.nodes.iter().enumerate() {
        match node.address.parse::<SocketAddr>() {
            Ok(addr) => {
                if !seen.insert(addr) {
                    errors.push(ValidationError::DuplicateNode(node.address.clone()));
                }
            }
            Err(_) => errors.push(ValidationError::InvalidAddress {
                field: format!("nodes[{}].address", i),
                value: node.address.clone(),
            }),
        }
    }

    if config.health_check.interval_secs == 0 {
        errors.push(ValidationError::Zero("health_check.interval_secs"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.connect_secs"));
    }
    if config.balancer.max_outgoing_attempts == 0 {
        errors.push(ValidationError::Zero("balancer.max_outgoing_attempts"));
    }
    if config.balancer.connect_retry_secs == 0 {
        errors.push(ValidationError::Zero("balancer.connect_retry_secs"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address".to_string(),
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
