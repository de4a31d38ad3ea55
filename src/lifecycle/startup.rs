//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Build the event channel, timer scheduler and balancer
//! - Register one node per configured backend
//! - Start accepting clients, then run the control loop to completion
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener starts last (traffic only when ready)

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::loader::ConfigError;
use crate::config::validation::{validate_config, ValidationError};
use crate::config::BalancerConfig;
use crate::lifecycle::Shutdown;
use crate::load_balancer::{Balancer, BalancerSettings};
use crate::net::dialer::TcpDialer;
use crate::net::listener::{Listener, ListenerError};
use crate::runtime::{driver, event, TokioScheduler};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Totals reported once the control loop has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub total_sessions: u64,
    pub dial_failures: u64,
}

fn parse_address(field: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|_| {
        ConfigError::Validation(vec![ValidationError::InvalidAddress {
            field: field.to_string(),
            value: value.to_string(),
        }])
    })
}

/// Bind the configured client address.
pub async fn bind(config: &BalancerConfig) -> Result<TcpListener, StartupError> {
    let addr = parse_address("listener.bind_address", &config.listener.bind_address)?;
    Ok(TcpListener::bind(addr).await?)
}

/// Build the balancer for `config`, serve clients from `listener` and run
/// the control loop until `shutdown` fires.
pub async fn run(
    config: &BalancerConfig,
    listener: TcpListener,
    shutdown: &Shutdown,
) -> Result<RunReport, StartupError> {
    validate_config(config).map_err(ConfigError::Validation)?;

    let (events, rx) = event::channel();
    let scheduler = TokioScheduler::new(events.clone());
    let mut balancer = Balancer::new(BalancerSettings::from_config(config), Box::new(scheduler));

    for node in &config.nodes {
        let address = parse_address("nodes.address", &node.address)?;
        balancer.add_node(node.label(), Box::new(TcpDialer::new(address, events.clone())));
    }

    tracing::info!(
        nodes = config.nodes.len(),
        health_checks = config.health_check.enabled,
        max_outgoing_attempts = config.balancer.max_outgoing_attempts,
        "Balancer initialized"
    );

    let loop_shutdown = shutdown.subscribe();
    let listener = Listener::from_listener(listener, config.listener.max_connections)?;
    let accept = tokio::spawn(listener.serve(events, shutdown.subscribe()));

    let balancer = driver::run(balancer, rx, loop_shutdown, config.observability.stats_interval()).await;
    accept.abort();

    let report = RunReport {
        total_sessions: balancer.nodes().total_sessions(),
        dial_failures: balancer.dial_failures(),
    };
    tracing::info!(
        total_sessions = report.total_sessions,
        dial_failures = report.dial_failures,
        "Balancer stopped"
    );
    Ok(report)
}
