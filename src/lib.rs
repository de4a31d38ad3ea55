//! Layer-4 TCP load balancer library.

pub mod config;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod runtime;

#[cfg(test)]
mod testing;

pub use config::schema::BalancerConfig;
pub use lifecycle::Shutdown;
pub use load_balancer::Balancer;
