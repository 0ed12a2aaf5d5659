//! Eventra AI gateway
//!
//! HTTP surface that admits AI capability requests against the platform
//! policy and runs them through typed prompt flows.

pub mod cli;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod server;

pub use config::Config;
pub use errors::{ApiError, ConfigError};
pub use server::{build_router, GatewayState, DEGRADED_HEADER};
