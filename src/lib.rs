//! Library surface for the gateway binary and its integration tests.
//!
//! Everything that depends on a concrete [`gw_core::driver::BlockingDriverConnection`]
//! is generic over it, so tests can swap in a fake connection the way
//! `gw-core`'s own test modules do, without dialing out to a real warehouse.

pub mod logging;
pub mod mcp;
pub mod metrics_install;
pub mod state;
pub mod tools;
pub mod warehouse;

#[cfg(feature = "http")]
pub mod http;

pub use state::GatewayState;
pub use warehouse::{SnowflakeConnection, SnowflakeConnectionFactory};
