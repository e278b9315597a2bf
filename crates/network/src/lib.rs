//! HTTP access to the relay network: session dispatch, relays, the staked
//! application list and node address lookups.

pub mod client;
pub mod config;
pub mod locator;

pub use client::PocketClient;
pub use config::NetworkConfig;
pub use locator::{extract_domain, node_address, CachedNodeLocator};
