//! chub9p server library
//!
//! Configuration, 9P framing and per-connection dispatch, and the listener
//! that serves a [`chub9p_kernel::Gateway`] over TCP.

pub mod config;
pub mod connection;
pub mod constants;
pub mod server;
pub mod wire;

pub use config::{ConfigError, Overrides, ServerConfig};
pub use connection::Connection;
pub use server::{build_fetcher, NinepServer};
