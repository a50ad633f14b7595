//! Server wiring for the scan distribution core: session management,
//! websocket transport for the public and internal channels, configuration
//! and startup.

pub mod config;
pub mod internal;
pub mod server;
pub mod sessions;
pub mod ws;
