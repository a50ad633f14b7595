//! Shared vocabulary for the scan distribution server.
//!
//! This crate defines the data model exchanged between the upstream scan
//! producer, the data router, the terminal session host and their clients,
//! together with the trait seams (`DataClientCallback`, `DataProcessor`,
//! `SessionGateway`) that the other crates plug into.

pub mod client;
pub mod comms;
pub mod data;
pub mod error;
pub mod processor;
pub mod session;

pub use client::{ClientHandle, ClientId, ConnectionId, DataClientCallback, RemoteDataClient};
pub use data::{DataFrame, DataType, FrameValues, ScanStatus, StreamDescriptor};
pub use error::{AuthError, DeliveryError, RouterError, TerminalError};
pub use processor::DataProcessor;
pub use session::{ConnectionClosedCallback, SessionGateway};
