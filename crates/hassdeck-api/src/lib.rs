// hassdeck-api: Async Rust client for the Home Assistant REST API

pub mod client;
pub mod error;
pub mod models;
pub mod transport;

pub use client::HassClient;
pub use error::Error;
pub use models::{ApiStatus, HassState};
pub use transport::{TlsMode, TransportConfig};
