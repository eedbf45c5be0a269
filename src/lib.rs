pub mod casing;
pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod http;
pub mod logging;
pub mod peer;
pub mod room;
pub mod transfer;
pub mod transport;
