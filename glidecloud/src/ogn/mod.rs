//! Open Glider Network ingest over APRS-IS.
//!
//! # Architecture
//!
//! ```text
//! aprs.glidernet.org:14580
//!        │ TCP lines
//!        ▼
//!   OgnClient ── parse_line() ──► mpsc<TrafficReport> ──► Server
//! ```
//!
//! The parser is pure and tolerant: it accepts the subset of APRS position
//! reports OGN emits and drops everything else. The client keeps a single
//! session alive, reconnecting after a fixed delay on any failure.
//!
//! # Example
//!
//! ```ignore
//! use glidecloud::ogn::{OgnClient, OgnClientConfig};
//!
//! let (tx, rx) = tokio::sync::mpsc::channel(256);
//! let cancel = tokio_util::sync::CancellationToken::new();
//! let handle = OgnClient::new(OgnClientConfig::default(), tx, cancel.clone()).start();
//! ```

mod client;
mod config;
mod error;
pub mod parser;

pub use client::OgnClient;
pub use config::{
    OgnClientConfig, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_KEEPALIVE_SECS, DEFAULT_OGN_CALLSIGN,
    DEFAULT_OGN_PORT, DEFAULT_OGN_SERVER, DEFAULT_RECONNECT_DELAY_SECS,
};
pub use error::OgnError;
pub use parser::{database_id, parse_line, parse_position, PositionReport, TrafficReport};
