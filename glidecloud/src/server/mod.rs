//! The live-tracking server.
//!
//! # Architecture
//!
//! ```text
//!  UDP datagram ─► decode ─► Server::handle_datagram ─► registries
//!                                     │
//!                                     ├─► reply to sender (ACK, responses)
//!                                     └─► push to subscribed clients nearby
//!
//!  OgnClient ─► mpsc ─► Server::apply_traffic_report ─► traffic registry
//! ```
//!
//! [`Server`] holds the rules and is driven synchronously with an explicit
//! `now`, so it can be tested without sockets or timers. [`ServerRuntime`]
//! wraps it in the tokio event loop with persistence and signal handling.
//!
//! # Example
//!
//! ```ignore
//! use glidecloud::persist::Database;
//! use glidecloud::server::{ServerConfig, ServerRuntime};
//!
//! let runtime = ServerRuntime::bind(
//!     "0.0.0.0:5597".parse()?,
//!     ServerConfig::default(),
//!     Database::new("state.db"),
//!     Default::default(),
//! )
//! .await?;
//! runtime.run(CancellationToken::new()).await?;
//! ```

mod config;
mod dispatch;
mod error;
mod runtime;

pub use config::{
    ServerConfig, DEFAULT_MAX_THERMAL_RESULTS, DEFAULT_MAX_TRAFFIC_RESULTS,
    DEFAULT_THERMAL_NOTIFY_RADIUS, DEFAULT_THERMAL_QUERY_RADIUS, DEFAULT_TRAFFIC_NOTIFY_RADIUS,
    DEFAULT_TRAFFIC_QUERY_RADIUS,
};
pub use dispatch::Server;
pub use error::ServerError;
pub use runtime::{ServerRuntime, REPORT_CHANNEL_CAPACITY};
