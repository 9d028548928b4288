//! glidecloud - live tracking server for glider pilots
//!
//! Clients upload position fixes, thermals and waves over a compact UDP
//! protocol and ask for nearby traffic and lift. Aircraft from the Open
//! Glider Network are merged in from an APRS-IS feed. The whole state is
//! kept in memory and snapshotted to disk.
//!
//! # Modules
//!
//! - [`protocol`]: wire format, CRC and response packing
//! - [`registry`]: keyed, recency-ordered, spatially indexed stores
//! - [`server`]: dispatch rules and the event loop
//! - [`ogn`]: APRS-IS client and parser
//! - [`persist`]: state snapshots
//! - [`config`], [`logging`], [`time`]: ambient support

pub mod config;
pub mod geo;
pub mod logging;
pub mod ogn;
pub mod persist;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod time;

/// Version of the glidecloud library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
