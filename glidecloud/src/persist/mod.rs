//! Snapshots of the full server state.
//!
//! The server saves every registry periodically and on shutdown, and loads
//! the last snapshot at startup. A snapshot is all-or-nothing: any malformed
//! field rejects the whole file, and loading builds fresh registries that
//! only replace the live ones once decoding succeeded.
//!
//! # Example
//!
//! ```ignore
//! use glidecloud::persist::Database;
//!
//! let db = Database::new("/var/lib/glidecloud/state.db");
//! let registries = db.load()?;
//! db.save(&registries)?;
//! ```

mod codec;
mod error;
mod store;

pub use codec::{decode_state, encode_state, DATABASE_MAGIC, DATABASE_VERSION};
pub use error::PersistError;
pub use store::Database;
