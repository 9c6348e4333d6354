//! Content Addressable Storage (CAS) for turbocache.
//!
//! Artifacts are opaque byte blobs keyed by the SHA-256 of their content.
//! The key arrives from the client, so every write is verified before it is
//! made visible.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cas::{ContentHash, ContentStore, FileStore};
//!
//! let store = FileStore::at_path("/var/cache/turbocache").unwrap();
//!
//! let hash = ContentHash::from_data(b"hello");
//! store.put(&hash, b"hello").unwrap();
//!
//! if let Some(data) = store.get(&hash).unwrap() {
//!     println!("Got {} bytes", data.len());
//! }
//!
//! store.delete(&hash).unwrap();
//! ```
//!
//! # Durability
//!
//! - Writes go to a `.tmp-<uuid>` staging file, are fsynced, then renamed
//!   onto the final path, so readers never see partial content
//! - Concurrent writes of the same hash carry identical bytes; the last
//!   rename wins and no locking is required
//! - `FileStore::new` only captures config; `initialize` creates the
//!   directory and must run before the store is shared

pub mod config;
pub mod error;
pub mod hash;
pub mod staging;
pub mod store;

// Re-exports for convenience
pub use config::{CasConfig, StoreLayout};
pub use error::CasError;
pub use hash::{ContentHash, HashError};
pub use store::{ContentStore, FileStore, StoreUsage};
