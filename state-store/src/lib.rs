//! Durable Typed Record Store
//!
//! A small, type-safe key/value record with write-through persistence and
//! an explicit schema version.
//!
//! # Features
//!
//! - **Type-safe Storage**: Store and retrieve strongly-typed properties
//! - **Write-through**: Every `set`/`remove` is persisted before it returns
//! - **Batches**: Related writes commit together or not at all
//! - **Ordered**: Mutations are serialized under one lock and never reordered
//! - **Versioned**: Documents carry a schema version for forward migration
//! - **Pluggable Backends**: Atomic file replacement or in-memory
//!
//! # Quick Start
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use state_store::{MemoryBackend, Property, StateStore};
//!
//! #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
//! struct VendorToken(String);
//!
//! impl Property for VendorToken {
//!     const KEY: &'static str = "vendor_token";
//! }
//!
//! let store = StateStore::open(MemoryBackend::new(), 1).unwrap();
//! store.set(VendorToken("abc".to_string())).unwrap();
//! assert_eq!(store.get::<VendorToken>(), Some(VendorToken("abc".to_string())));
//! ```
//!
//! # Architecture
//!
//! ```text
//! StateStore (Arc, clonable)
//!     │
//!     ├── document: Mutex<{ schema_version, values: KEY -> json }>
//!     │
//!     └── backend: Box<dyn Backend>
//!             │
//!             ├── FileBackend   (tmp file + fsync + rename)
//!             └── MemoryBackend (shared bytes)
//! ```

// Modules
pub mod backend;
pub mod error;
pub mod property;
pub mod store;

// Re-exports - Public API
pub use backend::{Backend, FileBackend, MemoryBackend};
pub use error::{Result, StoreError};
pub use property::Property;
pub use store::{Batch, StateStore};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backend::{Backend, FileBackend, MemoryBackend};
    pub use crate::property::Property;
    pub use crate::store::{Batch, StateStore};
}
