//! attend-platform — Platform-boundary implementations.
//!
//! Provides a SQLite-backed persisted state store and a gpsd location
//! provider, plugged into the resolver and validator from `attend-core`.

pub mod gpsd;
pub mod sqlite_store;

pub use gpsd::{GpsdCapability, GpsdProvider, DEFAULT_GPSD_ADDR};
pub use sqlite_store::SqliteStore;
