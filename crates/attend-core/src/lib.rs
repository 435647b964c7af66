//! attend-core — Location resolver and geofence pre-check.
//!
//! Acquires device coordinates through a tiered provider strategy backed by
//! a short-lived persisted cache, keeps an expiring copy of the office
//! geofence, and classifies positions with a local Haversine check before
//! falling back to the backend.

pub mod cache;
pub mod geo;
pub mod geofence;
pub mod location;
pub mod store;
pub mod types;

pub use cache::LocationCache;
pub use geofence::{GeofenceValidator, OfficeLocation, RemoteGeofence, RemoteValidation};
pub use location::{
    AccuracyProfile, DeviceCapability, LocationError, LocationProvider, LocationResolver,
    ProviderError, ResolverConfig, UnavailableReason,
};
pub use store::{KeyValueStore, MemoryStore, StoreError};
pub use types::{
    CachedCoordinate, CachedGeofence, Coordinate, GeofenceConfig, LocationStatus, ValidationResult,
};
