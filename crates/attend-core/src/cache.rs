//! Typed accessors for the persisted location and geofence cache.

use crate::store::{
    get_json, set_json, KeyValueStore, StoreError, KEY_GEOFENCE_EXPIRY, KEY_GEOFENCE_SETTINGS,
    KEY_LAST_KNOWN_LOCATION,
};
use crate::types::{CachedCoordinate, CachedGeofence, Coordinate, GeofenceConfig};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

/// Single-slot coordinate cache plus an expiring geofence copy.
///
/// Read failures are logged and reported as a miss; callers never see a
/// storage error on the read path.
#[derive(Clone)]
pub struct LocationCache {
    store: Arc<dyn KeyValueStore>,
}

impl LocationCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Last-known coordinate regardless of age.
    pub async fn load_coordinate(&self) -> Option<CachedCoordinate> {
        match get_json::<CachedCoordinate>(self.store.as_ref(), KEY_LAST_KNOWN_LOCATION).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(error = %e, "unreadable cached coordinate; treating as absent");
                None
            }
        }
    }

    /// Overwrite the coordinate slot, stamping it with the current time.
    pub async fn save_coordinate(&self, coordinate: &Coordinate) -> Result<(), StoreError> {
        let cached = CachedCoordinate {
            coordinate: coordinate.clone(),
            timestamp: Utc::now(),
        };
        set_json(self.store.as_ref(), KEY_LAST_KNOWN_LOCATION, &cached).await
    }

    /// Cached geofence with its expiry, or `None` if either half is missing or unreadable.
    async fn read_geofence(&self) -> Option<CachedGeofence> {
        let store = self.store.as_ref();
        let settings = get_json::<GeofenceConfig>(store, KEY_GEOFENCE_SETTINGS).await;
        let expiry = get_json::<i64>(store, KEY_GEOFENCE_EXPIRY).await;

        match (settings, expiry) {
            (Ok(Some(geofence)), Ok(Some(expiry_ms))) => {
                let expires_at = Utc.timestamp_millis_opt(expiry_ms).single()?;
                Some(CachedGeofence {
                    geofence,
                    expires_at,
                })
            }
            (Ok(_), Ok(_)) => None,
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "unreadable cached geofence; treating as absent");
                None
            }
        }
    }

    /// Geofence settings if cached and not yet expired at `now`.
    ///
    /// An expired entry is discarded from the store on the way out.
    pub async fn load_geofence(&self, now: DateTime<Utc>) -> Option<GeofenceConfig> {
        let cached = self.read_geofence().await?;
        if cached.is_expired(now) {
            tracing::debug!(expired_at = %cached.expires_at, "cached geofence expired");
            if let Err(e) = self.remove_geofence().await {
                tracing::warn!(error = %e, "failed to discard expired geofence");
            }
            return None;
        }
        Some(cached.geofence)
    }

    /// Persist geofence settings valid for `ttl` from now.
    pub async fn save_geofence(
        &self,
        geofence: &GeofenceConfig,
        ttl: Duration,
    ) -> Result<DateTime<Utc>, StoreError> {
        let expires_at = Utc::now() + ttl;
        let store = self.store.as_ref();
        set_json(store, KEY_GEOFENCE_SETTINGS, geofence).await?;
        set_json(store, KEY_GEOFENCE_EXPIRY, &expires_at.timestamp_millis()).await?;
        Ok(expires_at)
    }

    async fn remove_geofence(&self) -> Result<(), StoreError> {
        self.store.remove(KEY_GEOFENCE_SETTINGS).await?;
        self.store.remove(KEY_GEOFENCE_EXPIRY).await
    }

    /// Remove the geofence, its expiry and the last-known coordinate.
    ///
    /// Every key is attempted even if an earlier removal fails; the first
    /// error is returned.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let mut first_err = None;
        for key in [
            KEY_GEOFENCE_SETTINGS,
            KEY_GEOFENCE_EXPIRY,
            KEY_LAST_KNOWN_LOCATION,
        ] {
            if let Err(e) = self.store.remove(key).await {
                tracing::warn!(key, error = %e, "failed to clear cache entry");
                first_err.get_or_insert(e);
            }
        }
        tracing::info!("location cache cleared");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
