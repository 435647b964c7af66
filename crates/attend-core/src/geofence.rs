//! Geofence pre-check: local Haversine against a cached office geofence,
//! falling back to the backend, and failing open when neither answers.

use crate::cache::LocationCache;
use crate::geo;
use crate::store::StoreError;
use crate::types::{GeofenceConfig, ValidationResult};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Office center as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OfficeLocation {
    pub lat: f64,
    pub lng: f64,
}

/// Body of `POST /api/location/validate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteValidation {
    pub within_range: bool,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub allowed_radius: f64,
    #[serde(default)]
    pub is_configured: bool,
    #[serde(default)]
    pub office_location: Option<OfficeLocation>,
}

impl RemoteValidation {
    /// Geofence worth caching: only a configured fence with a known center.
    pub fn geofence(&self) -> Option<GeofenceConfig> {
        if !self.is_configured {
            return None;
        }
        let office = self.office_location?;
        Some(GeofenceConfig::new(office.lat, office.lng, self.allowed_radius))
    }

    /// Without a configured geofence every position is in range.
    fn into_result(self) -> ValidationResult {
        if !self.is_configured {
            return ValidationResult::permissive();
        }
        ValidationResult {
            within_range: self.within_range,
            distance_meters: self.distance.round() as i64,
            allowed_radius: self.allowed_radius,
            is_configured: self.is_configured,
            from_cache: false,
        }
    }
}

/// Backend geofence check used when the local cache cannot answer.
#[async_trait]
pub trait RemoteGeofence: Send + Sync {
    type Error: fmt::Display + Send;

    async fn validate(&self, latitude: f64, longitude: f64)
        -> Result<RemoteValidation, Self::Error>;
}

pub struct GeofenceValidator {
    cache: LocationCache,
    ttl: Duration,
}

impl GeofenceValidator {
    /// Geofence cache lifetime of one hour.
    pub fn new(cache: LocationCache) -> Self {
        Self::with_ttl(cache, Duration::hours(1))
    }

    pub fn with_ttl(cache: LocationCache, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Validate a position against the office geofence. Never fails.
    pub async fn validate_location_fast<R: RemoteGeofence + ?Sized>(
        &self,
        latitude: f64,
        longitude: f64,
        remote: &R,
    ) -> ValidationResult {
        if let Some(geofence) = self.cache.load_geofence(Utc::now()).await {
            let result = geo::evaluate(&geofence, latitude, longitude, true);
            tracing::debug!(
                distance = result.distance_meters,
                radius = result.allowed_radius,
                within_range = result.within_range,
                "geofence validated from cache"
            );
            return result;
        }

        match remote.validate(latitude, longitude).await {
            Ok(remote_result) => {
                if let Some(geofence) = remote_result.geofence() {
                    match self.cache.save_geofence(&geofence, self.ttl).await {
                        Ok(expires_at) => {
                            tracing::debug!(%expires_at, "geofence cached");
                        }
                        Err(e) => tracing::warn!(error = %e, "failed to cache geofence"),
                    }
                }
                let result = remote_result.into_result();
                tracing::debug!(
                    distance = result.distance_meters,
                    within_range = result.within_range,
                    configured = result.is_configured,
                    "geofence validated remotely"
                );
                result
            }
            Err(e) => {
                tracing::warn!(error = %e, "geofence validation unavailable; allowing");
                ValidationResult::permissive()
            }
        }
    }

    /// Drop the cached geofence and last-known coordinate (logout / explicit refresh).
    pub async fn clear_location_cache(&self) -> Result<(), StoreError> {
        self.cache.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{
        set_json, FailingStore, KeyValueStore, MemoryStore, KEY_GEOFENCE_EXPIRY,
        KEY_GEOFENCE_SETTINGS,
    };
    use crate::types::Coordinate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeRemote {
        response: Option<RemoteValidation>,
        calls: AtomicUsize,
    }

    impl FakeRemote {
        fn ok(response: RemoteValidation) -> Self {
            Self {
                response: Some(response),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                response: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteGeofence for FakeRemote {
        type Error = String;

        async fn validate(
            &self,
            _latitude: f64,
            _longitude: f64,
        ) -> Result<RemoteValidation, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone().ok_or_else(|| "connection refused".to_string())
        }
    }

    fn office_response() -> RemoteValidation {
        RemoteValidation {
            within_range: true,
            distance: 42.4,
            allowed_radius: 100.0,
            is_configured: true,
            office_location: Some(OfficeLocation { lat: 0.0, lng: 0.0 }),
        }
    }

    fn validator() -> (Arc<MemoryStore>, GeofenceValidator) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), GeofenceValidator::new(LocationCache::new(store)))
    }

    #[tokio::test]
    async fn test_cached_geofence_answers_locally() {
        let (store, validator) = validator();
        LocationCache::new(store)
            .save_geofence(&GeofenceConfig::new(0.0, 0.0, 100.0), Duration::hours(1))
            .await
            .unwrap();
        let remote = FakeRemote::ok(office_response());

        let result = validator.validate_location_fast(0.0, 0.001, &remote).await;

        assert_eq!(remote.calls(), 0);
        assert!(result.from_cache);
        assert!(result.is_configured);
        assert!(!result.within_range);
        assert_eq!(result.distance_meters, 111);
    }

    #[tokio::test]
    async fn test_expired_geofence_goes_remote() {
        let (store, validator) = validator();
        set_json(store.as_ref(), KEY_GEOFENCE_SETTINGS, &GeofenceConfig::new(0.0, 0.0, 100.0))
            .await
            .unwrap();
        let past = (Utc::now() - Duration::seconds(1)).timestamp_millis();
        set_json(store.as_ref(), KEY_GEOFENCE_EXPIRY, &past).await.unwrap();
        let remote = FakeRemote::ok(office_response());

        let result = validator.validate_location_fast(0.0, 0.0003, &remote).await;

        assert_eq!(remote.calls(), 1);
        assert!(!result.from_cache);
        assert_eq!(result.distance_meters, 42);
    }

    #[tokio::test]
    async fn test_remote_result_is_cached_for_next_call() {
        let (_, validator) = validator();
        let remote = FakeRemote::ok(office_response());

        let first = validator.validate_location_fast(0.0, 0.0003, &remote).await;
        let second = validator.validate_location_fast(0.0, 0.0003, &remote).await;

        assert_eq!(remote.calls(), 1);
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(second.distance_meters, 33);
        assert!(second.within_range);
    }

    #[tokio::test]
    async fn test_unconfigured_remote_is_not_cached() {
        let (store, validator) = validator();
        let remote = FakeRemote::ok(RemoteValidation {
            within_range: true,
            distance: 0.0,
            allowed_radius: 0.0,
            is_configured: false,
            office_location: None,
        });

        let result = validator.validate_location_fast(1.0, 1.0, &remote).await;

        assert!(result.within_range);
        assert!(!result.is_configured);
        assert!(store.get(KEY_GEOFENCE_SETTINGS).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_remote_is_always_within_range() {
        let (_, validator) = validator();
        let body = r#"{"withinRange":false,"distance":5000,"isConfigured":false,"officeLocation":null}"#;
        let remote = FakeRemote::ok(serde_json::from_str(body).unwrap());

        let result = validator.validate_location_fast(1.0, 1.0, &remote).await;

        assert_eq!(remote.calls(), 1);
        assert!(result.within_range);
        assert!(!result.is_configured);
        assert_eq!(result.distance_meters, 0);
        assert_eq!(result.status(), crate::types::LocationStatus::Unconfigured);
    }

    #[tokio::test]
    async fn test_storage_failure_still_returns_remote_result() {
        let validator = GeofenceValidator::new(LocationCache::new(Arc::new(FailingStore)));
        let remote = FakeRemote::ok(office_response());

        let result = validator.validate_location_fast(0.0, 0.0003, &remote).await;

        assert_eq!(remote.calls(), 1);
        assert!(!result.from_cache);
        assert!(result.within_range);
        assert!(result.is_configured);
        assert_eq!(result.distance_meters, 42);
    }

    #[tokio::test]
    async fn test_remote_failure_without_cache_fails_open() {
        let (_, validator) = validator();
        let remote = FakeRemote::failing();

        let result = validator.validate_location_fast(48.0, 11.0, &remote).await;

        assert_eq!(remote.calls(), 1);
        assert!(result.within_range);
        assert!(!result.is_configured);
        assert_eq!(result.distance_meters, 0);
    }

    #[tokio::test]
    async fn test_clear_location_cache_forgets_geofence_and_position() {
        let (store, validator) = validator();
        let cache = LocationCache::new(store.clone());
        cache.save_coordinate(&Coordinate::new(1.0, 1.0, None)).await.unwrap();
        validator
            .validate_location_fast(0.0, 0.0, &FakeRemote::ok(office_response()))
            .await;

        validator.clear_location_cache().await.unwrap();

        assert!(cache.load_coordinate().await.is_none());
        assert!(cache.load_geofence(Utc::now()).await.is_none());
        let remote = FakeRemote::failing();
        let result = validator.validate_location_fast(0.0, 0.0, &remote).await;
        assert_eq!(remote.calls(), 1);
        assert!(!result.from_cache);
    }

    #[test]
    fn test_remote_validation_parses_backend_body() {
        let body = r#"{"withinRange":false,"distance":250.6,"allowedRadius":200,
            "isConfigured":true,"officeLocation":{"lat":12.97,"lng":77.59}}"#;
        let parsed: RemoteValidation = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.geofence(), Some(GeofenceConfig::new(12.97, 77.59, 200.0)));
        assert_eq!(parsed.into_result().distance_meters, 251);
    }
}
