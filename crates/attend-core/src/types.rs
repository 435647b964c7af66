use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A device position, either a fresh provider fix or restored from cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in meters, if the provider reports one.
    pub accuracy: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64, accuracy: Option<f64>) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            captured_at: Utc::now(),
        }
    }

    /// Time elapsed since the fix was taken. Negative clock skew clamps to zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.captured_at).max(Duration::zero())
    }
}

/// Office geofence as configured on the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceConfig {
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub radius_meters: f64,
    /// `false` when the backend has no geofence set; validation then always passes.
    pub is_configured: bool,
}

impl GeofenceConfig {
    pub fn new(center_latitude: f64, center_longitude: f64, radius_meters: f64) -> Self {
        Self {
            center_latitude,
            center_longitude,
            radius_meters,
            is_configured: true,
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            center_latitude: 0.0,
            center_longitude: 0.0,
            radius_meters: 0.0,
            is_configured: false,
        }
    }
}

/// Last-known coordinate as persisted in the single cache slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedCoordinate {
    pub coordinate: Coordinate,
    pub timestamp: DateTime<Utc>,
}

impl CachedCoordinate {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).max(Duration::zero())
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.age(now) < threshold
    }
}

/// Geofence settings together with the instant they stop being trusted.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedGeofence {
    pub geofence: GeofenceConfig,
    pub expires_at: DateTime<Utc>,
}

impl CachedGeofence {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Outcome of a geofence validation, rendered by the UI as a status badge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub within_range: bool,
    /// Distance to the geofence center, rounded to the nearest meter.
    pub distance_meters: i64,
    pub allowed_radius: f64,
    pub is_configured: bool,
    pub from_cache: bool,
}

impl ValidationResult {
    /// Fail-open default used when neither the cache nor the backend can answer.
    pub fn permissive() -> Self {
        Self {
            within_range: true,
            distance_meters: 0,
            allowed_radius: 0.0,
            is_configured: false,
            from_cache: false,
        }
    }

    pub fn status(&self) -> LocationStatus {
        if !self.is_configured {
            LocationStatus::Unconfigured
        } else if self.within_range {
            LocationStatus::WithinRange
        } else {
            LocationStatus::OutOfRange
        }
    }
}

/// Status taxonomy consumed by the attendance screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationStatus {
    Unconfigured,
    WithinRange,
    OutOfRange,
}

impl LocationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            LocationStatus::Unconfigured => "no office location configured",
            LocationStatus::WithinRange => "within office range",
            LocationStatus::OutOfRange => "outside office range",
        }
    }
}
