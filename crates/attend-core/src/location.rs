//! Tiered location acquisition with a short-lived persisted cache.
//!
//! Order of attempts: a cached fix younger than the freshness threshold,
//! a high-accuracy provider fix, a low-accuracy (network) fix, and finally
//! any cached fix regardless of age.

use crate::cache::LocationCache;
use crate::types::Coordinate;
use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Parameters for a single provider request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccuracyProfile {
    /// GPS-grade fix when `true`, network/coarse fix otherwise.
    pub high_accuracy: bool,
    /// Give up on the request after this long.
    pub timeout: Duration,
    /// Accept a provider-internal cached fix no older than this.
    pub maximum_age: Duration,
}

impl AccuracyProfile {
    pub const HIGH: AccuracyProfile = AccuracyProfile {
        high_accuracy: true,
        timeout: Duration::from_secs(15),
        maximum_age: Duration::from_secs(10),
    };

    pub const LOW: AccuracyProfile = AccuracyProfile {
        high_accuracy: false,
        timeout: Duration::from_secs(30),
        maximum_age: Duration::from_secs(300),
    };
}

/// Why a position could not be obtained. Shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
}

impl UnavailableReason {
    pub fn message(&self) -> &'static str {
        match self {
            UnavailableReason::PermissionDenied => {
                "Location permission denied. Allow location access to mark attendance."
            }
            UnavailableReason::PositionUnavailable => {
                "Location unavailable. Enable location services and try again."
            }
            UnavailableReason::Timeout => {
                "Location request timed out. Move to an open area and try again."
            }
        }
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnavailableReason::PermissionDenied => "permission denied",
            UnavailableReason::PositionUnavailable => "position unavailable",
            UnavailableReason::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),
    #[error("no fix within {0:?}")]
    Timeout(Duration),
}

impl ProviderError {
    pub fn reason(&self) -> UnavailableReason {
        match self {
            ProviderError::PermissionDenied => UnavailableReason::PermissionDenied,
            ProviderError::PositionUnavailable(_) => UnavailableReason::PositionUnavailable,
            ProviderError::Timeout(_) => UnavailableReason::Timeout,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("location unavailable: {reason}")]
    LocationUnavailable { reason: UnavailableReason },
}

impl LocationError {
    pub fn reason(&self) -> UnavailableReason {
        match self {
            LocationError::LocationUnavailable { reason } => *reason,
        }
    }
}

/// Source of fresh device fixes.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self, profile: &AccuracyProfile)
        -> Result<Coordinate, ProviderError>;
}

/// Platform permission and location-service enablement.
#[async_trait]
pub trait DeviceCapability: Send + Sync {
    /// Ask for (or confirm) location permission.
    async fn request_permission(&self) -> bool;
    /// Make sure location services are switched on, prompting if the platform can.
    async fn ensure_enabled(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// A cached fix younger than this is returned without touching the provider.
    pub freshness: Duration,
    pub high: AccuracyProfile,
    pub low: AccuracyProfile,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            freshness: Duration::from_secs(120),
            high: AccuracyProfile::HIGH,
            low: AccuracyProfile::LOW,
        }
    }
}

pub struct LocationResolver<P, C> {
    provider: P,
    capability: C,
    cache: LocationCache,
    config: ResolverConfig,
}

impl<P: LocationProvider, C: DeviceCapability> LocationResolver<P, C> {
    pub fn new(provider: P, capability: C, cache: LocationCache, config: ResolverConfig) -> Self {
        Self {
            provider,
            capability,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &LocationCache {
        &self.cache
    }

    /// Current coordinate, preferring a fresh cached fix.
    pub async fn acquire_location(&self) -> Result<Coordinate, LocationError> {
        if let Some(cached) = self.cache.load_coordinate().await {
            let age = cached.age(Utc::now());
            let fresh = age
                .to_std()
                .map(|age| age < self.config.freshness)
                .unwrap_or(false);
            if fresh {
                tracing::debug!(age_secs = age.num_seconds(), "using cached coordinate");
                return Ok(cached.coordinate);
            }
        }
        self.refresh_location().await
    }

    /// Current coordinate from the provider, skipping the fresh-cache fast path.
    ///
    /// Still falls back to any cached coordinate when every tier fails.
    pub async fn refresh_location(&self) -> Result<Coordinate, LocationError> {
        let reason = match self.fresh_fix().await {
            Ok(coordinate) => {
                if let Err(e) = self.cache.save_coordinate(&coordinate).await {
                    tracing::warn!(error = %e, "failed to persist coordinate");
                }
                return Ok(coordinate);
            }
            Err(reason) => reason,
        };

        if let Some(stale) = self.cache.load_coordinate().await {
            tracing::warn!(
                %reason,
                age_secs = stale.age(Utc::now()).num_seconds(),
                "all location tiers failed; using last known coordinate"
            );
            return Ok(stale.coordinate);
        }

        tracing::warn!(%reason, "location unavailable and nothing cached");
        Err(LocationError::LocationUnavailable { reason })
    }

    /// Permission and enablement checks, then the high and low accuracy tiers.
    async fn fresh_fix(&self) -> Result<Coordinate, UnavailableReason> {
        if !self.capability.request_permission().await {
            tracing::warn!("location permission denied");
            return Err(UnavailableReason::PermissionDenied);
        }
        if !self.capability.ensure_enabled().await {
            tracing::warn!("location services disabled");
            return Err(UnavailableReason::PositionUnavailable);
        }

        match self.provider.current_position(&self.config.high).await {
            Ok(coordinate) => {
                tracing::debug!(accuracy = ?coordinate.accuracy, "high accuracy fix");
                return Ok(coordinate);
            }
            Err(e) => {
                tracing::info!(error = %e, "high accuracy fix failed; retrying with low accuracy");
            }
        }

        match self.provider.current_position(&self.config.low).await {
            Ok(coordinate) => {
                tracing::debug!(accuracy = ?coordinate.accuracy, "low accuracy fix");
                Ok(coordinate)
            }
            Err(e) => {
                tracing::warn!(error = %e, "low accuracy fix failed");
                Err(e.reason())
            }
        }
    }
}
