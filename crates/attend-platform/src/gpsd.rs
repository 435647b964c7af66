//! Location provider backed by a local gpsd daemon.
//!
//! Speaks the gpsd JSON protocol over TCP: enable a JSON watch, then read
//! newline-delimited reports until a `TPV` report satisfies the requested
//! accuracy profile.

use async_trait::async_trait;
use attend_core::{AccuracyProfile, Coordinate, DeviceCapability, LocationProvider, ProviderError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

pub const DEFAULT_GPSD_ADDR: &str = "127.0.0.1:2947";

const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";

/// gpsd fix modes.
const MODE_2D: u8 = 2;
const MODE_3D: u8 = 3;

/// Subset of a gpsd report; non-TPV classes only need `class`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Report {
    class: String,
    mode: u8,
    time: Option<DateTime<Utc>>,
    lat: Option<f64>,
    lon: Option<f64>,
    /// Longitude / latitude error estimates in meters (95% confidence).
    epx: Option<f64>,
    epy: Option<f64>,
}

/// Turn a report into a coordinate if it meets the profile at `now`.
fn accept(report: &Report, profile: &AccuracyProfile, now: DateTime<Utc>) -> Option<Coordinate> {
    if report.class != "TPV" {
        return None;
    }
    let required = if profile.high_accuracy { MODE_3D } else { MODE_2D };
    if report.mode < required {
        return None;
    }
    let (latitude, longitude) = (report.lat?, report.lon?);

    let captured_at = report.time.unwrap_or(now);
    let age = (now - captured_at).to_std().unwrap_or(Duration::ZERO);
    if age > profile.maximum_age {
        tracing::trace!(age_secs = age.as_secs(), "gpsd report too old");
        return None;
    }

    let accuracy = match (report.epx, report.epy) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, y) => x.or(y),
    };

    Some(Coordinate {
        latitude,
        longitude,
        accuracy,
        captured_at,
    })
}

pub struct GpsdProvider {
    addr: String,
}

impl GpsdProvider {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn watch(&self, profile: &AccuracyProfile) -> Result<Coordinate, ProviderError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| {
                ProviderError::PositionUnavailable(format!("gpsd at {}: {e}", self.addr))
            })?;
        let (reader, mut writer) = stream.into_split();

        writer
            .write_all(WATCH_COMMAND)
            .await
            .map_err(|e| ProviderError::PositionUnavailable(format!("gpsd watch: {e}")))?;

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| ProviderError::PositionUnavailable(format!("gpsd read: {e}")))?
        {
            let report = match serde_json::from_str::<Report>(&line) {
                Ok(r) => r,
                Err(e) => {
                    tracing::trace!(error = %e, "skipping unparseable gpsd line");
                    continue;
                }
            };
            if let Some(coordinate) = accept(&report, profile, Utc::now()) {
                return Ok(coordinate);
            }
        }

        Err(ProviderError::PositionUnavailable(
            "gpsd closed the connection".into(),
        ))
    }
}

#[async_trait]
impl LocationProvider for GpsdProvider {
    async fn current_position(
        &self,
        profile: &AccuracyProfile,
    ) -> Result<Coordinate, ProviderError> {
        tracing::debug!(
            addr = %self.addr,
            high_accuracy = profile.high_accuracy,
            timeout_secs = profile.timeout.as_secs(),
            "requesting gpsd fix"
        );
        tokio::time::timeout(profile.timeout, self.watch(profile))
            .await
            .map_err(|_| ProviderError::Timeout(profile.timeout))?
    }
}

/// Capability for gpsd: there is no OS permission prompt, and "enabled"
/// means the daemon accepts connections.
pub struct GpsdCapability {
    addr: String,
    probe_timeout: Duration,
}

impl GpsdCapability {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

#[async_trait]
impl DeviceCapability for GpsdCapability {
    async fn request_permission(&self) -> bool {
        true
    }

    async fn ensure_enabled(&self) -> bool {
        match tokio::time::timeout(self.probe_timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::warn!(addr = %self.addr, error = %e, "gpsd not reachable");
                false
            }
            Err(_) => {
                tracing::warn!(addr = %self.addr, "gpsd probe timed out");
                false
            }
        }
    }
}
