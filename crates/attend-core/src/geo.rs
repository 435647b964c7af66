//! Great-circle distance and geofence evaluation.

use crate::types::{GeofenceConfig, ValidationResult};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two latitude/longitude points (degrees).
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Clamp guards sqrt(1 - a) against a drifting past 1.0 for antipodal points.
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Haversine distance rounded to the nearest meter.
pub fn rounded_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> i64 {
    haversine_distance(lat1, lon1, lat2, lon2).round() as i64
}

/// Evaluate a device position against a geofence.
///
/// Comparison uses the rounded distance, so a point 100.4 m out is inside a
/// 100 m radius. An unconfigured geofence always reports `within_range`.
pub fn evaluate(
    geofence: &GeofenceConfig,
    latitude: f64,
    longitude: f64,
    from_cache: bool,
) -> ValidationResult {
    if !geofence.is_configured {
        return ValidationResult {
            within_range: true,
            distance_meters: 0,
            allowed_radius: geofence.radius_meters,
            is_configured: false,
            from_cache,
        };
    }

    let distance = rounded_distance(
        geofence.center_latitude,
        geofence.center_longitude,
        latitude,
        longitude,
    );

    ValidationResult {
        within_range: (distance as f64) <= geofence.radius_meters,
        distance_meters: distance,
        allowed_radius: geofence.radius_meters,
        is_configured: true,
        from_cache,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_symmetric() {
        let pairs = [
            ((52.5200, 13.4050), (48.8566, 2.3522)),
            ((-33.8688, 151.2093), (35.6762, 139.6503)),
            ((0.0, 0.0), (0.0, 179.9)),
        ];
        for ((a_lat, a_lon), (b_lat, b_lon)) in pairs {
            let ab = haversine_distance(a_lat, a_lon, b_lat, b_lon);
            let ba = haversine_distance(b_lat, b_lon, a_lat, a_lon);
            assert!((ab - ba).abs() < 1e-6, "{ab} != {ba}");
        }
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        assert_eq!(haversine_distance(12.9716, 77.5946, 12.9716, 77.5946), 0.0);
        assert_eq!(rounded_distance(-1.0, -1.0, -1.0, -1.0), 0);
    }

    #[test]
    fn test_hundredth_degree_latitude_at_equator() {
        // 0.01° of arc on a 6,371 km sphere ≈ 1,111.95 m.
        let d = rounded_distance(0.0, 0.0, 0.01, 0.0);
        assert!((d - 1112).abs() <= 1, "got {d}");
    }

    #[test]
    fn test_known_city_distance() {
        // Berlin → Paris is roughly 878 km great-circle.
        let d = haversine_distance(52.5200, 13.4050, 48.8566, 2.3522) / 1000.0;
        assert!((d - 878.0).abs() < 5.0, "got {d} km");
    }

    #[test]
    fn test_evaluate_outside_small_radius() {
        let fence = GeofenceConfig::new(0.0, 0.0, 100.0);
        let r = evaluate(&fence, 0.0, 0.001, true);
        assert!(!r.within_range);
        assert_eq!(r.distance_meters, 111);
        assert_eq!(r.allowed_radius, 100.0);
        assert!(r.is_configured);
        assert!(r.from_cache);
    }

    #[test]
    fn test_evaluate_inside_radius() {
        let fence = GeofenceConfig::new(0.0, 0.0, 200.0);
        let r = evaluate(&fence, 0.0, 0.001, false);
        assert!(r.within_range);
        assert!(!r.from_cache);
    }

    #[test]
    fn test_evaluate_unconfigured_always_passes() {
        let r = evaluate(&GeofenceConfig::unconfigured(), 45.0, 90.0, true);
        assert!(r.within_range);
        assert!(!r.is_configured);
        assert_eq!(r.distance_meters, 0);
    }
}
