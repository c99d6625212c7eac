// Rust guideline compliant 2026-08-21

//! Geographic primitives for the safety-alert engine.
//!
//! Defines [`Coordinate`] and the great-circle [`distance_km`] function.
//! Pure computation only; no I/O, no dependencies.

/// Mean Earth radius in kilometers, used by the haversine formula.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A geographic position in decimal degrees.
///
/// Latitude is expected in `[-90, 90]`, longitude in `[-180, 180]`.
/// Ranges are validated at the request boundary, not here. Coordinates
/// have no identity of their own and are always carried inline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    /// Latitude in decimal degrees, positive north.
    pub latitude: f64,
    /// Longitude in decimal degrees, positive east.
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate from latitude/longitude in decimal degrees.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Great-circle distance between two coordinates in kilometers.
///
/// Haversine formula over a spherical Earth (R = 6371 km). Deterministic
/// and symmetric: `distance_km(a, b) == distance_km(b, a)` and
/// `distance_km(a, a) == 0`.
#[must_use]
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::{Coordinate, distance_km};

    // GEO-T01: distance from a point to itself is exactly zero.
    #[test]
    // 0.0 is an exact result of the formula when both inputs are identical.
    #[expect(clippy::float_cmp, reason = "exact zero for identical inputs")]
    fn identical_points_are_zero() {
        let p = Coordinate::new(48.8566, 2.3522);
        assert_eq!(distance_km(p, p), 0.0);
    }

    // GEO-T02: distance is symmetric.
    #[test]
    #[expect(clippy::float_cmp, reason = "identical operations in both directions")]
    fn symmetric() {
        let a = Coordinate::new(48.8566, 2.3522);
        let b = Coordinate::new(51.5074, -0.1278);
        assert_eq!(distance_km(a, b), distance_km(b, a));
    }

    // GEO-T03: one degree of longitude at the equator is ~111.19 km (+/- 1%).
    #[test]
    fn one_degree_longitude_at_equator() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 1.0);
        let d = distance_km(a, b);
        let expected = 111.19;
        assert!(
            (d - expected).abs() < expected * 0.01,
            "expected ~{expected} km, got {d} km"
        );
    }

    // GEO-T04: a known city pair lands in the expected range (Paris-London ~344 km).
    #[test]
    fn paris_to_london() {
        let paris = Coordinate::new(48.8566, 2.3522);
        let london = Coordinate::new(51.5074, -0.1278);
        let d = distance_km(paris, london);
        assert!((330.0..360.0).contains(&d), "got {d} km");
    }

    // GEO-T05: antipodal points are half the Earth's circumference (~20015 km).
    #[test]
    fn antipodal_points() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 180.0);
        let d = distance_km(a, b);
        assert!((d - 20_015.0).abs() < 10.0, "got {d} km");
    }
}
