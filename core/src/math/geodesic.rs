//! Inverse geodesic problem on the WGS84 ellipsoid.
//!
//! Solved with Karney's algorithm from `geographiclib-rs`, accurate to a
//! few nanometres for any pair of points, antipodal ones included.

use geographiclib_rs::{Geodesic as Ellipsoid, InverseGeodesic};
use std::sync::OnceLock;

/// Distance and initial azimuth from one point to another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeodesicLine {
    pub distance_m: f64,
    /// Forward azimuth at the start point, degrees clockwise from north in `[0, 360)`.
    pub azimuth_deg: f64,
}

/// Trusted distance/azimuth primitive. Points are `(lat, lon)` in degrees.
pub trait Geodesic {
    fn inverse(&self, from: (f64, f64), to: (f64, f64)) -> GeodesicLine;
}

fn wgs84() -> &'static Ellipsoid {
    static WGS84: OnceLock<Ellipsoid> = OnceLock::new();
    WGS84.get_or_init(Ellipsoid::wgs84)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Wgs84Geodesic;

impl Geodesic for Wgs84Geodesic {
    fn inverse(&self, from: (f64, f64), to: (f64, f64)) -> GeodesicLine {
        if from == to {
            return GeodesicLine {
                distance_m: 0.0,
                azimuth_deg: 0.0,
            };
        }
        let (distance_m, azimuth, _, _): (f64, f64, f64, f64) =
            wgs84().inverse(from.0, from.1, to.0, to.1);
        GeodesicLine {
            distance_m,
            azimuth_deg: normalize_degrees(azimuth),
        }
    }
}

pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_degree_along_equator() {
        let line = Wgs84Geodesic.inverse((0.0, 0.0), (0.0, 1.0));
        assert!((line.distance_m - 111_319.491).abs() < 0.01, "{}", line.distance_m);
        assert!((line.azimuth_deg - 90.0).abs() < 1e-9);
    }

    #[test]
    fn one_degree_along_meridian() {
        let line = Wgs84Geodesic.inverse((0.0, 0.0), (1.0, 0.0));
        assert!((line.distance_m - 110_574.389).abs() < 0.5, "{}", line.distance_m);
        assert!(line.azimuth_deg.abs() < 1e-9);
    }

    #[test]
    fn reverse_direction_points_back() {
        let line = Wgs84Geodesic.inverse((0.0, 1.0), (0.0, 0.0));
        assert!((line.azimuth_deg - 270.0).abs() < 1e-9);
    }

    #[test]
    fn identical_points_have_zero_distance() {
        let line = Wgs84Geodesic.inverse((47.3, 8.5), (47.3, 8.5));
        assert_eq!(line.distance_m, 0.0);
    }

    #[test]
    fn near_antipodal_distance_stays_finite() {
        let line = Wgs84Geodesic.inverse((0.0, 0.0), (0.5, 179.7));
        assert!(line.distance_m > 19_900_000.0 && line.distance_m < 20_100_000.0);
    }

    #[test]
    fn exact_antipodes_resolve_half_meridian() {
        let line = Wgs84Geodesic.inverse((0.0, 0.0), (0.0, 180.0));
        assert!((line.distance_m - 20_003_931.459).abs() < 0.01, "{}", line.distance_m);
    }
}
