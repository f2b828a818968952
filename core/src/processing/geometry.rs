use crate::interface::{Station, StationId};
use crate::math::geodesic::{Geodesic, GeodesicLine, Wgs84Geodesic};
use crate::math::stats::StatsHelper;
use crate::prelude::{CenterOverride, EngineError, EngineResult};
use serde::{Deserialize, Serialize};

/// Network code given to synthesized array points and stacks.
pub const ARRAY_NETWORK: &str = "";
/// Station code given to synthesized array points and stacks.
pub const ARRAY_STATION: &str = "STK";

/// Geometric reference point of the array, created per run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArrayCenter {
    pub lat: f64,
    pub lon: f64,
    pub elevation: f64,
}

impl ArrayCenter {
    pub fn position(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }

    pub fn as_station(&self) -> Station {
        let mut station = Station::new(
            StationId::new(ARRAY_NETWORK, ARRAY_STATION, ""),
            self.lat,
            self.lon,
        )
        .with_elevation(self.elevation, 0.0);
        station.name = Some("Array Center".to_string());
        station
    }
}

/// Offset of one station relative to the array center.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationOffset {
    pub station: StationId,
    pub distance_m: f64,
    /// Azimuth from the station towards the center, degrees in `[0, 360)`.
    pub azimuth_to_center_deg: f64,
}

/// Resolved array geometry: center plus per-station offsets.
#[derive(Debug, Clone)]
pub struct ArrayGeometry {
    pub center: ArrayCenter,
    pub stations: Vec<Station>,
    pub offsets: Vec<StationOffset>,
}

impl ArrayGeometry {
    pub fn station_for(&self, id: &StationId) -> Option<&Station> {
        self.stations.iter().find(|s| &s.id == id)
    }
}

/// Geodesic mean of station positions.
///
/// Positions are averaged as unit vectors and converted back with `atan2`.
/// Components are summed in sorted order so the result does not depend on
/// the order of `stations`. A single station is returned unchanged.
pub fn compute_center(stations: &[Station]) -> EngineResult<ArrayCenter> {
    match stations {
        [] => Err(EngineError::Geometry(
            "cannot compute a center without stations".into(),
        )),
        [single] => Ok(ArrayCenter {
            lat: single.lat,
            lon: single.lon,
            elevation: single.elevation - single.depth,
        }),
        _ => {
            let n = stations.len() as f64;
            let mut xs = Vec::with_capacity(stations.len());
            let mut ys = Vec::with_capacity(stations.len());
            let mut zs = Vec::with_capacity(stations.len());
            let mut heights = Vec::with_capacity(stations.len());
            for station in stations {
                let (lat, lon) = (station.lat.to_radians(), station.lon.to_radians());
                xs.push(lat.cos() * lon.cos());
                ys.push(lat.cos() * lon.sin());
                zs.push(lat.sin());
                heights.push(station.elevation - station.depth);
            }
            let x = StatsHelper::ordered_sum(&mut xs) / n;
            let y = StatsHelper::ordered_sum(&mut ys) / n;
            let z = StatsHelper::ordered_sum(&mut zs) / n;
            let horizontal = x.hypot(y);
            if horizontal.hypot(z) < 1e-12 {
                return Err(EngineError::Geometry(
                    "stations are distributed symmetrically around the globe".into(),
                ));
            }
            Ok(ArrayCenter {
                lat: z.atan2(horizontal).to_degrees(),
                lon: y.atan2(x).to_degrees(),
                elevation: StatsHelper::ordered_sum(&mut heights) / n,
            })
        }
    }
}

/// Derives array reference points and station offsets.
pub struct GeometryModel<G: Geodesic = Wgs84Geodesic> {
    geodesic: G,
}

impl GeometryModel<Wgs84Geodesic> {
    pub fn new() -> Self {
        Self {
            geodesic: Wgs84Geodesic,
        }
    }
}

impl Default for GeometryModel<Wgs84Geodesic> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: Geodesic> GeometryModel<G> {
    pub fn with_geodesic(geodesic: G) -> Self {
        Self { geodesic }
    }

    pub fn compute_center(&self, stations: &[Station]) -> EngineResult<ArrayCenter> {
        compute_center(stations)
    }

    pub fn distance_azimuth(&self, from: (f64, f64), to: (f64, f64)) -> GeodesicLine {
        self.geodesic.inverse(from, to)
    }

    /// Resolves the center (or takes `center` as given) and every station's
    /// offset from it.
    pub fn resolve(
        &self,
        stations: Vec<Station>,
        center: Option<CenterOverride>,
    ) -> EngineResult<ArrayGeometry> {
        if stations.is_empty() {
            return Err(EngineError::Geometry("no stations available".into()));
        }
        let center = match center {
            Some(fixed) => {
                let computed = compute_center(&stations)?;
                ArrayCenter {
                    lat: fixed.lat,
                    lon: fixed.lon,
                    elevation: fixed.elevation.unwrap_or(computed.elevation),
                }
            }
            None => compute_center(&stations)?,
        };
        if !(center.lat.is_finite() && center.lon.is_finite()) {
            return Err(EngineError::Geometry(format!(
                "center ({}, {}) is not finite",
                center.lat, center.lon
            )));
        }

        let offsets = stations
            .iter()
            .map(|station| {
                let line = self
                    .geodesic
                    .inverse(station.position(), center.position());
                StationOffset {
                    station: station.id.clone(),
                    distance_m: line.distance_m,
                    azimuth_to_center_deg: line.azimuth_deg,
                }
            })
            .collect();

        Ok(ArrayGeometry {
            center,
            stations,
            offsets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(code: &str, lat: f64, lon: f64) -> Station {
        Station::new(StationId::new("XX", code, ""), lat, lon)
    }

    #[test]
    fn single_station_center_is_exact() {
        let only = station("A", 46.123_456_789, -122.987_654_321).with_elevation(120.0, 20.0);
        let center = compute_center(std::slice::from_ref(&only)).unwrap();
        assert_eq!(center.lat, only.lat);
        assert_eq!(center.lon, only.lon);
        assert_eq!(center.elevation, 100.0);
    }

    #[test]
    fn center_is_order_invariant_and_pure() {
        let stations = vec![
            station("A", 10.0, 20.0),
            station("B", 10.5, 20.7),
            station("C", 9.8, 21.1),
            station("D", 10.2, 19.6),
        ];
        let mut reversed = stations.clone();
        reversed.reverse();
        let first = compute_center(&stations).unwrap();
        let second = compute_center(&stations).unwrap();
        let swapped = compute_center(&reversed).unwrap();
        assert_eq!(first.lat.to_bits(), second.lat.to_bits());
        assert_eq!(first.lat.to_bits(), swapped.lat.to_bits());
        assert_eq!(first.lon.to_bits(), swapped.lon.to_bits());
    }

    #[test]
    fn center_handles_dateline_crossing() {
        let stations = vec![station("A", 0.0, 179.0), station("B", 0.0, -179.0)];
        let center = compute_center(&stations).unwrap();
        assert!((center.lon.abs() - 180.0).abs() < 1e-9, "{}", center.lon);
        assert!(center.lat.abs() < 1e-9);
    }

    #[test]
    fn empty_station_list_is_geometry_error() {
        assert!(matches!(compute_center(&[]), Err(EngineError::Geometry(_))));
        let model = GeometryModel::new();
        assert!(model.resolve(Vec::new(), None).is_err());
    }

    #[test]
    fn resolve_uses_override_and_measures_offsets() {
        let model = GeometryModel::new();
        let geometry = model
            .resolve(
                vec![station("A", 0.0, 0.0), station("B", 1.0, 0.0)],
                Some(CenterOverride {
                    lat: 0.0,
                    lon: 0.0,
                    elevation: None,
                }),
            )
            .unwrap();
        assert_eq!(geometry.center.lat, 0.0);
        assert_eq!(geometry.offsets[0].distance_m, 0.0);
        assert!((geometry.offsets[1].distance_m - 110_574.4).abs() < 1.0);
        assert!((geometry.offsets[1].azimuth_to_center_deg - 180.0).abs() < 1e-9);
    }
}
