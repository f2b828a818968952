use super::{DelayEntry, DelayTable};
use crate::interface::ChannelPattern;
use crate::math::geodesic::normalize_degrees;
use crate::processing::geometry::{ArrayGeometry, StationOffset};

/// Moveout of a plane wave arriving from `back_azimuth_deg` at a station.
///
/// The offset's azimuth points from the station to the center, so a
/// station lying towards the source gets a negative delay.
pub fn plane_wave_delay(offset: &StationOffset, back_azimuth_deg: f64, slowness_s_per_km: f64) -> f64 {
    if offset.distance_m == 0.0 {
        return 0.0;
    }
    let gamma = normalize_degrees(offset.azimuth_to_center_deg - back_azimuth_deg).to_radians();
    gamma.cos() * offset.distance_m * slowness_s_per_km / 1000.0
}

/// One entry per station, matching every channel of that station.
pub fn estimate(geometry: &ArrayGeometry, back_azimuth_deg: f64, slowness_s_per_km: f64) -> DelayTable {
    let entries = geometry
        .offsets
        .iter()
        .map(|offset| DelayEntry {
            pattern: ChannelPattern::station(&offset.station, "*"),
            delay: plane_wave_delay(offset, back_azimuth_deg, slowness_s_per_km),
        })
        .collect();
    DelayTable::new(entries)
}
