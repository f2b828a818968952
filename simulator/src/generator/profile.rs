use crate::generator::template::Wavelet;
use anyhow::Context;
use beamcore::interface::{ChannelId, ChannelPattern, Event, Marker, Station, StationId, Trace};
use beamcore::processing::delay::plane_wave;
use beamcore::processing::GeometryModel;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const KM_PER_DEGREE: f64 = 111.195;

/// Configuration for a synthetic array recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub network: String,
    /// Stations on the outer ring; one more sits at the center.
    pub ring_stations: usize,
    pub aperture_km: f64,
    pub center_lat: f64,
    pub center_lon: f64,
    pub back_azimuth_deg: f64,
    pub slowness_s_per_km: f64,
    pub channels: Vec<String>,
    pub sample_interval: f64,
    pub duration_s: f64,
    pub onset_s: f64,
    pub start_time: f64,
    pub wavelet: Wavelet,
    pub frequency_hz: f64,
    pub noise: f64,
    pub seed: u64,
    pub event_distance_km: f64,
    pub event_depth_km: f64,
    pub velocity_km_s: f64,
    pub scenario: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            network: "SY".into(),
            ring_stations: 6,
            aperture_km: 20.0,
            center_lat: 46.0,
            center_lon: 8.0,
            back_azimuth_deg: 60.0,
            slowness_s_per_km: 0.12,
            channels: vec!["Z".into()],
            sample_interval: 0.01,
            duration_s: 60.0,
            onset_s: 30.0,
            start_time: 0.0,
            wavelet: Wavelet::Ricker,
            frequency_hz: 2.0,
            noise: 0.05,
            seed: 0,
            event_distance_km: 300.0,
            event_depth_km: 10.0,
            velocity_km_s: 6.0,
            scenario: None,
        }
    }
}

/// Everything the engine needs for one synthetic run.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub stations: Vec<Station>,
    pub event: Event,
    pub traces: Vec<Trace>,
    pub picks: Vec<Marker>,
}

/// Point `distance_km` away from `(lat, lon)` towards `azimuth_deg`, on a
/// local flat-earth approximation.
fn offset_position(lat: f64, lon: f64, distance_km: f64, azimuth_deg: f64) -> (f64, f64) {
    let az = azimuth_deg.to_radians();
    let dlat = distance_km * az.cos() / KM_PER_DEGREE;
    let dlon = distance_km * az.sin() / (KM_PER_DEGREE * lat.to_radians().cos());
    (lat + dlat, lon + dlon)
}

fn build_stations(config: &GeneratorConfig) -> Vec<Station> {
    let mut stations = vec![Station::new(
        StationId::new(&config.network, "A00", ""),
        config.center_lat,
        config.center_lon,
    )];
    let radius = config.aperture_km / 2.0;
    for index in 0..config.ring_stations {
        let azimuth = 360.0 * index as f64 / config.ring_stations as f64;
        let (lat, lon) = offset_position(config.center_lat, config.center_lon, radius, azimuth);
        stations.push(Station::new(
            StationId::new(&config.network, &format!("A{:02}", index + 1), ""),
            lat,
            lon,
        ));
    }
    stations
}

pub fn build_scenario(config: &GeneratorConfig) -> anyhow::Result<Scenario> {
    anyhow::ensure!(config.sample_interval > 0.0, "sample interval must be positive");
    anyhow::ensure!(config.frequency_hz > 0.0, "wavelet frequency must be positive");
    let sample_count = (config.duration_s / config.sample_interval).round() as usize;
    anyhow::ensure!(sample_count > 0, "scenario duration yields no samples");

    let stations = build_stations(config);
    let geometry = GeometryModel::new()
        .resolve(stations.clone(), None)
        .context("resolving synthetic array geometry")?;
    let moveout = plane_wave::estimate(
        &geometry,
        config.back_azimuth_deg,
        config.slowness_s_per_km,
    );

    let (event_lat, event_lon) = offset_position(
        geometry.center.lat,
        geometry.center.lon,
        config.event_distance_km,
        config.back_azimuth_deg,
    );
    let event_name = config
        .scenario
        .clone()
        .unwrap_or_else(|| "synthetic".to_string());
    let travel = config.event_distance_km.hypot(config.event_depth_km) / config.velocity_km_s;
    let event = Event {
        name: event_name.clone(),
        lat: event_lat,
        lon: event_lon,
        depth: config.event_depth_km * 1000.0,
        time: config.start_time + config.onset_s - travel,
        magnitude: Some(4.5),
    };

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut traces = Vec::with_capacity(stations.len() * config.channels.len());
    let mut picks = Vec::with_capacity(stations.len());
    for station in &stations {
        let reference_channel = ChannelId::new(
            &station.id.network,
            &station.id.station,
            &station.id.location,
            "Z",
        );
        let delay = moveout
            .delay_for(&reference_channel)
            .with_context(|| format!("no moveout for {}", station.id))?;
        for channel in &config.channels {
            let samples = (0..sample_count)
                .map(|i| {
                    let t = i as f64 * config.sample_interval - config.onset_s - delay;
                    let jitter = if config.noise > 0.0 {
                        rng.gen_range(-config.noise..config.noise)
                    } else {
                        0.0
                    };
                    config.wavelet.sample(t, config.frequency_hz) + jitter
                })
                .collect();
            traces.push(Trace::new(
                ChannelId::new(
                    &station.id.network,
                    &station.id.station,
                    &station.id.location,
                    channel,
                ),
                config.start_time,
                config.sample_interval,
                samples,
            ));
        }
        picks.push(
            Marker::pick(
                config.start_time + config.onset_s + delay,
                ChannelPattern::station(&station.id, "*"),
                "P",
            )
            .with_event(&event_name),
        );
    }

    Ok(Scenario {
        stations,
        event,
        traces,
        picks,
    })
}
