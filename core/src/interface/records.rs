use crate::interface::codes::{ChannelId, ChannelPattern, StationId};
use serde::{Deserialize, Serialize};

/// Sensor site metadata. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    #[serde(flatten)]
    pub id: StationId,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub elevation: f64,
    #[serde(default)]
    pub depth: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Station {
    pub fn new(id: StationId, lat: f64, lon: f64) -> Self {
        Self {
            id,
            lat,
            lon,
            elevation: 0.0,
            depth: 0.0,
            name: None,
        }
    }

    pub fn with_elevation(mut self, elevation: f64, depth: f64) -> Self {
        self.elevation = elevation;
        self.depth = depth;
        self
    }

    pub fn position(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }

    /// True if this station records `channel`, ignoring the channel code.
    pub fn owns(&self, channel: &ChannelId) -> bool {
        ChannelPattern::station(&self.id, "*").matches(channel)
    }
}

/// Seismic source. `depth` is in meters, `time` in epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub depth: f64,
    pub time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<f64>,
}

impl Event {
    pub fn position(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }
}

/// Time-window annotation over a set of channel patterns.
///
/// Picks carry a `phase`; markers derived by the SNR gate carry the phase
/// name suffixed with `_noise` for the noise window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub tmin: f64,
    pub tmax: f64,
    #[serde(default)]
    pub patterns: Vec<ChannelPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl Marker {
    pub fn pick(time: f64, pattern: ChannelPattern, phase: &str) -> Self {
        Self {
            tmin: time,
            tmax: time,
            patterns: vec![pattern],
            phase: Some(phase.to_string()),
            event: None,
        }
    }

    pub fn window(tmin: f64, tmax: f64, pattern: ChannelPattern) -> Self {
        Self {
            tmin,
            tmax,
            patterns: vec![pattern],
            phase: None,
            event: None,
        }
    }

    pub fn with_phase(mut self, phase: &str) -> Self {
        self.phase = Some(phase.to_string());
        self
    }

    pub fn with_event(mut self, event: &str) -> Self {
        self.event = Some(event.to_string());
        self
    }

    /// Event markers carry no channel patterns.
    pub fn is_event_marker(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, id: &ChannelId) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(id))
    }
}
