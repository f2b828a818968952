//! Narrow interfaces of the collaborators the engine consumes.

use crate::interface::codes::{ChannelId, ChannelPattern, StationId};
use crate::interface::records::{Event, Marker, Station};
use crate::interface::trace::Trace;
use serde::{Deserialize, Serialize};

/// Closed-or-open time range used for selecting and chopping traces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(default)]
    pub tmin: Option<f64>,
    #[serde(default)]
    pub tmax: Option<f64>,
}

impl TimeWindow {
    pub fn new(tmin: f64, tmax: f64) -> Self {
        Self {
            tmin: Some(tmin),
            tmax: Some(tmax),
        }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }
}

/// Source of waveform data.
///
/// `chopper` yields lazily produced batches of trace copies restricted to
/// `window`; every call starts a fresh iteration.
pub trait TraceSource {
    fn chopper<'a>(
        &'a self,
        window: TimeWindow,
        selector: &'a dyn Fn(&ChannelId) -> bool,
    ) -> Box<dyn Iterator<Item = Vec<Trace>> + 'a>;

    /// Every channel identity the source knows about.
    fn channel_ids(&self) -> Vec<ChannelId>;
}

pub trait StationSource {
    fn stations(&self) -> Vec<Station>;

    fn station(&self, id: &StationId) -> Option<Station> {
        self.stations().into_iter().find(|s| &s.id == id)
    }
}

pub trait EventSource {
    fn events(&self) -> Vec<Event>;
}

/// External in-place DSP filter.
pub trait FilterPrimitive {
    fn highpass(&self, trace: &mut Trace, order: u32, corner_hz: f64);
    fn lowpass(&self, trace: &mut Trace, order: u32, corner_hz: f64);
}

/// A single predicted phase arrival, seconds after origin time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrival {
    pub phase: String,
    pub time: f64,
}

/// Travel-time model. Distances and depth are in meters.
pub trait ArrivalModel {
    fn travel_times(&self, distance_m: f64, depth_m: f64, phases: &[String]) -> Vec<Arrival>;
}

/// Converts a trace to a new sample interval; `None` if it cannot.
pub trait Resampler {
    fn resample(&self, trace: &Trace, delta: f64) -> Option<Trace>;
}

/// Receives derived markers. Fire-and-forget.
pub trait MarkerSink {
    fn add_markers(&mut self, markers: &[Marker]);
}

/// Receives rendered outputs. Fire-and-forget.
pub trait Visualizer {
    fn show_traces(&mut self, traces: &[Trace]);
    fn hide(&mut self, patterns: &[ChannelPattern]);
}
