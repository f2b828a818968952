use beamcore::interface::{Marker, Trace};
use beamcore::math::StatsHelper;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceSummary {
    pub id: String,
    pub start: f64,
    pub samples: usize,
    pub peak: f64,
    pub rms: f64,
}

impl TraceSummary {
    pub fn from_trace(trace: &Trace) -> Self {
        Self {
            id: trace.id.to_string(),
            start: trace.start,
            samples: trace.len(),
            peak: StatsHelper::peak_abs(&trace.samples),
            rms: StatsHelper::rms(&trace.samples),
        }
    }
}

/// Latest state pushed to the viewer by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ViewerModel {
    pub traces: Vec<TraceSummary>,
    pub markers: Vec<Marker>,
    pub hidden: Vec<String>,
}
