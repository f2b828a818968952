//! Array beamforming and coherent stacking core for seismic sensor arrays.
//!
//! Traces recorded across an array are delayed according to a plane-wave
//! model, cross-correlation or arrival picks, aligned onto a common wavefront
//! and summed per channel group. A companion SNR gate scores signal against
//! noise windows and derives which channels to hide.

pub mod interface;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use interface::{ChannelId, ChannelPattern, Event, Marker, Station, StationId, Trace};
pub use prelude::{EngineConfig, EngineError, EngineResult, RunState};
pub use processing::{ArrayEngine, EngineOutput, RunInputs};
