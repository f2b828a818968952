//! Data shapes and collaborator contracts at the boundary of the engine.

pub mod codes;
pub mod memory;
pub mod ports;
pub mod records;
pub mod trace;

pub use codes::{ChannelId, ChannelPattern, StationId};
pub use memory::{MemoryCatalog, MemoryTraceSource};
pub use ports::{
    Arrival, ArrivalModel, EventSource, FilterPrimitive, MarkerSink, Resampler, StationSource,
    TimeWindow, TraceSource, Visualizer,
};
pub use records::{Event, Marker, Station};
pub use trace::Trace;
