pub mod align;
pub mod arrivals;
pub mod characteristic;
pub mod delay;
pub mod engine;
pub mod geometry;
pub mod prefilter;
pub mod scan;
pub mod snr;
pub mod stack;

pub use align::{align, Aligner, AppliedShift};
pub use arrivals::{ArrivalCache, HomogeneousHalfSpace};
pub use characteristic::{Characteristic, CharacteristicFunction};
pub use delay::{AlignmentMethod, DelayEntry, DelayEstimator, DelayTable};
pub use engine::{AbortHandle, ArrayEngine, EngineOutput, PreparedRun, RunInputs};
pub use geometry::{compute_center, ArrayCenter, ArrayGeometry, GeometryModel, StationOffset};
pub use prefilter::BandFilter;
pub use scan::{
    beam, beam_power, beam_scan, depth_grid, scan_row, stack_energy, BeamPeak, BeamScan,
    DepthScan, ScanGrid,
};
pub use snr::{SnrConfig, SnrGate, SnrKey, SnrMethod, SnrRecord, SnrReference, SnrReport};
pub use stack::{AddOutcome, GroupKey, GroupStrictness, StackAccumulator, Stacker};
