pub mod fft;
pub mod geodesic;
pub mod stats;

pub use fft::{cross_correlate, CrossCorrelation, FftHelper};
pub use geodesic::{Geodesic, GeodesicLine, Wgs84Geodesic};
pub use stats::StatsHelper;
