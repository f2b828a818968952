pub mod filter;
pub mod resample;
