//! Mathematical primitives for the baryon-convolved potential pipeline.

pub mod fft;
pub mod interp;
pub mod spectral;
