//! Rotation-curve prediction from a convolution-modified Newtonian potential.
//!
//! Stage 1: grid, density, kernel
//! Stage 2: rotation-curve assembly
//! Stage 3: adaptive length interpolation, parameter survey

pub mod adaptive;
pub mod density;
pub mod grid;
pub mod kernel;
pub mod leff;
pub mod profile;
pub mod rotation;
pub mod survey;
