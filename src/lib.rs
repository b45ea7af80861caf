/*!
Traditional (GADGET-2 style) and Pressure-Entropy (ANARCHY style) SPH for 1D particle sets.

Both formulations are evaluated on the same particles so that their density, pressure and
smoothing-length fields can be compared directly. Entry point is [`PressureEntropyData`].
*/

mod sph;

pub use sph::*;
