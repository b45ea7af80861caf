pub mod concurrency;
pub mod eos;
pub mod error;
pub mod neighborhood;
pub mod particles;
pub mod pressure_entropy;
pub mod pressure_entropy_data;
pub mod smoothing_length_solver;
pub mod sph_kernels;
pub mod sph_parameters;
pub mod statistics;
pub mod traditional_sph;

#[cfg(feature = "double-precision")]
pub mod floating_type_mod {
    pub type FT = f64;
}

#[cfg(not(feature = "double-precision"))]
pub mod floating_type_mod {
    pub type FT = f32;
}

use num_traits::Float;
use std::fmt::Display;

pub use eos::{IdealGas, ThermalInput};
pub use error::{SolveTarget, SphError, SphResult};
pub use particles::ParticleSet;
pub use pressure_entropy::PressureEntropyField;
pub use pressure_entropy_data::{PressureEntropyData, PressureEntropyDataBuilder};
pub use sph_kernels::{AnarchyKernel, CustomKernel, GadgetKernel, Kernel, SphKernel};
pub use sph_parameters::{DivergencePolicy, KernelType, SphParams};
pub use statistics::SolverStatistics;
pub use traditional_sph::TraditionalSphField;

pub fn is_ft_approx_eq<FT: Float>(a: FT, b: FT, tolerance: FT) -> bool {
    assert!(!a.is_nan());
    assert!(!b.is_nan());
    b <= a + tolerance && b >= a - tolerance
}

/** Relative variant of [`is_ft_approx_eq`]: the tolerance is scaled by the larger magnitude. */
pub fn is_ft_rel_approx_eq<FT: Float>(a: FT, b: FT, rel_tolerance: FT) -> bool {
    let scale = FT::max(a.abs(), b.abs());
    is_ft_approx_eq(a, b, rel_tolerance * scale)
}

pub fn assert_ft_approx_eq<FT: Float + Display>(a: FT, b: FT, tolerance: FT, s: impl FnOnce() -> String) {
    if !is_ft_approx_eq(a, b, tolerance) {
        panic!(
            "{} value not equal with a tolerance of {}:\n\ta={}\n\tb={}\n",
            s(),
            tolerance,
            a,
            b
        );
    }
}

pub fn assert_ft_rel_approx_eq<FT: Float + Display>(a: FT, b: FT, rel_tolerance: FT, s: impl FnOnce() -> String) {
    if !is_ft_rel_approx_eq(a, b, rel_tolerance) {
        panic!(
            "{} value not equal with a relative tolerance of {}:\n\ta={}\n\tb={}\n",
            s(),
            rel_tolerance,
            a,
            b
        );
    }
}
