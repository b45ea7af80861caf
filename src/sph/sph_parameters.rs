use crate::{
    error::{SphError, SphResult},
    floating_type_mod::FT,
    sph_kernels::{AnarchyKernel, GadgetKernel, SphKernel},
};
use serde::{Deserialize, Serialize};

#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum KernelType {
    Gadget,
    Anarchy,
}

impl KernelType {
    pub fn kernel(self) -> SphKernel {
        match self {
            KernelType::Gadget => GadgetKernel.into(),
            KernelType::Anarchy => AnarchyKernel.into(),
        }
    }
}

/** What a field does with a particle whose implicit solve ran out of iterations. */
#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum DivergencePolicy {
    /// Abort the whole field computation with `SphError::Convergence`.
    Fail,

    /// Use the midpoint of the last root bracket and log a warning.
    BracketMidpoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SphParams {
    // neighbors inside the support: h_i * rho_i = eta * m_i / 2
    pub eta: FT,
    pub gamma: FT,
    pub kernel: KernelType,

    // relative residual (|F/C|) or relative step (|dx/x|) at which a solve counts as converged
    pub tolerance: FT,
    pub max_iterations: usize,
    pub max_bracket_expansions: usize,
    pub divergence_policy: DivergencePolicy,

    // -------------------
    // PRESSURE-ENTROPY ONLY
    pub relax_adiabats: bool,
    pub max_sweeps: usize,
    // Jacobi weight, 1 means plain Jacobi sweeps
    pub relaxation_factor: FT,
}

impl Default for SphParams {
    fn default() -> Self {
        SphParams {
            eta: 5.,
            gamma: 5. / 3.,
            kernel: KernelType::Gadget,
            tolerance: 1e-6,
            max_iterations: 100,
            max_bracket_expansions: 64,
            divergence_policy: DivergencePolicy::Fail,
            relax_adiabats: true,
            max_sweeps: 200,
            relaxation_factor: 1.,
        }
    }
}

impl SphParams {
    /** Parses a (possibly partial) YAML document; missing keys keep their defaults. */
    pub fn from_yaml_str(yaml: &str) -> SphResult<Self> {
        let params: SphParams = serde_yaml::from_str(yaml)?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_yaml_string(&self) -> SphResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> SphResult<()> {
        if !(self.eta.is_finite() && self.eta > 0.) {
            return Err(SphError::invalid_input(format!("eta must be positive, got {}", self.eta)));
        }
        if !(self.gamma.is_finite() && self.gamma > 1.) {
            return Err(SphError::invalid_input(format!(
                "gamma must be larger than 1, got {}",
                self.gamma
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.) {
            return Err(SphError::invalid_input(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 || self.max_sweeps == 0 {
            return Err(SphError::invalid_input("iteration budgets must be at least 1"));
        }
        if !(self.relaxation_factor > 0. && self.relaxation_factor <= 1.) {
            return Err(SphError::invalid_input(format!(
                "relaxation_factor must lie in (0, 1], got {}",
                self.relaxation_factor
            )));
        }
        Ok(())
    }
}

#[test]
fn default_params_are_valid() {
    SphParams::default().validate().unwrap();
}

#[test]
fn partial_yaml_keeps_defaults() {
    let params = SphParams::from_yaml_str("eta: 3.5\nkernel: Anarchy\ndivergence_policy: BracketMidpoint\n").unwrap();

    assert_eq!(params.eta, 3.5);
    assert_eq!(params.kernel, KernelType::Anarchy);
    assert_eq!(params.divergence_policy, DivergencePolicy::BracketMidpoint);
    assert_eq!(params.max_iterations, SphParams::default().max_iterations);
    assert_eq!(params.gamma, SphParams::default().gamma);
}

#[test]
fn yaml_roundtrip() {
    let mut params = SphParams::default();
    params.relax_adiabats = false;
    params.tolerance = 1e-5;

    let yaml = params.to_yaml_string().unwrap();
    assert_eq!(SphParams::from_yaml_str(&yaml).unwrap(), params);
}

#[test]
fn invalid_params_are_rejected() {
    let cases = [
        "eta: 0.0",
        "eta: -1.0",
        "gamma: 1.0",
        "tolerance: 0.0",
        "max_iterations: 0",
        "relaxation_factor: 1.5",
    ];
    for yaml in cases {
        match SphParams::from_yaml_str(yaml) {
            Err(SphError::InvalidInput(_)) => {}
            other => panic!("expected InvalidInput for '{}', got {:?}", yaml, other),
        }
    }

    assert!(matches!(SphParams::from_yaml_str("eta: [1, 2]"), Err(SphError::Config(_))));
}
