use tracing::info;

use crate::{
    eos::ThermalInput,
    error::SphResult,
    floating_type_mod::FT,
    particles::ParticleSet,
    pressure_entropy::PressureEntropyField,
    sph_kernels::SphKernel,
    sph_parameters::SphParams,
    traditional_sph::TraditionalSphField,
};

/**
 * Traditional and pressure-entropy SPH fields of one 1D particle set, computed eagerly at
 * construction. All inputs are validated before any solve starts.
 */
#[derive(Debug, Clone)]
pub struct PressureEntropyData {
    particles: ParticleSet,
    kernel: SphKernel,
    params: SphParams,
    gadget: TraditionalSphField,
    pressure_entropy: PressureEntropyField,
}

impl PressureEntropyData {
    /** Unit masses and the kernel selected in `params`. */
    pub fn new(positions: Vec<FT>, thermal: ThermalInput, params: SphParams) -> SphResult<Self> {
        Self::builder(positions).thermal(thermal).params(params).build()
    }

    pub fn builder(positions: Vec<FT>) -> PressureEntropyDataBuilder {
        PressureEntropyDataBuilder::new(positions)
    }

    pub fn from_particles(
        particles: ParticleSet,
        thermal: ThermalInput,
        kernel: SphKernel,
        params: SphParams,
    ) -> SphResult<Self> {
        params.validate()?;
        thermal.validate(particles.len())?;

        info!(
            "Computing SPH fields of {} particles (eta={}, gamma={})",
            particles.len(),
            params.eta,
            params.gamma
        );
        let gadget = TraditionalSphField::compute(&particles, &kernel, &thermal, &params)?;
        let pressure_entropy = PressureEntropyField::compute(&particles, &kernel, &gadget, &params)?;

        Ok(PressureEntropyData {
            particles,
            kernel,
            params,
            gadget,
            pressure_entropy,
        })
    }

    /** The traditional density-based field. */
    pub fn gadget(&self) -> &TraditionalSphField {
        &self.gadget
    }

    pub fn pressure_entropy(&self) -> &PressureEntropyField {
        &self.pressure_entropy
    }

    /** Pressure-entropy adiabats, relaxed unless disabled in the parameters. */
    pub fn adiabats(&self) -> &[FT] {
        self.pressure_entropy.adiabats()
    }

    pub fn smoothed_pressures(&self) -> &[FT] {
        self.pressure_entropy.smoothed_pressures()
    }

    pub fn smoothed_densities(&self) -> &[FT] {
        self.pressure_entropy.smoothed_densities()
    }

    pub fn energies(&self) -> &[FT] {
        self.gadget.energies()
    }

    pub fn particles(&self) -> &ParticleSet {
        &self.particles
    }

    pub fn positions(&self) -> &[FT] {
        self.particles.positions()
    }

    pub fn masses(&self) -> &[FT] {
        self.particles.masses()
    }

    pub fn kernel(&self) -> &SphKernel {
        &self.kernel
    }

    pub fn params(&self) -> &SphParams {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }
}

#[derive(Debug, Clone)]
pub struct PressureEntropyDataBuilder {
    positions: Vec<FT>,
    energies: Option<Vec<FT>>,
    adiabats: Option<Vec<FT>>,
    masses: Option<Vec<FT>>,
    kernel: Option<SphKernel>,
    params: SphParams,
}

impl PressureEntropyDataBuilder {
    pub fn new(positions: Vec<FT>) -> Self {
        PressureEntropyDataBuilder {
            positions,
            energies: None,
            adiabats: None,
            masses: None,
            kernel: None,
            params: SphParams::default(),
        }
    }

    pub fn energies(mut self, energies: Vec<FT>) -> Self {
        self.energies = Some(energies);
        self
    }

    pub fn adiabats(mut self, adiabats: Vec<FT>) -> Self {
        self.adiabats = Some(adiabats);
        self
    }

    pub fn thermal(self, thermal: ThermalInput) -> Self {
        match thermal {
            ThermalInput::Energies(energies) => self.energies(energies),
            ThermalInput::Adiabats(adiabats) => self.adiabats(adiabats),
        }
    }

    pub fn masses(mut self, masses: Vec<FT>) -> Self {
        self.masses = Some(masses);
        self
    }

    /** Overrides the kernel selected in the parameters, e.g. with a `CustomKernel`. */
    pub fn kernel(mut self, kernel: impl Into<SphKernel>) -> Self {
        self.kernel = Some(kernel.into());
        self
    }

    pub fn params(mut self, params: SphParams) -> Self {
        self.params = params;
        self
    }

    pub fn eta(mut self, eta: FT) -> Self {
        self.params.eta = eta;
        self
    }

    pub fn gamma(mut self, gamma: FT) -> Self {
        self.params.gamma = gamma;
        self
    }

    pub fn build(self) -> SphResult<PressureEntropyData> {
        self.params.validate()?;
        let thermal = ThermalInput::from_options(self.energies, self.adiabats)?;
        let particles = match self.masses {
            Some(masses) => ParticleSet::with_masses(self.positions, masses)?,
            None => ParticleSet::new(self.positions)?,
        };
        let kernel = self.kernel.unwrap_or_else(|| self.params.kernel.kernel());

        PressureEntropyData::from_particles(particles, thermal, kernel, self.params)
    }
}

#[test]
fn builder_resolves_inputs() {
    use crate::{error::SphError, sph_kernels::AnarchyKernel};

    let positions: Vec<FT> = (0..20).map(|k| k as FT * 0.05).collect();

    let data = PressureEntropyData::builder(positions.clone())
        .energies(vec![1.; 20])
        .kernel(AnarchyKernel)
        .eta(4.)
        .build()
        .unwrap();
    assert!(matches!(data.kernel(), SphKernel::AnarchyKernel(_)));
    assert_eq!(data.params().eta, 4.);
    assert_eq!(data.energies(), &[1.; 20]);
    assert_eq!(data.gadget().densities().len(), 20);

    let both = PressureEntropyData::builder(positions.clone())
        .energies(vec![1.; 20])
        .adiabats(vec![1.; 20])
        .build();
    assert!(matches!(both, Err(SphError::InvalidInput(_))));

    let bad_eta = PressureEntropyData::builder(positions.clone()).energies(vec![1.; 20]).eta(0.).build();
    assert!(matches!(bad_eta, Err(SphError::InvalidInput(_))));

    let bad_masses = PressureEntropyData::builder(positions)
        .energies(vec![1.; 20])
        .masses(vec![1.; 19])
        .build();
    assert!(matches!(bad_masses, Err(SphError::InvalidInput(_))));
}
