use crate::{
    error::{SphError, SphResult},
    floating_type_mod::FT,
};

/**
 * The thermodynamic input of a particle set: exactly one of internal energies or adiabats.
 * The other quantity is derived through [`IdealGas`] once densities are known.
 */
#[derive(Debug, Clone, PartialEq)]
pub enum ThermalInput {
    Energies(Vec<FT>),
    Adiabats(Vec<FT>),
}

impl ThermalInput {
    /** Resolves the "energies xor adiabats" pair of optional arguments. */
    pub fn from_options(energies: Option<Vec<FT>>, adiabats: Option<Vec<FT>>) -> SphResult<Self> {
        match (energies, adiabats) {
            (Some(energies), None) => Ok(ThermalInput::Energies(energies)),
            (None, Some(adiabats)) => Ok(ThermalInput::Adiabats(adiabats)),
            (None, None) => Err(SphError::invalid_input(
                "neither internal energies nor adiabats were provided",
            )),
            (Some(_), Some(_)) => Err(SphError::invalid_input(
                "both internal energies and adiabats were provided, only one is allowed",
            )),
        }
    }

    pub fn values(&self) -> &[FT] {
        match self {
            ThermalInput::Energies(v) | ThermalInput::Adiabats(v) => v,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ThermalInput::Energies(_) => "energy",
            ThermalInput::Adiabats(_) => "adiabat",
        }
    }

    pub fn validate(&self, num_particles: usize) -> SphResult<()> {
        let values = self.values();
        if values.len() != num_particles {
            return Err(SphError::invalid_input(format!(
                "got {} {} values for {} positions",
                values.len(),
                self.name(),
                num_particles
            )));
        }
        if let Some(i) = values.iter().position(|&v| !(v.is_finite() && v > 0.)) {
            return Err(SphError::invalid_input(format!(
                "{} of particle {} must be positive, got {}",
                self.name(),
                i,
                values[i]
            )));
        }
        Ok(())
    }
}

/**
 * Ideal gas with constant adiabatic index:
 *
 *   P = A rho^gamma = (gamma - 1) rho u,    A = (gamma - 1) u rho^(1 - gamma)
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdealGas {
    pub gamma: FT,
}

impl IdealGas {
    pub fn new(gamma: FT) -> Self {
        IdealGas { gamma }
    }

    pub fn adiabat(&self, energy: FT, density: FT) -> FT {
        let g_minus_1 = self.gamma - 1.;
        energy * g_minus_1 / density.powf(g_minus_1)
    }

    pub fn energy(&self, adiabat: FT, density: FT) -> FT {
        let g_minus_1 = self.gamma - 1.;
        adiabat / g_minus_1 * density.powf(g_minus_1)
    }

    pub fn pressure_from_adiabat(&self, adiabat: FT, density: FT) -> FT {
        adiabat * density.powf(self.gamma)
    }

    pub fn pressure_from_energy(&self, energy: FT, density: FT) -> FT {
        (self.gamma - 1.) * density * energy
    }

    /** Density at which a gas with the given energy and adiabat sits, rho = ((gamma - 1) u / A)^(1/(gamma - 1)). */
    pub fn density_from_energy_and_adiabat(&self, energy: FT, adiabat: FT) -> FT {
        let g_minus_1 = self.gamma - 1.;
        (g_minus_1 * energy / adiabat).powf(1. / g_minus_1)
    }

    /** Pressure implied by an internal energy together with an adiabat. */
    pub fn pressure_from_energy_and_adiabat(&self, energy: FT, adiabat: FT) -> FT {
        self.pressure_from_adiabat(adiabat, self.density_from_energy_and_adiabat(energy, adiabat))
    }

    /** Pressure-entropy density, ((P / A)^(1/gamma)). Not the mass density. */
    pub fn smoothed_density(&self, adiabat: FT, smoothed_pressure: FT) -> FT {
        (smoothed_pressure / adiabat).powf(1. / self.gamma)
    }
}

#[test]
fn ideal_gas_identities() {
    let gas = IdealGas::new(5. / 3.);

    for (u, rho) in [(1., 100.), (0.3, 2.5), (12., 0.01)] {
        let a = gas.adiabat(u, rho);
        crate::assert_ft_rel_approx_eq(gas.energy(a, rho), u, 1e-12, || "energy roundtrip".into());
        crate::assert_ft_rel_approx_eq(
            gas.pressure_from_adiabat(a, rho),
            gas.pressure_from_energy(u, rho),
            1e-12,
            || "pressure from adiabat vs energy".into(),
        );
        crate::assert_ft_rel_approx_eq(
            gas.density_from_energy_and_adiabat(u, a),
            rho,
            1e-10,
            || "density from energy and adiabat".into(),
        );
        let p = gas.pressure_from_adiabat(a, rho);
        crate::assert_ft_rel_approx_eq(gas.smoothed_density(a, p), rho, 1e-12, || "smoothed density".into());
    }
}

#[test]
fn thermal_input_needs_exactly_one_quantity() {
    assert!(matches!(
        ThermalInput::from_options(Some(vec![1.]), Some(vec![1.])),
        Err(SphError::InvalidInput(_))
    ));
    assert!(matches!(ThermalInput::from_options(None, None), Err(SphError::InvalidInput(_))));
    assert_eq!(
        ThermalInput::from_options(None, Some(vec![2.])).unwrap(),
        ThermalInput::Adiabats(vec![2.])
    );

    assert!(ThermalInput::Energies(vec![1., 1.]).validate(2).is_ok());
    assert!(ThermalInput::Energies(vec![1., 1.]).validate(3).is_err());
    assert!(ThermalInput::Adiabats(vec![1., -1.]).validate(2).is_err());
}
