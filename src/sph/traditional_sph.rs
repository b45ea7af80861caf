use tracing::{debug, info};

use crate::{
    concurrency::{par_iter_mut1, par_map_indices, par_try_map_indices},
    eos::{IdealGas, ThermalInput},
    error::{SphError, SphResult},
    floating_type_mod::FT,
    neighborhood::NeighborEvaluator,
    particles::ParticleSet,
    smoothing_length_solver::{check_smoothing_length_bounds, solve_smoothing_length},
    sph_kernels::SphKernel,
    sph_parameters::SphParams,
    statistics::SolverStatistics,
};

/**
 * Density-based (GADGET-2 style) SPH field: smoothing lengths from h_i * rho_i = eta * m_i / 2,
 * densities at exactly those supports and P_i = A_i rho_i^gamma.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct TraditionalSphField {
    smoothing_lengths: Vec<FT>,
    densities: Vec<FT>,
    pressures: Vec<FT>,
    energies: Vec<FT>,
    adiabats: Vec<FT>,
    neighbor_counts: Vec<usize>,
    statistics: SolverStatistics,
}

impl TraditionalSphField {
    pub fn compute(
        particles: &ParticleSet,
        kernel: &SphKernel,
        thermal: &ThermalInput,
        params: &SphParams,
    ) -> SphResult<Self> {
        thermal.validate(particles.len())?;

        let evaluator = NeighborEvaluator::new(particles, kernel);
        let n = particles.len();
        check_smoothing_length_bounds(evaluator, params.eta)?;

        info!("Calculating smoothing lengths of {} particles", n);
        let solutions = par_try_map_indices(n, |i| solve_smoothing_length(evaluator, i, params, None))?;

        let statistics: SolverStatistics = solutions.iter().map(|s| s.statistics).sum();
        debug!(
            "Smoothing lengths: {} solves, avg {:.2} / max {} iterations, {} bisection steps, {} fallbacks",
            statistics.solves,
            statistics.avg_iterations(),
            statistics.max_iterations,
            statistics.bisection_steps,
            statistics.fallbacks
        );

        let smoothing_lengths: Vec<FT> = solutions.iter().map(|s| s.h).collect();
        let densities: Vec<FT> = solutions.iter().map(|s| s.density).collect();

        // only reachable with a degraded bracket midpoint or a kernel vanishing at r=0
        if let Some(i) = densities.iter().position(|&rho| !(rho > 0.)) {
            return Err(SphError::Domain {
                index: i,
                neighbor: i,
                r: 0.,
                h: smoothing_lengths[i],
                value: densities[i],
            });
        }

        info!("Calculating pressures");
        let gas = IdealGas::new(params.gamma);
        let (energies, adiabats): (Vec<FT>, Vec<FT>) = match thermal {
            ThermalInput::Energies(energies) => (
                energies.clone(),
                energies.iter().zip(&densities).map(|(&u, &rho)| gas.adiabat(u, rho)).collect(),
            ),
            ThermalInput::Adiabats(adiabats) => (
                adiabats.iter().zip(&densities).map(|(&a, &rho)| gas.energy(a, rho)).collect(),
                adiabats.clone(),
            ),
        };

        let mut pressures = vec![0.; n];
        match thermal {
            ThermalInput::Energies(_) => {
                par_iter_mut1(&mut pressures, |i, p| *p = gas.pressure_from_energy(energies[i], densities[i]))
            }
            ThermalInput::Adiabats(_) => {
                par_iter_mut1(&mut pressures, |i, p| *p = gas.pressure_from_adiabat(adiabats[i], densities[i]))
            }
        }

        let neighbor_counts = par_map_indices(n, |i| evaluator.neighbor_count(i, smoothing_lengths[i]));

        Ok(TraditionalSphField {
            smoothing_lengths,
            densities,
            pressures,
            energies,
            adiabats,
            neighbor_counts,
            statistics,
        })
    }

    pub fn len(&self) -> usize {
        self.densities.len()
    }

    pub fn smoothing_lengths(&self) -> &[FT] {
        &self.smoothing_lengths
    }

    pub fn densities(&self) -> &[FT] {
        &self.densities
    }

    pub fn pressures(&self) -> &[FT] {
        &self.pressures
    }

    pub fn energies(&self) -> &[FT] {
        &self.energies
    }

    pub fn adiabats(&self) -> &[FT] {
        &self.adiabats
    }

    /** Particles (including itself) inside the kernel support of each particle. */
    pub fn neighbor_counts(&self) -> &[usize] {
        &self.neighbor_counts
    }

    pub fn statistics(&self) -> SolverStatistics {
        self.statistics
    }
}

#[cfg(test)]
fn jittered_lattice(n: usize) -> ParticleSet {
    ParticleSet::new(
        (0..n)
            .map(|k| (k as FT + 0.3 * (k as FT * 1.7).sin()) / n as FT)
            .collect(),
    )
    .unwrap()
}

#[test]
fn densities_match_their_smoothing_lengths() {
    let particles = jittered_lattice(60);
    let kernel = SphKernel::default();
    let params = SphParams::default();
    let field =
        TraditionalSphField::compute(&particles, &kernel, &ThermalInput::Energies(vec![1.; 60]), &params).unwrap();

    let evaluator = NeighborEvaluator::new(&particles, &kernel);
    for i in 0..field.len() {
        let h = field.smoothing_lengths()[i];
        assert!(h > 0.);
        let (rho, _) = evaluator.density_and_derivative(i, h).unwrap();
        assert_eq!(rho, field.densities()[i]);
        crate::assert_ft_rel_approx_eq(h * rho, 0.5 * params.eta, 1e-4, || format!("constraint of particle {}", i));
        assert!(field.pressures()[i] >= 0.);
        assert!(field.neighbor_counts()[i] >= 2);
    }

    assert_eq!(field.statistics().solves, 60);
    assert_eq!(field.statistics().fallbacks, 0);
}

#[test]
fn energies_and_adiabats_give_the_same_pressures() {
    let particles = jittered_lattice(30);
    let kernel = SphKernel::default();
    let params = SphParams::default();
    let energies: Vec<FT> = (0..30).map(|k| 1. + 0.1 * k as FT).collect();

    let from_energies =
        TraditionalSphField::compute(&particles, &kernel, &ThermalInput::Energies(energies.clone()), &params).unwrap();
    let from_adiabats = TraditionalSphField::compute(
        &particles,
        &kernel,
        &ThermalInput::Adiabats(from_energies.adiabats().to_vec()),
        &params,
    )
    .unwrap();

    assert_eq!(from_energies.densities(), from_adiabats.densities());
    for i in 0..30 {
        crate::assert_ft_rel_approx_eq(from_adiabats.energies()[i], energies[i], 1e-10, || {
            format!("energy of particle {}", i)
        });
        crate::assert_ft_rel_approx_eq(from_adiabats.pressures()[i], from_energies.pressures()[i], 1e-10, || {
            format!("pressure of particle {}", i)
        });
    }
}

#[test]
fn unreachable_eta_fails_before_solving() {
    for eta in [1., 2.5] {
        let params = SphParams {
            eta,
            ..SphParams::default()
        };
        let result = TraditionalSphField::compute(
            &jittered_lattice(101),
            &SphKernel::default(),
            &ThermalInput::Energies(vec![1.; 101]),
            &params,
        );
        assert!(matches!(result, Err(SphError::InvalidInput(_))), "eta={}", eta);
    }

    let params = SphParams {
        eta: 3.,
        ..SphParams::default()
    };
    let field = TraditionalSphField::compute(
        &jittered_lattice(101),
        &SphKernel::default(),
        &ThermalInput::Energies(vec![1.; 101]),
        &params,
    )
    .unwrap();
    for i in 0..101 {
        crate::assert_ft_rel_approx_eq(field.smoothing_lengths()[i] * field.densities()[i], 1.5, 1e-4, || {
            format!("constraint of particle {}", i)
        });
    }
}

#[test]
fn thermal_input_length_is_checked() {
    let particles = jittered_lattice(10);
    let result = TraditionalSphField::compute(
        &particles,
        &SphKernel::default(),
        &ThermalInput::Adiabats(vec![1.; 9]),
        &SphParams::default(),
    );
    assert!(matches!(result, Err(SphError::InvalidInput(_))));
}
