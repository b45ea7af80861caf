use tracing::{debug, info};

use crate::{
    concurrency::par_try_map_indices,
    eos::IdealGas,
    error::{SolveTarget, SphError, SphResult},
    floating_type_mod::FT,
    neighborhood::NeighborEvaluator,
    particles::ParticleSet,
    smoothing_length_solver::{Bracket, NewtonBisectionSolver, ResidualEquation, SolverSettings},
    sph_kernels::SphKernel,
    sph_parameters::SphParams,
    statistics::SolverStatistics,
    traditional_sph::TraditionalSphField,
};

/**
 * Pressure-entropy (ANARCHY style) field on top of a traditional field. The smoothing lengths
 * of the traditional pass are reused as kernel supports:
 *
 *   P_i = [sum_j m_j A_j^(1/gamma) W(r_ij, h_i)]^gamma,    rho_i = (P_i / A_i)^(1/gamma)
 *
 * With `relax_adiabats` the adiabats are first made consistent with the internal energies, so
 * that every P_i equals the pressure of a gas with energy u_i and adiabat A_i.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct PressureEntropyField {
    adiabats: Vec<FT>,
    smoothed_pressures: Vec<FT>,
    smoothed_densities: Vec<FT>,
    sweeps: usize,
    statistics: SolverStatistics,
}

impl PressureEntropyField {
    pub fn compute(
        particles: &ParticleSet,
        kernel: &SphKernel,
        gadget: &TraditionalSphField,
        params: &SphParams,
    ) -> SphResult<Self> {
        if gadget.len() != particles.len() {
            return Err(SphError::invalid_input(format!(
                "traditional field has {} particles, the particle set {}",
                gadget.len(),
                particles.len()
            )));
        }

        let evaluator = NeighborEvaluator::new(particles, kernel);
        let gas = IdealGas::new(params.gamma);
        let n = particles.len();

        info!("Starting pressure-entropy calculation");
        let (adiabats, sweeps, statistics) = if params.relax_adiabats {
            relax_adiabats(evaluator, gadget, params)?
        } else {
            (gadget.adiabats().to_vec(), 0, SolverStatistics::zero())
        };

        info!("Calculating smoothed pressures");
        let smoothing_lengths = gadget.smoothing_lengths();
        let smoothed_pressures = par_try_map_indices(n, |i| {
            let (sum, _) =
                evaluator.weighted_sum_and_derivative(i, smoothing_lengths[i], 1. / params.gamma, &adiabats)?;
            Ok(sum.powf(params.gamma))
        })?;

        let smoothed_densities = adiabats
            .iter()
            .zip(&smoothed_pressures)
            .map(|(&a, &p)| gas.smoothed_density(a, p))
            .collect();

        Ok(PressureEntropyField {
            adiabats,
            smoothed_pressures,
            smoothed_densities,
            sweeps,
            statistics,
        })
    }

    pub fn len(&self) -> usize {
        self.adiabats.len()
    }

    pub fn adiabats(&self) -> &[FT] {
        &self.adiabats
    }

    pub fn smoothed_pressures(&self) -> &[FT] {
        &self.smoothed_pressures
    }

    pub fn smoothed_densities(&self) -> &[FT] {
        &self.smoothed_densities
    }

    /** Jacobi sweeps of the adiabat relaxation, 0 if it was disabled. */
    pub fn sweeps(&self) -> usize {
        self.sweeps
    }

    pub fn statistics(&self) -> SolverStatistics {
        self.statistics
    }
}

/**
 * Residual of the adiabat a of particle i with all other adiabats held fixed:
 *
 *   R(a) = gamma ln(m_i W_ii a^(1/gamma) + S_other) - ln P(u_i, a)
 *
 * where P(u, a) = a ((gamma - 1) u / a)^(gamma/(gamma-1)) is the pressure of a gas with energy u
 * and adiabat a. Both terms grow with a, so R is strictly increasing and has exactly one root.
 */
struct AdiabatEquation {
    gas: IdealGas,
    energy: FT,

    // m_i W(0, h_i)
    self_weight: FT,
    // sum_{j != i} m_j A_j^(1/gamma) W(r_ij, h_i)
    other_sum: FT,
}

impl ResidualEquation for AdiabatEquation {
    fn evaluate(&self, a: FT) -> SphResult<(FT, FT)> {
        let gamma = self.gas.gamma;
        let self_term = self.self_weight * a.powf(1. / gamma);
        let sum = self_term + self.other_sum;

        let residual = gamma * sum.ln() - self.gas.pressure_from_energy_and_adiabat(self.energy, a).ln();
        let deriv = self_term / (sum * a) + 1. / ((gamma - 1.) * a);
        Ok((residual, deriv))
    }

    fn residual_scale(&self) -> FT {
        1.
    }
}

fn solve_adiabat(
    evaluator: NeighborEvaluator,
    index: usize,
    h: FT,
    energy: FT,
    adiabats: &[FT],
    params: &SphParams,
) -> SphResult<(FT, SolverStatistics)> {
    let particles = evaluator.particles();
    let exponent = 1. / params.gamma;

    let other_sum = evaluator
        .kernel_sum(index, h, |j| {
            if j == index {
                0.
            } else {
                particles.mass(j) * adiabats[j].powf(exponent)
            }
        })?
        .value;

    let equation = AdiabatEquation {
        gas: IdealGas::new(params.gamma),
        energy,
        self_weight: particles.mass(index) * evaluator.self_weight(index, h)?,
        other_sum,
    };

    let guess = adiabats[index];
    let solver = NewtonBisectionSolver::new(
        equation,
        SolverSettings::from(params),
        SolveTarget::Adiabat,
        index,
        guess,
        Bracket::new(0.5 * guess, 2. * guess),
    );
    solver.run()?.resolve(params.divergence_policy)
}

/**
 * Jacobi iteration over the per-particle adiabat equations, starting from the adiabats of the
 * traditional field. Stops once the largest relative change of a sweep drops below `tolerance`.
 *
 * Running out of `max_sweeps` is reported as a `Convergence` error of the particle with the
 * largest change; its `residual` is that relative change and `iterations` the sweep count.
 */
fn relax_adiabats(
    evaluator: NeighborEvaluator,
    gadget: &TraditionalSphField,
    params: &SphParams,
) -> SphResult<(Vec<FT>, usize, SolverStatistics)> {
    let n = gadget.len();
    let smoothing_lengths = gadget.smoothing_lengths();
    let energies = gadget.energies();
    let omega = params.relaxation_factor;

    let mut adiabats = gadget.adiabats().to_vec();
    let mut statistics = SolverStatistics::zero();
    let mut worst = (0, 0.);

    for sweep in 1..=params.max_sweeps {
        let solved = par_try_map_indices(n, |i| {
            solve_adiabat(evaluator, i, smoothing_lengths[i], energies[i], &adiabats, params)
        })?;

        worst = (0, 0.);
        for (i, (a, (a_solved, solve_statistics))) in adiabats.iter_mut().zip(solved).enumerate() {
            let a_next = (1. - omega) * *a + omega * a_solved;
            let change = ((a_next - *a) / *a).abs();
            if change > worst.1 {
                worst = (i, change);
            }
            *a = a_next;
            statistics = statistics.combine(solve_statistics);
        }

        debug!(
            "Adiabat sweep {}: max relative change {:e} (particle {})",
            sweep, worst.1, worst.0
        );

        if worst.1 < params.tolerance {
            info!("Adiabats relaxed after {} sweeps", sweep);
            return Ok((adiabats, sweep, statistics));
        }
    }

    Err(SphError::Convergence {
        target: SolveTarget::Adiabat,
        index: worst.0,
        last_estimate: adiabats[worst.0],
        residual: worst.1,
        iterations: params.max_sweeps,
    })
}

#[cfg(test)]
fn compute_fields(
    positions: Vec<FT>,
    thermal: crate::eos::ThermalInput,
    params: &SphParams,
) -> (TraditionalSphField, PressureEntropyField) {
    let particles = ParticleSet::new(positions).unwrap();
    let kernel = params.kernel.kernel();
    let gadget = TraditionalSphField::compute(&particles, &kernel, &thermal, params).unwrap();
    let field = PressureEntropyField::compute(&particles, &kernel, &gadget, params).unwrap();
    (gadget, field)
}

#[cfg(test)]
fn clustered_positions(n: usize) -> Vec<FT> {
    (0..n).map(|k| k as FT / n as FT).map(|x| x + 0.04 * (6. * x).sin()).collect()
}

#[test]
fn adiabat_equation_is_monotone_with_analytic_derivative() {
    let equation = AdiabatEquation {
        gas: IdealGas::new(5. / 3.),
        energy: 1.3,
        self_weight: 20.,
        other_sum: 55.,
    };

    let mut last = FT::NEG_INFINITY;
    for k in 1..50 {
        let a = 0.05 * k as FT;
        let (r, dr) = equation.evaluate(a).unwrap();
        assert!(r > last);
        last = r;

        let diff = 1e-6 * a;
        let (r_pos, _) = equation.evaluate(a + 0.5 * diff).unwrap();
        let (r_neg, _) = equation.evaluate(a - 0.5 * diff).unwrap();
        crate::assert_ft_rel_approx_eq(dr, (r_pos - r_neg) / diff, 1e-5, || format!("dR/da at {}", a));
    }
}

#[test]
fn uniform_adiabats_reproduce_traditional_pressures() {
    use crate::eos::ThermalInput;

    let n = 50;
    let params = SphParams::default();
    let (gadget, field) = compute_fields(clustered_positions(n), ThermalInput::Adiabats(vec![0.7; n]), &params);

    assert_eq!(field.sweeps(), 1);
    for i in 0..n {
        crate::assert_ft_rel_approx_eq(field.adiabats()[i], 0.7, 1e-12, || format!("adiabat of {}", i));
        crate::assert_ft_rel_approx_eq(field.smoothed_pressures()[i], gadget.pressures()[i], 1e-10, || {
            format!("pressure of particle {}", i)
        });
        crate::assert_ft_rel_approx_eq(field.smoothed_densities()[i], gadget.densities()[i], 1e-10, || {
            format!("density of particle {}", i)
        });
    }
}

#[test]
fn relaxed_adiabats_match_energies() {
    use crate::eos::ThermalInput;

    let n = 60;
    // contact discontinuity: pressure equilibrium with a jump in energy
    let energies: Vec<FT> = (0..n).map(|k| if k < n / 2 { 1. } else { 2.5 }).collect();
    let params = SphParams::default();
    let (gadget, field) = compute_fields(clustered_positions(n), ThermalInput::Energies(energies.clone()), &params);

    assert!(field.sweeps() > 1);
    assert!(field.statistics().solves >= n * field.sweeps());

    let gas = IdealGas::new(params.gamma);
    for i in 0..n {
        let a = field.adiabats()[i];
        let p = field.smoothed_pressures()[i];
        assert!(a > 0.);
        assert!(p > 0.);
        crate::assert_ft_rel_approx_eq(p, gas.pressure_from_energy_and_adiabat(energies[i], a), 1e-4, || {
            format!("pressure consistency of particle {}", i)
        });
        // energies are carried over unchanged
        assert_eq!(gadget.energies()[i], energies[i]);
    }
}

#[test]
fn unrelaxed_field_uses_traditional_adiabats() {
    use crate::eos::ThermalInput;

    let n = 40;
    let energies: Vec<FT> = (0..n).map(|k| 1. + 0.02 * k as FT).collect();
    let params = SphParams {
        relax_adiabats: false,
        ..SphParams::default()
    };
    let (gadget, field) = compute_fields(clustered_positions(n), ThermalInput::Energies(energies), &params);

    assert_eq!(field.adiabats(), gadget.adiabats());
    assert_eq!(field.sweeps(), 0);
    assert_eq!(field.statistics(), SolverStatistics::zero());

    let gas = IdealGas::new(params.gamma);
    for i in 0..n {
        crate::assert_ft_rel_approx_eq(
            field.smoothed_densities()[i],
            gas.smoothed_density(field.adiabats()[i], field.smoothed_pressures()[i]),
            1e-12,
            || format!("smoothed density of particle {}", i),
        );
    }
}

#[test]
fn exhausted_sweeps_are_reported() {
    use crate::eos::ThermalInput;

    let n = 40;
    let energies: Vec<FT> = (0..n).map(|k| if k % 2 == 0 { 1. } else { 4. }).collect();
    let params = SphParams {
        max_sweeps: 1,
        ..SphParams::default()
    };
    let particles = ParticleSet::new(clustered_positions(n)).unwrap();
    let kernel = params.kernel.kernel();
    let gadget = TraditionalSphField::compute(&particles, &kernel, &ThermalInput::Energies(energies), &params).unwrap();

    match PressureEntropyField::compute(&particles, &kernel, &gadget, &params) {
        Err(SphError::Convergence {
            target, iterations, residual, ..
        }) => {
            assert_eq!(target, SolveTarget::Adiabat);
            assert_eq!(iterations, 1);
            assert!(residual >= params.tolerance);
        }
        other => panic!("expected an adiabat convergence error, got {:?}", other),
    }
}
