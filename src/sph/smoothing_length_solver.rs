use tracing::{debug, warn};

use crate::{
    error::{SolveTarget, SphError, SphResult},
    floating_type_mod::FT,
    neighborhood::NeighborEvaluator,
    sph_parameters::{DivergencePolicy, SphParams},
    statistics::SolverStatistics,
};

/**
 * A scalar equation F(x) = 0 in one positive unknown.
 *
 * F has to be nondecreasing in x; the solver relies on this to keep its root bracket.
 */
pub trait ResidualEquation {
    /// F(x) and dF/dx.
    fn evaluate(&self, x: FT) -> SphResult<(FT, FT)>;

    /// C in the convergence criterion |F(x) / C| < tolerance.
    fn residual_scale(&self) -> FT;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub lo: FT,
    pub hi: FT,
}

impl Bracket {
    pub fn new(lo: FT, hi: FT) -> Self {
        Bracket { lo, hi }
    }

    pub fn midpoint(&self) -> FT {
        0.5 * (self.lo + self.hi)
    }

    fn contains_strictly(&self, x: FT) -> bool {
        x > self.lo && x < self.hi
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolverState {
    Initialized { guess: FT, bracket: Bracket },
    Iterating { x: FT, bracket: Bracket },
    Converged { x: FT },
    Diverged { x: FT, residual: FT, bracket: Bracket },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    pub tolerance: FT,
    pub max_iterations: usize,
    pub max_bracket_expansions: usize,
}

impl From<&SphParams> for SolverSettings {
    fn from(params: &SphParams) -> Self {
        SolverSettings {
            tolerance: params.tolerance,
            max_iterations: params.max_iterations,
            max_bracket_expansions: params.max_bracket_expansions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveOutcome {
    Converged { x: FT },
    Diverged { x: FT, residual: FT, bracket: Bracket },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveReport {
    pub target: SolveTarget,
    pub index: usize,
    pub outcome: SolveOutcome,
    pub statistics: SolverStatistics,
}

impl SolveReport {
    /** Applies the divergence policy. Converged solves pass through unchanged. */
    pub fn resolve(self, policy: DivergencePolicy) -> SphResult<(FT, SolverStatistics)> {
        match self.outcome {
            SolveOutcome::Converged { x } => Ok((x, self.statistics)),
            SolveOutcome::Diverged { x, residual, bracket } => match policy {
                DivergencePolicy::Fail => Err(SphError::Convergence {
                    target: self.target,
                    index: self.index,
                    last_estimate: x,
                    residual,
                    iterations: self.statistics.total_iterations,
                }),
                DivergencePolicy::BracketMidpoint => {
                    warn!(
                        "{} of particle {} not converged after {} iterations (residual {:e}), using bracket midpoint {}",
                        self.target,
                        self.index,
                        self.statistics.total_iterations,
                        residual,
                        bracket.midpoint()
                    );
                    let statistics = SolverStatistics {
                        fallbacks: 1,
                        ..self.statistics
                    };
                    Ok((bracket.midpoint(), statistics))
                }
            },
        }
    }
}

/**
 * Safeguarded Newton-Raphson: Newton steps are taken while they stay inside the current root
 * bracket, otherwise the bracket is bisected.
 *
 * Converged when |F(x)/C| < tolerance or |dx/x| <= tolerance. Diverged after `max_iterations`
 * steps without either.
 */
pub struct NewtonBisectionSolver<E> {
    equation: E,
    settings: SolverSettings,
    target: SolveTarget,
    index: usize,
    state: SolverState,
    newton_steps: usize,
    bisection_steps: usize,
    bracket_expansions: usize,
}

impl<E: ResidualEquation> NewtonBisectionSolver<E> {
    /**
     * `bracket` is a first guess for an interval with F(lo) <= 0 <= F(hi); it is widened
     * geometrically until it encloses a root.
     */
    pub fn new(
        equation: E,
        settings: SolverSettings,
        target: SolveTarget,
        index: usize,
        guess: FT,
        bracket: Bracket,
    ) -> Self {
        NewtonBisectionSolver {
            equation,
            settings,
            target,
            index,
            state: SolverState::Initialized { guess, bracket },
            newton_steps: 0,
            bisection_steps: 0,
            bracket_expansions: 0,
        }
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn iterations(&self) -> usize {
        self.newton_steps + self.bisection_steps
    }

    fn statistics(&self) -> SolverStatistics {
        SolverStatistics::for_single_solve(self.newton_steps, self.bisection_steps, self.bracket_expansions)
    }

    fn not_converged(&self, last_estimate: FT, residual: FT) -> SphError {
        SphError::Convergence {
            target: self.target,
            index: self.index,
            last_estimate,
            residual,
            iterations: self.iterations(),
        }
    }

    fn residual(&self, x: FT) -> SphResult<(FT, FT)> {
        let (f, df) = self.equation.evaluate(x)?;
        if !f.is_finite() {
            return Err(self.not_converged(x, f));
        }
        Ok((f, df))
    }

    fn establish_bracket(&mut self, bracket: Bracket) -> SphResult<Bracket> {
        let scale = self.equation.residual_scale();

        let Bracket { mut lo, mut hi } = bracket;
        if !(lo > 0. && hi > lo) {
            return Err(SphError::invalid_input(format!(
                "root bracket [{}, {}] of particle {} is empty",
                lo, hi, self.index
            )));
        }

        let (mut f_lo, _) = self.residual(lo)?;
        let (mut f_hi, _) = self.residual(hi)?;

        while f_lo > 0. {
            if self.bracket_expansions >= self.settings.max_bracket_expansions {
                return Err(self.not_converged(lo, f_lo / scale));
            }
            hi = lo;
            f_hi = f_lo;
            lo *= 0.5;
            f_lo = self.residual(lo)?.0;
            self.bracket_expansions += 1;
        }

        while f_hi < 0. {
            if self.bracket_expansions >= self.settings.max_bracket_expansions {
                return Err(self.not_converged(hi, f_hi / scale));
            }
            lo = hi;
            hi *= 2.;
            f_hi = self.residual(hi)?.0;
            self.bracket_expansions += 1;
        }

        Ok(Bracket { lo, hi })
    }

    /** Performs one state transition. Terminal states are left unchanged. */
    pub fn step(&mut self) -> SphResult<()> {
        self.state = match self.state {
            SolverState::Initialized { guess, bracket } => {
                let bracket = self.establish_bracket(bracket)?;
                let x = if bracket.contains_strictly(guess) {
                    guess
                } else {
                    bracket.midpoint()
                };
                SolverState::Iterating { x, bracket }
            }
            SolverState::Iterating { x, mut bracket } => {
                let (f, df) = self.residual(x)?;
                let residual = f / self.equation.residual_scale();

                if residual.abs() < self.settings.tolerance {
                    SolverState::Converged { x }
                } else if self.iterations() >= self.settings.max_iterations {
                    SolverState::Diverged { x, residual, bracket }
                } else {
                    if f < 0. {
                        bracket.lo = x;
                    } else {
                        bracket.hi = x;
                    }

                    let newton = x - f / df;
                    let x_next = if df > 0. && bracket.contains_strictly(newton) {
                        self.newton_steps += 1;
                        newton
                    } else {
                        self.bisection_steps += 1;
                        bracket.midpoint()
                    };

                    if (x_next - x).abs() <= self.settings.tolerance * x.abs() {
                        SolverState::Converged { x: x_next }
                    } else {
                        SolverState::Iterating { x: x_next, bracket }
                    }
                }
            }
            state @ (SolverState::Converged { .. } | SolverState::Diverged { .. }) => state,
        };
        Ok(())
    }

    pub fn run(mut self) -> SphResult<SolveReport> {
        let outcome = loop {
            match self.state {
                SolverState::Converged { x } => break SolveOutcome::Converged { x },
                SolverState::Diverged { x, residual, bracket } => {
                    break SolveOutcome::Diverged { x, residual, bracket }
                }
                _ => self.step()?,
            }
        };

        Ok(SolveReport {
            target: self.target,
            index: self.index,
            outcome,
            statistics: self.statistics(),
        })
    }
}

/**
 * F(h) = h * rho_i(h) - eta * m_i / 2 for a single particle (1D, so h^D = h).
 *
 * The support spans eta / 2 mean separations on either side, so about eta neighbors fall
 * inside it. Nondecreasing because h * W(r, h) = sigma * f(r/h) grows with h for kernels that
 * decay in r.
 */
pub struct SmoothingLengthEquation<'a> {
    evaluator: NeighborEvaluator<'a>,
    index: usize,
    target: FT,
}

impl<'a> SmoothingLengthEquation<'a> {
    pub fn new(evaluator: NeighborEvaluator<'a>, index: usize, eta: FT) -> Self {
        let target = 0.5 * eta * evaluator.particles().mass(index);
        SmoothingLengthEquation {
            evaluator,
            index,
            target,
        }
    }
}

impl<'a> ResidualEquation for SmoothingLengthEquation<'a> {
    fn evaluate(&self, h: FT) -> SphResult<(FT, FT)> {
        let (rho, drho_dh) = self.evaluator.density_and_derivative(self.index, h)?;
        Ok((h * rho - self.target, rho + h * drho_dh))
    }

    fn residual_scale(&self) -> FT {
        self.target
    }
}

/**
 * With sigma = h W(0, h), h * rho_i(h) runs from sigma * m_i (only the particle itself and
 * coincident ones inside the support) up to sigma * M_total (all particles inside). A root
 * exists for every particle only if
 *
 *   2 sigma < eta < 2 sigma M_total / m_i
 *
 * which is 8/3 < eta < 8/3 N for the Gadget kernel and 3 < eta < 3 N for the Anarchy kernel
 * with unit masses. Violations are `InvalidInput`.
 */
pub fn check_smoothing_length_bounds(evaluator: NeighborEvaluator, eta: FT) -> SphResult<()> {
    let particles = evaluator.particles();
    let total_mass = particles.total_mass();

    for i in 0..particles.len() {
        let gap = particles.nearest_gap(i);
        let sigma = gap * evaluator.self_weight(i, gap)?;
        let mass = particles.mass(i);

        if !(sigma > 0.) {
            return Err(SphError::invalid_input(format!(
                "kernel has no weight at r=0 (particle {}, h={})",
                i, gap
            )));
        }
        if eta <= 2. * sigma {
            return Err(SphError::invalid_input(format!(
                "eta={} is too small for the kernel, it has to exceed {}",
                eta,
                2. * sigma
            )));
        }
        if eta >= 2. * sigma * total_mass / mass {
            return Err(SphError::invalid_input(format!(
                "eta={} needs more particles than the {} given, particle {} requires eta < {}",
                eta,
                particles.len(),
                i,
                2. * sigma * total_mass / mass
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingLengthSolution {
    pub h: FT,
    pub density: FT,
    pub statistics: SolverStatistics,
}

/**
 * Finds the smoothing length of particle i with h_i * rho_i(h_i) = eta * m_i / 2.
 *
 * Without a warm start the guess is the smoothing length of an evenly spread particle set. The
 * initial bracket starts at the gap to the nearest distinct neighbor. If coincident particles
 * alone already exceed the target, h is that gap and the support holds only them.
 */
pub fn solve_smoothing_length(
    evaluator: NeighborEvaluator,
    index: usize,
    params: &SphParams,
    warm_start: Option<FT>,
) -> SphResult<SmoothingLengthSolution> {
    let particles = evaluator.particles();
    let equation = SmoothingLengthEquation::new(evaluator, index, params.eta);

    let gap = particles.nearest_gap(index);
    let (f_gap, _) = equation.evaluate(gap)?;
    if f_gap >= 0. {
        debug!(
            "Particle {} shares its position with {} of mass, using the gap {} as smoothing length",
            index,
            particles.coincident_mass(index) - particles.mass(index),
            gap
        );
        let (density, _) = evaluator.density_and_derivative(index, gap)?;
        return Ok(SmoothingLengthSolution {
            h: gap,
            density,
            statistics: SolverStatistics::for_single_solve(0, 0, 0),
        });
    }

    let guess = warm_start.unwrap_or_else(|| 0.5 * params.eta * particles.mass(index) / particles.mean_density());
    let bracket = Bracket::new(gap, FT::max(particles.extent(), 2. * gap));

    let solver = NewtonBisectionSolver::new(
        equation,
        SolverSettings::from(params),
        SolveTarget::SmoothingLength,
        index,
        guess,
        bracket,
    );
    let (h, statistics) = solver.run()?.resolve(params.divergence_policy)?;

    let (density, _) = evaluator.density_and_derivative(index, h)?;
    Ok(SmoothingLengthSolution { h, density, statistics })
}

#[cfg(test)]
struct TestEquation<F: Fn(FT) -> (FT, FT)>(F);

#[cfg(test)]
impl<F: Fn(FT) -> (FT, FT)> ResidualEquation for TestEquation<F> {
    fn evaluate(&self, x: FT) -> SphResult<(FT, FT)> {
        Ok((self.0)(x))
    }

    fn residual_scale(&self) -> FT {
        1.
    }
}

// reachable in single and double precision
#[cfg(test)]
fn test_tolerance() -> FT {
    FT::EPSILON.sqrt()
}

#[cfg(test)]
fn test_settings(max_iterations: usize) -> SolverSettings {
    SolverSettings {
        tolerance: test_tolerance(),
        max_iterations,
        max_bracket_expansions: 64,
    }
}

#[test]
fn solver_state_transitions() {
    let cubic = TestEquation(|x: FT| (x * x * x - 8., 3. * x * x));
    let mut solver = NewtonBisectionSolver::new(
        cubic,
        test_settings(100),
        SolveTarget::SmoothingLength,
        0,
        1.5,
        Bracket::new(1., 3.),
    );

    assert!(matches!(solver.state(), SolverState::Initialized { .. }));
    solver.step().unwrap();
    assert_eq!(
        solver.state(),
        SolverState::Iterating {
            x: 1.5,
            bracket: Bracket::new(1., 3.)
        }
    );

    let report = solver.run().unwrap();
    match report.outcome {
        SolveOutcome::Converged { x } => crate::assert_ft_approx_eq(x, 2., 10. * test_tolerance(), || "cube root of 8".into()),
        other => panic!("expected convergence, got {:?}", other),
    }
    assert!(report.statistics.newton_steps > 0);
    assert!(report.statistics.total_iterations < 10);
}

#[test]
fn solver_expands_bracket() {
    let linear = TestEquation(|x: FT| (x - 100., 1.));
    let report = NewtonBisectionSolver::new(
        linear,
        test_settings(100),
        SolveTarget::SmoothingLength,
        0,
        1.,
        Bracket::new(1., 2.),
    )
    .run()
    .unwrap();

    assert_eq!(report.outcome, SolveOutcome::Converged { x: 100. });
    // 2 -> 4 -> ... -> 128
    assert_eq!(report.statistics.bracket_expansions, 6);
}

#[test]
fn solver_falls_back_to_bisection() {
    // pure Newton overshoots on atan far away from the root
    let atan = TestEquation(|x: FT| (FT::atan(10. * (x - 3.)), 10. / (1. + 100. * (x - 3.) * (x - 3.))));
    let report = NewtonBisectionSolver::new(
        atan,
        test_settings(200),
        SolveTarget::Adiabat,
        4,
        1.,
        Bracket::new(0.5, 8.),
    )
    .run()
    .unwrap();

    let (x, statistics) = report.resolve(DivergencePolicy::Fail).unwrap();
    crate::assert_ft_approx_eq(x, 3., 10. * test_tolerance(), || "atan root".into());
    assert!(statistics.bisection_steps > 0);
    assert!(statistics.newton_steps > 0);
}

#[test]
fn solver_divergence_policies() {
    let atan = || TestEquation(|x: FT| (FT::atan(10. * (x - 3.)), 10. / (1. + 100. * (x - 3.) * (x - 3.))));
    let run = || {
        NewtonBisectionSolver::new(atan(), test_settings(2), SolveTarget::Adiabat, 7, 1., Bracket::new(0.5, 8.))
            .run()
            .unwrap()
    };

    let report = run();
    assert!(matches!(report.outcome, SolveOutcome::Diverged { .. }));

    match report.resolve(DivergencePolicy::Fail) {
        Err(SphError::Convergence {
            target,
            index,
            iterations,
            residual,
            ..
        }) => {
            assert_eq!(target, SolveTarget::Adiabat);
            assert_eq!(index, 7);
            assert_eq!(iterations, 2);
            assert!(residual.abs() > test_tolerance());
        }
        other => panic!("expected a convergence error, got {:?}", other),
    }

    let (x, statistics) = run().resolve(DivergencePolicy::BracketMidpoint).unwrap();
    assert!(x > 0.5 && x < 8.);
    assert_eq!(statistics.fallbacks, 1);
}

#[test]
fn solver_reports_missing_root() {
    let constant = TestEquation(|_x: FT| (-1., 0.));
    let result = NewtonBisectionSolver::new(
        constant,
        test_settings(100),
        SolveTarget::SmoothingLength,
        3,
        1.,
        Bracket::new(1., 2.),
    )
    .run();

    match result {
        Err(SphError::Convergence { index, iterations, .. }) => {
            assert_eq!(index, 3);
            assert_eq!(iterations, 0);
        }
        other => panic!("expected a convergence error, got {:?}", other.map(|r| r.outcome)),
    }
}

#[test]
fn smoothing_length_satisfies_constraint() {
    use crate::{particles::ParticleSet, sph_kernels::SphKernel};

    let particles = ParticleSet::new((0..40).map(|k| (k as FT * 0.37).sin() + 0.05 * k as FT).collect()).unwrap();
    let kernel = SphKernel::default();
    let evaluator = NeighborEvaluator::new(&particles, &kernel);
    let params = SphParams::default();

    for i in 0..particles.len() {
        let solution = solve_smoothing_length(evaluator, i, &params, None).unwrap();
        assert!(solution.h > 0.);
        crate::assert_ft_rel_approx_eq(solution.h * solution.density, 0.5 * params.eta, 1e-4, || {
            format!("h * rho of particle {}", i)
        });

        let warm = solve_smoothing_length(evaluator, i, &params, Some(solution.h)).unwrap();
        crate::assert_ft_rel_approx_eq(warm.h, solution.h, 1e-5, || format!("warm start of particle {}", i));
        assert!(warm.statistics.total_iterations <= 2);
    }
}

#[test]
fn few_particles_still_have_a_root() {
    use crate::{particles::ParticleSet, sph_kernels::SphKernel, sph_parameters::KernelType};

    for kernel_type in [KernelType::Gadget, KernelType::Anarchy] {
        let kernel = kernel_type.kernel();
        for positions in [vec![0., 1.], vec![0., 0.5, 1.]] {
            let particles = ParticleSet::new(positions).unwrap();
            let evaluator = NeighborEvaluator::new(&particles, &kernel);
            let params = SphParams::default();

            check_smoothing_length_bounds(evaluator, params.eta).unwrap();
            for i in 0..particles.len() {
                let solution = solve_smoothing_length(evaluator, i, &params, None).unwrap();
                assert!(solution.h.is_finite() && solution.h > 0.);
                crate::assert_ft_rel_approx_eq(solution.h * solution.density, 0.5 * params.eta, 1e-4, || {
                    format!("{:?} h * rho of particle {} of {}", kernel_type, i, particles.len())
                });
            }
        }
    }

    // sigma = 4/3: 8/3 < eta < 16/3 for two unit masses
    let particles = ParticleSet::new(vec![0., 1.]).unwrap();
    let kernel = SphKernel::default();
    let evaluator = NeighborEvaluator::new(&particles, &kernel);
    for eta in [1., 2.6, 5.4, 8.] {
        assert!(
            matches!(check_smoothing_length_bounds(evaluator, eta), Err(SphError::InvalidInput(_))),
            "eta={}",
            eta
        );
    }
    check_smoothing_length_bounds(evaluator, 2.7).unwrap();
    check_smoothing_length_bounds(evaluator, 5.3).unwrap();
}

#[test]
fn coincident_mass_above_target_uses_nearest_gap() {
    use crate::{particles::ParticleSet, sph_kernels::SphKernel};

    // four particles at 0.5 give h * rho >= 4 * 4/3 > eta / 2 for any support
    let mut positions: Vec<FT> = (0..=10).map(|k| k as FT * 0.1).collect();
    positions[5] = 0.5;
    positions.extend([0.5, 0.5, 0.5]);
    let particles = ParticleSet::new(positions).unwrap();
    let kernel = SphKernel::default();
    let evaluator = NeighborEvaluator::new(&particles, &kernel);
    let params = SphParams::default();

    check_smoothing_length_bounds(evaluator, params.eta).unwrap();
    for i in [5, 11, 12, 13] {
        let solution = solve_smoothing_length(evaluator, i, &params, None).unwrap();
        crate::assert_ft_approx_eq(solution.h, particles.nearest_gap(i), 1e-12, || format!("h of particle {}", i));
        crate::assert_ft_rel_approx_eq(solution.density, 4. * evaluator.self_weight(i, solution.h).unwrap(), test_tolerance(), || {
            format!("density of particle {}", i)
        });
        assert_eq!(solution.statistics.total_iterations, 0);
    }

    // the neighbors still solve the regular constraint
    let solution = solve_smoothing_length(evaluator, 2, &params, None).unwrap();
    crate::assert_ft_rel_approx_eq(solution.h * solution.density, 0.5 * params.eta, 1e-4, || "neighbor".into());
}
