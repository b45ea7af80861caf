use crate::floating_type_mod::FT;

/**
 * Aggregated iteration counts of many implicit per-particle solves. Built per particle and
 * folded together with the associative `combine`, so the order of reduction does not matter.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SolverStatistics {
    pub solves: usize,

    // Newton or bisection iterations summed over all solves
    pub total_iterations: usize,
    pub max_iterations: usize,

    pub newton_steps: usize,
    pub bisection_steps: usize,

    // halvings/doublings needed until the initial bracket enclosed a root
    pub bracket_expansions: usize,

    // solves that ran out of iterations and were replaced by their bracket midpoint
    pub fallbacks: usize,
}

impl SolverStatistics {
    pub fn zero() -> SolverStatistics {
        SolverStatistics::default()
    }

    pub fn for_single_solve(newton_steps: usize, bisection_steps: usize, bracket_expansions: usize) -> SolverStatistics {
        SolverStatistics {
            solves: 1,
            total_iterations: newton_steps + bisection_steps,
            max_iterations: newton_steps + bisection_steps,
            newton_steps,
            bisection_steps,
            bracket_expansions,
            fallbacks: 0,
        }
    }

    pub fn combine(self, other: SolverStatistics) -> SolverStatistics {
        SolverStatistics {
            solves: self.solves + other.solves,
            total_iterations: self.total_iterations + other.total_iterations,
            max_iterations: usize::max(self.max_iterations, other.max_iterations),
            newton_steps: self.newton_steps + other.newton_steps,
            bisection_steps: self.bisection_steps + other.bisection_steps,
            bracket_expansions: self.bracket_expansions + other.bracket_expansions,
            fallbacks: self.fallbacks + other.fallbacks,
        }
    }

    pub fn avg_iterations(&self) -> FT {
        if self.solves > 0 {
            self.total_iterations as FT / self.solves as FT
        } else {
            FT::NAN
        }
    }
}

impl std::iter::Sum for SolverStatistics {
    fn sum<I: Iterator<Item = SolverStatistics>>(iter: I) -> Self {
        iter.fold(SolverStatistics::zero(), SolverStatistics::combine)
    }
}

#[test]
fn statistics_combine() {
    let a = SolverStatistics::for_single_solve(3, 1, 0);
    let b = SolverStatistics::for_single_solve(5, 4, 2);
    let c = SolverStatistics {
        fallbacks: 1,
        ..SolverStatistics::for_single_solve(0, 7, 1)
    };

    let total: SolverStatistics = vec![a, b, c].into_iter().sum();
    assert_eq!(total, c.combine(a).combine(b));
    assert_eq!(total.solves, 3);
    assert_eq!(total.total_iterations, 20);
    assert_eq!(total.max_iterations, 9);
    assert_eq!(total.newton_steps, 8);
    assert_eq!(total.bisection_steps, 12);
    assert_eq!(total.bracket_expansions, 3);
    assert_eq!(total.fallbacks, 1);
    crate::assert_ft_approx_eq(total.avg_iterations(), 20. / 3., 1e-12, || "avg iterations".into());
    assert!(SolverStatistics::zero().avg_iterations().is_nan());
}
