use crate::{
    error::{SphError, SphResult},
    floating_type_mod::FT,
    particles::ParticleSet,
    sph_kernels::{Kernel, SphKernel},
};

/** A kernel-weighted sum over all particles and its derivative with respect to h. */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelSum {
    pub value: FT,
    pub deriv_h: FT,
}

/**
 * Evaluates kernel sums around one particle by scanning the full particle set (gather
 * formulation, the support is the smoothing length of the central particle).
 */
#[derive(Clone, Copy)]
pub struct NeighborEvaluator<'a> {
    particles: &'a ParticleSet,
    kernel: &'a SphKernel,
}

impl<'a> NeighborEvaluator<'a> {
    pub fn new(particles: &'a ParticleSet, kernel: &'a SphKernel) -> Self {
        NeighborEvaluator { particles, kernel }
    }

    pub fn particles(&self) -> &'a ParticleSet {
        self.particles
    }

    pub fn kernel(&self) -> &'a SphKernel {
        self.kernel
    }

    /** Self weight W(0, h), the contribution of particle i to its own sums per unit mass. */
    pub fn self_weight(&self, i: usize, h: FT) -> SphResult<FT> {
        self.checked_weight(i, i, 0., h)
    }

    /**
     * S_i = sum_j weight(j) * W(|x_i - x_j|, h) and dS_i/dh. The particle itself is included.
     */
    pub fn kernel_sum(&self, i: usize, h: FT, weight: impl Fn(usize) -> FT) -> SphResult<KernelSum> {
        let x_i = self.particles.position(i);

        let mut value = 0.;
        let mut deriv_h = 0.;
        for (j, &x_j) in self.particles.positions().iter().enumerate() {
            let w_j = weight(j);
            if w_j == 0. {
                continue;
            }

            let r = (x_i - x_j).abs();
            value += w_j * self.checked_weight(i, j, r, h)?;

            let dwdh = self.kernel.weight_deriv_h(r, h);
            if !dwdh.is_finite() {
                return Err(SphError::Domain {
                    index: i,
                    neighbor: j,
                    r,
                    h,
                    value: dwdh,
                });
            }
            deriv_h += w_j * dwdh;
        }

        Ok(KernelSum { value, deriv_h })
    }

    /** rho_i = sum_j m_j W(|x_i - x_j|, h) and d(rho_i)/dh. */
    pub fn density_and_derivative(&self, i: usize, h: FT) -> SphResult<(FT, FT)> {
        let sum = self.kernel_sum(i, h, |j| self.particles.mass(j))?;
        Ok((sum.value, sum.deriv_h))
    }

    /**
     * S_i = sum_j m_j w_j^exponent W(|x_i - x_j|, h) and dS_i/dh.
     *
     * Pressure-entropy SPH uses w_j = A_j with exponent 1/gamma.
     */
    pub fn weighted_sum_and_derivative(
        &self,
        i: usize,
        h: FT,
        exponent: FT,
        per_particle_weights: &[FT],
    ) -> SphResult<(FT, FT)> {
        if per_particle_weights.len() != self.particles.len() {
            return Err(SphError::invalid_input(format!(
                "got {} weights for {} particles",
                per_particle_weights.len(),
                self.particles.len()
            )));
        }

        let sum = self.kernel_sum(i, h, |j| {
            self.particles.mass(j) * per_particle_weights[j].powf(exponent)
        })?;
        Ok((sum.value, sum.deriv_h))
    }

    /** Number of particles (including i) that get a non-zero weight with support h. */
    pub fn neighbor_count(&self, i: usize, h: FT) -> usize {
        let x_i = self.particles.position(i);
        self.particles
            .positions()
            .iter()
            .filter(|&&x_j| self.kernel.weight((x_i - x_j).abs(), h) > 0.)
            .count()
    }

    #[inline(always)]
    fn checked_weight(&self, i: usize, j: usize, r: FT, h: FT) -> SphResult<FT> {
        let w = self.kernel.weight(r, h);
        if w.is_finite() && w >= 0. {
            Ok(w)
        } else {
            Err(SphError::Domain {
                index: i,
                neighbor: j,
                r,
                h,
                value: w,
            })
        }
    }
}

#[test]
fn density_sum_of_uniform_lattice() {
    use crate::sph_kernels::GadgetKernel;

    let spacing = 0.01;
    let particles = ParticleSet::new((0..=100).map(|k| k as FT * spacing).collect()).unwrap();
    let kernel: SphKernel = GadgetKernel.into();
    let evaluator = NeighborEvaluator::new(&particles, &kernel);

    // interior particle with the full support inside the lattice
    let (rho, _) = evaluator.density_and_derivative(50, 4.5 * spacing).unwrap();
    crate::assert_ft_rel_approx_eq(rho, 1. / spacing, 1e-3, || "lattice density".into());

    // support below the lattice spacing only sees the particle itself
    let (rho_self, drho_self) = evaluator.density_and_derivative(50, 0.5 * spacing).unwrap();
    crate::assert_ft_rel_approx_eq(rho_self, evaluator.self_weight(50, 0.5 * spacing).unwrap(), 1e-12, || {
        "self density".into()
    });
    assert!(drho_self < 0.);

    assert_eq!(evaluator.neighbor_count(50, 4.5 * spacing), 9);
    assert_eq!(evaluator.neighbor_count(0, 4.5 * spacing), 5);
}

#[test]
fn density_derivative_matches_finite_difference() {
    use crate::sph_kernels::AnarchyKernel;

    let particles = ParticleSet::new(vec![0., 0.13, 0.21, 0.4, 0.42, 0.7, 0.71, 0.95]).unwrap();
    let kernel: SphKernel = AnarchyKernel.into();
    let evaluator = NeighborEvaluator::new(&particles, &kernel);

    let h = 0.31;
    let diff = 1e-6;
    for i in 0..particles.len() {
        let (_, drho) = evaluator.density_and_derivative(i, h).unwrap();
        let (rho_pos, _) = evaluator.density_and_derivative(i, h + 0.5 * diff).unwrap();
        let (rho_neg, _) = evaluator.density_and_derivative(i, h - 0.5 * diff).unwrap();
        crate::assert_ft_approx_eq(drho, (rho_pos - rho_neg) / diff, 1e-4, || format!("drho/dh of {}", i));
    }
}

#[test]
fn weighted_sum_with_unit_weights_is_density() {
    use crate::sph_kernels::GadgetKernel;

    let particles = ParticleSet::with_masses(vec![0., 0.1, 0.25, 0.3], vec![1., 2., 0.5, 1.5]).unwrap();
    let kernel: SphKernel = GadgetKernel.into();
    let evaluator = NeighborEvaluator::new(&particles, &kernel);

    let ones = vec![1.; 4];
    let adiabats = vec![2., 2., 2., 2.];
    for i in 0..4 {
        let density = evaluator.density_and_derivative(i, 0.2).unwrap();
        assert_eq!(evaluator.weighted_sum_and_derivative(i, 0.2, 0.6, &ones).unwrap(), density);

        let (s, ds) = evaluator.weighted_sum_and_derivative(i, 0.2, 0.5, &adiabats).unwrap();
        crate::assert_ft_rel_approx_eq(s, FT::sqrt(2.) * density.0, 1e-12, || "scaled sum".into());
        crate::assert_ft_approx_eq(ds, FT::sqrt(2.) * density.1, 1e-9, || "scaled derivative".into());
    }
}

#[test]
fn weighted_sum_rejects_wrong_weight_count() {
    let particles = ParticleSet::new(vec![0., 0.1, 0.25, 0.3]).unwrap();
    let kernel = SphKernel::default();
    let evaluator = NeighborEvaluator::new(&particles, &kernel);

    for weights in [vec![1.; 3], vec![1.; 5], vec![]] {
        assert!(matches!(
            evaluator.weighted_sum_and_derivative(0, 0.2, 0.6, &weights),
            Err(SphError::InvalidInput(_))
        ));
    }
}

#[test]
fn misbehaving_kernel_is_a_domain_error() {
    use crate::sph_kernels::CustomKernel;

    let particles = ParticleSet::new(vec![0., 0.5, 1.]).unwrap();
    let kernel: SphKernel = CustomKernel::new(|r, h| 1. - r / h).into();
    let evaluator = NeighborEvaluator::new(&particles, &kernel);

    match evaluator.density_and_derivative(0, 0.6) {
        Err(SphError::Domain { index, neighbor, .. }) => {
            assert_eq!(index, 0);
            assert_eq!(neighbor, 2);
        }
        other => panic!("expected a domain error, got {:?}", other),
    }
}
