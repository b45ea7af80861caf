use crate::{
    error::{SphError, SphResult},
    floating_type_mod::FT,
};

/**
 * Immutable 1D particle positions and masses. The index of a particle is its identity in
 * every per-particle array computed from this set.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleSet {
    position: Vec<FT>,
    mass: Vec<FT>,
    extent: FT,
    min_separation: FT,
}

impl ParticleSet {
    /** All particles get unit mass. */
    pub fn new(position: Vec<FT>) -> SphResult<Self> {
        let n = position.len();
        Self::with_masses(position, vec![1.; n])
    }

    pub fn with_masses(position: Vec<FT>, mass: Vec<FT>) -> SphResult<Self> {
        if position.len() < 2 {
            return Err(SphError::invalid_input(format!(
                "at least 2 particles are needed, got {}",
                position.len()
            )));
        }
        if mass.len() != position.len() {
            return Err(SphError::invalid_input(format!(
                "got {} masses for {} positions",
                mass.len(),
                position.len()
            )));
        }
        if let Some(i) = position.iter().position(|x| !x.is_finite()) {
            return Err(SphError::invalid_input(format!(
                "position of particle {} is not finite ({})",
                i, position[i]
            )));
        }
        if let Some(i) = mass.iter().position(|&m| !(m.is_finite() && m > 0.)) {
            return Err(SphError::invalid_input(format!(
                "mass of particle {} must be positive, got {}",
                i, mass[i]
            )));
        }

        let mut sorted = position.clone();
        sorted.sort_by(FT::total_cmp);

        let extent = sorted[sorted.len() - 1] - sorted[0];
        if extent <= 0. {
            return Err(SphError::invalid_input("all particles share the same position"));
        }

        // coincident particles do not define a length scale
        let min_separation = sorted
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|&d| d > 0.)
            .fold(FT::INFINITY, FT::min);

        Ok(ParticleSet {
            position,
            mass,
            extent,
            min_separation,
        })
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn positions(&self) -> &[FT] {
        &self.position
    }

    pub fn masses(&self) -> &[FT] {
        &self.mass
    }

    #[inline(always)]
    pub fn position(&self, i: usize) -> FT {
        self.position[i]
    }

    #[inline(always)]
    pub fn mass(&self, i: usize) -> FT {
        self.mass[i]
    }

    /** Length of the occupied domain, max(x) - min(x). */
    pub fn extent(&self) -> FT {
        self.extent
    }

    /** Smallest non-zero gap between two particles. */
    pub fn min_separation(&self) -> FT {
        self.min_separation
    }

    /** Distance from particle i to its closest neighbor at a different position. */
    pub fn nearest_gap(&self, i: usize) -> FT {
        let x_i = self.position[i];
        self.position
            .iter()
            .map(|&x_j| (x_i - x_j).abs())
            .filter(|&d| d > 0.)
            .fold(FT::INFINITY, FT::min)
    }

    /** Total mass at exactly the position of particle i, including i itself. */
    pub fn coincident_mass(&self, i: usize) -> FT {
        let x_i = self.position[i];
        self.position
            .iter()
            .zip(&self.mass)
            .filter(|(&x_j, _)| x_j == x_i)
            .map(|(_, &m_j)| m_j)
            .sum()
    }

    pub fn total_mass(&self) -> FT {
        self.mass.iter().sum()
    }

    /** Density the particles would have if spread evenly over the occupied domain. */
    pub fn mean_density(&self) -> FT {
        self.total_mass() / self.extent
    }
}

#[test]
fn particle_set_geometry() {
    let particles = ParticleSet::new(vec![0.4, 0.1, 0.4, 1.0, 0.25]).unwrap();

    assert_eq!(particles.len(), 5);
    crate::assert_ft_approx_eq(particles.extent(), 0.9, 1e-12, || "extent".into());
    crate::assert_ft_approx_eq(particles.min_separation(), 0.15, 1e-12, || "min separation".into());
    crate::assert_ft_approx_eq(particles.mean_density(), 5. / 0.9, 1e-12, || "mean density".into());
    assert_eq!(particles.masses(), &[1.; 5]);

    crate::assert_ft_approx_eq(particles.nearest_gap(0), 0.15, 1e-12, || "gap of 0.4".into());
    crate::assert_ft_approx_eq(particles.nearest_gap(3), 0.6, 1e-12, || "gap of 1.0".into());
    assert_eq!(particles.coincident_mass(0), 2.);
    assert_eq!(particles.coincident_mass(1), 1.);
}

#[test]
fn particle_set_rejects_bad_input() {
    let expect_invalid = |r: SphResult<ParticleSet>| assert!(matches!(r, Err(SphError::InvalidInput(_))));

    expect_invalid(ParticleSet::new(vec![0.5]));
    expect_invalid(ParticleSet::new(vec![0.5, 0.5, 0.5]));
    expect_invalid(ParticleSet::new(vec![0., FT::NAN]));
    expect_invalid(ParticleSet::with_masses(vec![0., 1.], vec![1.]));
    expect_invalid(ParticleSet::with_masses(vec![0., 1.], vec![1., 0.]));
}
