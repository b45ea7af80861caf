//! Property tests for the per-particle solves on randomly jittered particle sets.

use pressure_entropy_sph::{floating_type_mod::FT, IdealGas, KernelType, PressureEntropyData, SphParams, ThermalInput};
use proptest::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Lattice on [0, 1) with every particle displaced by up to 40% of the spacing.
fn jittered_positions(n: usize, seed: u64) -> Vec<FT> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|k| (k as FT + rng.gen_range(-0.4..0.4)) / n as FT)
        .collect()
}

fn random_energies(n: usize, seed: u64) -> Vec<FT> {
    let mut rng = StdRng::seed_from_u64(seed ^ 0x5eed);
    (0..n).map(|_| rng.gen_range(0.5..2.0)).collect()
}

fn kernel_type(anarchy: bool) -> KernelType {
    if anarchy {
        KernelType::Anarchy
    } else {
        KernelType::Gadget
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Every particle satisfies h * rho = eta * m / 2 with positive fields.
    #[test]
    fn smoothing_length_constraint_holds(
        n in 12usize..40,
        seed in any::<u64>(),
        eta in 3.2f64..8.0,
        anarchy in any::<bool>(),
    ) {
        let params = SphParams {
            eta: eta as FT,
            kernel: kernel_type(anarchy),
            ..SphParams::default()
        };
        let data = PressureEntropyData::new(
            jittered_positions(n, seed),
            ThermalInput::Energies(random_energies(n, seed)),
            params,
        ).unwrap();

        let gadget = data.gadget();
        for i in 0..n {
            let h = gadget.smoothing_lengths()[i];
            let rho = gadget.densities()[i];
            prop_assert!(h > 0.);
            prop_assert!(rho > 0.);
            prop_assert!(((h * rho - 0.5 * params.eta) / (0.5 * params.eta)).abs() < 1e-4);
            prop_assert!(gadget.pressures()[i] >= 0.);
            prop_assert!(data.smoothed_pressures()[i] >= 0.);
            prop_assert!(data.adiabats()[i] > 0.);
        }
    }

    /// Relaxed adiabats reproduce the pressure implied by each particle's own energy.
    #[test]
    fn relaxed_adiabats_are_self_consistent(
        n in 12usize..40,
        seed in any::<u64>(),
    ) {
        let energies = random_energies(n, seed);
        let data = PressureEntropyData::new(
            jittered_positions(n, seed),
            ThermalInput::Energies(energies.clone()),
            SphParams::default(),
        ).unwrap();

        let gas = IdealGas::new(data.params().gamma);
        for i in 0..n {
            let p = data.smoothed_pressures()[i];
            let p_eos = gas.pressure_from_energy_and_adiabat(energies[i], data.adiabats()[i]);
            prop_assert!(((p - p_eos) / p_eos).abs() < 1e-4, "particle {}: {} vs {}", i, p, p_eos);
        }
    }

    /// Reversing the particle order reverses every result.
    #[test]
    fn results_follow_particle_order(
        n in 12usize..30,
        seed in any::<u64>(),
    ) {
        let positions = jittered_positions(n, seed);
        let energies = random_energies(n, seed);
        let reversed = |v: &[FT]| v.iter().rev().copied().collect::<Vec<FT>>();

        let params = SphParams { relax_adiabats: false, ..SphParams::default() };
        let forward = PressureEntropyData::new(positions.clone(), ThermalInput::Energies(energies.clone()), params).unwrap();
        let backward = PressureEntropyData::new(
            reversed(&positions),
            ThermalInput::Energies(reversed(&energies)),
            params,
        ).unwrap();

        let expected = reversed(forward.gadget().smoothing_lengths());
        for (i, (&a, &b)) in expected.iter().zip(backward.gadget().smoothing_lengths()).enumerate() {
            prop_assert!(((a - b) / a).abs() < 1e-5, "particle {}: {} vs {}", i, a, b);
        }

        let expected = reversed(forward.smoothed_pressures());
        for (i, (&a, &b)) in expected.iter().zip(backward.smoothed_pressures()).enumerate() {
            prop_assert!(((a - b) / a).abs() < 1e-4, "particle {}: {} vs {}", i, a, b);
        }
    }
}
