use pressure_entropy_sph::{
    assert_ft_rel_approx_eq, floating_type_mod::FT, neighborhood::NeighborEvaluator, AnarchyKernel, CustomKernel,
    GadgetKernel, KernelType, PressureEntropyData, SphError, SphParams, ThermalInput,
};

fn linspace(n: usize) -> Vec<FT> {
    (0..n).map(|k| k as FT / (n - 1) as FT).collect()
}

/// Smoothly varying particle spacing, densest around x = 0.5.
fn clustered(n: usize) -> Vec<FT> {
    linspace(n).into_iter().map(|x| x + 0.05 * (2. * std::f64::consts::PI as FT * x).sin()).collect()
}

fn with_energies(positions: Vec<FT>, energies: Vec<FT>) -> PressureEntropyData {
    PressureEntropyData::builder(positions).energies(energies).build().unwrap()
}

#[test]
fn densities_are_consistent_with_smoothing_lengths() {
    let data = with_energies(clustered(80), vec![1.; 80]);
    let evaluator = NeighborEvaluator::new(data.particles(), data.kernel());
    let gadget = data.gadget();

    for i in 0..data.len() {
        let h = gadget.smoothing_lengths()[i];
        let (rho, _) = evaluator.density_and_derivative(i, h).unwrap();
        assert_ft_rel_approx_eq(rho, gadget.densities()[i], 1e-12, || format!("density of particle {}", i));

        assert!(h > 0.);
        assert!(gadget.densities()[i] > 0.);
        assert!(gadget.pressures()[i] >= 0.);
        assert!(data.smoothed_pressures()[i] >= 0.);
        assert!(data.smoothed_densities()[i] > 0.);
    }
}

#[test]
fn construction_is_deterministic() {
    let energies: Vec<FT> = (0..70).map(|k| 1. + 0.5 * (k as FT * 0.3).cos()).collect();
    let a = with_energies(clustered(70), energies.clone());
    let b = with_energies(clustered(70), energies);

    assert_eq!(a.gadget(), b.gadget());
    assert_eq!(a.pressure_entropy(), b.pressure_entropy());
}

#[test]
fn uniform_adiabats_reduce_to_traditional_sph() {
    for kernel in [KernelType::Gadget, KernelType::Anarchy] {
        let params = SphParams {
            kernel,
            ..SphParams::default()
        };
        let data = PressureEntropyData::new(clustered(64), ThermalInput::Adiabats(vec![2.; 64]), params).unwrap();

        for i in 0..data.len() {
            assert_ft_rel_approx_eq(data.smoothed_pressures()[i], data.gadget().pressures()[i], 1e-10, || {
                format!("{:?} pressure of particle {}", kernel, i)
            });
            assert_ft_rel_approx_eq(data.smoothed_densities()[i], data.gadget().densities()[i], 1e-10, || {
                format!("{:?} density of particle {}", kernel, i)
            });
        }
    }
}

#[test]
fn uniform_energy_agrees_in_the_interior() {
    let data = with_energies(linspace(101), vec![1.; 101]);

    for i in 40..=60 {
        assert_ft_rel_approx_eq(data.smoothed_pressures()[i], data.gadget().pressures()[i], 0.05, || {
            format!("pressure of particle {}", i)
        });
        assert_ft_rel_approx_eq(data.smoothed_densities()[i], data.gadget().densities()[i], 0.05, || {
            format!("density of particle {}", i)
        });
    }
}

#[test]
fn uniform_distribution() {
    let params = SphParams {
        eta: 5.,
        gamma: 5. / 3.,
        kernel: KernelType::Gadget,
        ..SphParams::default()
    };
    let data = PressureEntropyData::new(linspace(101), ThermalInput::Energies(vec![1.; 101]), params).unwrap();
    let h = data.gadget().smoothing_lengths();
    let rho = data.gadget().densities();

    let h_mid = h[50];
    let rho_mid = rho[50];
    for i in 10..=90 {
        assert_ft_rel_approx_eq(h[i], h_mid, 0.1, || format!("smoothing length of particle {}", i));
        assert_ft_rel_approx_eq(rho[i], rho_mid, 0.1, || format!("density of particle {}", i));
    }
    // 101 unit masses on a unit interval
    assert_ft_rel_approx_eq(rho_mid, 100., 0.05, || "interior density".into());

    // one-sided neighborhoods at the open boundaries
    assert!(h[0] > 1.2 * h_mid);
    assert!(h[100] > 1.2 * h_mid);
    assert_ft_rel_approx_eq(h[0], h[100], 1e-4, || "mirror symmetry".into());
}

#[test]
fn coincident_particles_are_regular() {
    let mut positions = linspace(21);
    positions.push(0.5);

    for kernel in [KernelType::Gadget, KernelType::Anarchy] {
        let params = SphParams {
            kernel,
            ..SphParams::default()
        };
        let data = PressureEntropyData::new(positions.clone(), ThermalInput::Energies(vec![1.; 22]), params).unwrap();

        let gadget = data.gadget();
        assert_ft_rel_approx_eq(gadget.smoothing_lengths()[10], gadget.smoothing_lengths()[21], 1e-12, || {
            format!("{:?} smoothing lengths of the coincident pair", kernel)
        });
        for i in 0..data.len() {
            assert!(gadget.smoothing_lengths()[i].is_finite() && gadget.smoothing_lengths()[i] > 0.);
            assert!(gadget.densities()[i].is_finite() && gadget.densities()[i] > 0.);
            assert!(data.smoothed_pressures()[i].is_finite());
        }
    }
}

#[test]
fn two_particles_converge() {
    for positions in [vec![0., 1.], vec![0., 0.5, 1.]] {
        for kernel in [KernelType::Gadget, KernelType::Anarchy] {
            let n = positions.len();
            let params = SphParams {
                kernel,
                ..SphParams::default()
            };
            let data = PressureEntropyData::new(positions.clone(), ThermalInput::Energies(vec![1.; n]), params).unwrap();

            let gadget = data.gadget();
            for i in 0..n {
                let h = gadget.smoothing_lengths()[i];
                assert!(h.is_finite() && h > 0., "{:?} N={} particle {}", kernel, n, i);
                assert_ft_rel_approx_eq(h * gadget.densities()[i], 0.5 * params.eta, 1e-4, || {
                    format!("{:?} N={} constraint of particle {}", kernel, n, i)
                });
                assert!(gadget.pressures()[i].is_finite() && gadget.pressures()[i] >= 0.);
                assert!(data.smoothed_pressures()[i].is_finite() && data.smoothed_pressures()[i] >= 0.);
            }
        }
    }
}

#[test]
fn eta_outside_the_reachable_range_is_rejected() {
    let with_eta = |positions: Vec<FT>, eta: FT| {
        let n = positions.len();
        PressureEntropyData::builder(positions).energies(vec![1.; n]).eta(eta).build()
    };

    // below the self contribution of either kernel
    for eta in [1., 2.] {
        assert!(matches!(with_eta(linspace(101), eta), Err(SphError::InvalidInput(_))), "eta={}", eta);
    }
    // more neighbors than two particles can provide
    assert!(matches!(with_eta(vec![0., 1.], 6.), Err(SphError::InvalidInput(_))));

    let data = with_eta(linspace(101), 3.).unwrap();
    for i in 0..data.len() {
        assert_ft_rel_approx_eq(data.gadget().smoothing_lengths()[i] * data.gadget().densities()[i], 1.5, 1e-4, || {
            format!("constraint of particle {}", i)
        });
    }
}

#[test]
fn malformed_input_is_rejected() {
    let invalid = |result: Result<PressureEntropyData, SphError>| {
        assert!(matches!(result, Err(SphError::InvalidInput(_))), "{:?}", result.map(|d| d.len()))
    };

    invalid(
        PressureEntropyData::builder(linspace(10))
            .energies(vec![1.; 10])
            .adiabats(vec![1.; 10])
            .build(),
    );
    invalid(PressureEntropyData::builder(linspace(10)).build());
    invalid(PressureEntropyData::builder(linspace(10)).energies(vec![1.; 9]).build());
    invalid(PressureEntropyData::builder(linspace(10)).adiabats(vec![1.; 11]).build());
    invalid(PressureEntropyData::builder(vec![0.5]).energies(vec![1.]).build());
    invalid(PressureEntropyData::builder(linspace(10)).energies(vec![1.; 10]).eta(-1.).build());
    invalid(PressureEntropyData::builder(linspace(10)).energies(vec![1.; 10]).gamma(1.).build());

    let mut energies = vec![1.; 10];
    energies[3] = 0.;
    invalid(PressureEntropyData::builder(linspace(10)).energies(energies).build());
}

#[test]
fn gadget_and_anarchy_kernels_agree() {
    let positions = clustered(120);
    let gadget_kernel = PressureEntropyData::builder(positions.clone())
        .energies(vec![1.; 120])
        .kernel(GadgetKernel)
        .build()
        .unwrap();
    let anarchy_kernel = PressureEntropyData::builder(positions)
        .energies(vec![1.; 120])
        .kernel(AnarchyKernel)
        .build()
        .unwrap();

    for i in 20..100 {
        let rho_gadget = gadget_kernel.gadget().densities()[i];
        let rho_anarchy = anarchy_kernel.gadget().densities()[i];
        assert!(rho_gadget.is_finite() && rho_gadget > 0.);
        assert!(rho_anarchy.is_finite() && rho_anarchy > 0.);
        assert_ft_rel_approx_eq(rho_gadget, rho_anarchy, 0.5, || format!("density of particle {}", i));
    }
}

#[test]
fn custom_kernel_can_be_substituted() {
    // normalized triangle kernel, derivative by finite differences
    let triangle = CustomKernel::new(|r: FT, h: FT| if r < h { (1. - r / h) / h } else { 0. });
    let data = PressureEntropyData::builder(clustered(50))
        .energies(vec![1.; 50])
        .kernel(triangle)
        .build()
        .unwrap();

    let gadget = data.gadget();
    for i in 0..data.len() {
        assert_ft_rel_approx_eq(gadget.smoothing_lengths()[i] * gadget.densities()[i], 2.5, 1e-4, || {
            format!("constraint of particle {}", i)
        });
        assert!(data.smoothed_pressures()[i] > 0.);
    }
}

#[test]
fn adiabat_relaxation_is_optional() {
    let energies: Vec<FT> = (0..60).map(|k| if k < 30 { 1. } else { 3. }).collect();
    let relaxed = with_energies(clustered(60), energies.clone());
    let unrelaxed = PressureEntropyData::builder(clustered(60))
        .energies(energies)
        .params(SphParams {
            relax_adiabats: false,
            ..SphParams::default()
        })
        .build()
        .unwrap();

    assert_eq!(unrelaxed.adiabats(), unrelaxed.gadget().adiabats());
    assert_eq!(unrelaxed.pressure_entropy().sweeps(), 0);
    assert!(relaxed.pressure_entropy().sweeps() > 0);

    // same geometric pass in both
    assert_eq!(relaxed.gadget(), unrelaxed.gadget());

    // far from the contact both formulations see a uniform gas
    for i in [10, 50] {
        assert_ft_rel_approx_eq(relaxed.adiabats()[i], unrelaxed.adiabats()[i], 0.05, || {
            format!("adiabat of particle {}", i)
        });
    }
}

#[test]
fn mass_scaling_keeps_smoothing_lengths() {
    let unit = with_energies(clustered(40), vec![1.; 40]);
    let heavy = PressureEntropyData::builder(clustered(40))
        .energies(vec![1.; 40])
        .masses(vec![2.; 40])
        .build()
        .unwrap();

    for i in 0..40 {
        assert_ft_rel_approx_eq(heavy.gadget().smoothing_lengths()[i], unit.gadget().smoothing_lengths()[i], 1e-5, || {
            format!("smoothing length of particle {}", i)
        });
        assert_ft_rel_approx_eq(heavy.gadget().densities()[i], 2. * unit.gadget().densities()[i], 1e-5, || {
            format!("density of particle {}", i)
        });
    }
}

#[test]
fn parameters_from_yaml() {
    let params = SphParams::from_yaml_str("eta: 4.0\nkernel: Anarchy\nrelax_adiabats: false\n").unwrap();
    let data = PressureEntropyData::new(clustered(30), ThermalInput::Energies(vec![1.; 30]), params).unwrap();

    assert_eq!(data.params(), &params);
    assert_eq!(data.pressure_entropy().sweeps(), 0);
    for i in 0..data.len() {
        assert_ft_rel_approx_eq(data.gadget().smoothing_lengths()[i] * data.gadget().densities()[i], 2., 1e-4, || {
            format!("constraint of particle {}", i)
        });
    }
}
