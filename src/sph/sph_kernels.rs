use std::{fmt, sync::Arc};

use enum_dispatch::enum_dispatch;

use crate::floating_type_mod::FT;

/**
 * The GADGET-2 cubic spline with support q = r/h < 1.
 */
pub fn cubic_kernel_unnormalized(q: FT) -> FT {
    if q < 0.5 {
        return 6. * (q * q * q - q * q) + 1.;
    } else if q < 1. {
        let v = 1. - q;
        return 2. * (v * v * v);
    } else {
        return 0.;
    }
}

pub fn cubic_kernel_unnormalized_deriv(q: FT) -> FT {
    if q < 0.5 {
        return 18. * q * q - 12. * q;
    } else if q < 1. {
        let v = 1. - q;
        return -6. * v * v;
    } else {
        return 0.;
    };
}

/**
 * Wendland C2 shape (1 + 4q)(1 - q)^4 used by ANARCHY, support q = r/h < 1.
 */
pub fn wendland_c2_unnormalized(q: FT) -> FT {
    if q < 1. {
        let v = 1. - q;
        let v2 = v * v;
        (1. + 4. * q) * v2 * v2
    } else {
        0.
    }
}

pub fn wendland_c2_unnormalized_deriv(q: FT) -> FT {
    if q < 1. {
        let v = 1. - q;
        -20. * q * v * v * v
    } else {
        0.
    }
}

/*
 * 1D normalisation. For W(r, h) = sigma/h * f(r/h) on |r| < h the condition
 * integral(W dr) = 1 gives sigma = 1 / (2 * integral_0^1 f(q) dq).
 *
 *   cubic spline:  integral_0^1 f = 11/32 + 1/32 = 3/8   =>  sigma = 4/3
 *   Wendland C2:   integral_0^1 f = 1 - 4/6     = 1/3   =>  sigma = 3/2
 *
 * The 3D GADGET constant 8/pi does not apply here.
 */
pub const GADGET_NORM_1D: FT = 4. / 3.;
pub const ANARCHY_NORM_1D: FT = 3. / 2.;

/**
 * dW/dh for W = sigma/h * f(r/h) in 1D:
 *
 *   dW/dh = -sigma/h^2 * (f(q) + q * f'(q))
 */
#[inline(always)]
fn scaled_deriv_h(sigma: FT, h: FT, q: FT, f: FT, df: FT) -> FT {
    -sigma / (h * h) * (f + q * df)
}

/**
 * An interpolation weight W(r, h) with units of 1/length.
 *
 * Contract (not enforced): W >= 0, finite at r = 0, vanishes for large r/h and integrates to one.
 */
#[enum_dispatch]
pub trait Kernel {
    fn weight(&self, r: FT, h: FT) -> FT;

    /// dW/dh at fixed r. Falls back to a central difference.
    fn weight_deriv_h(&self, r: FT, h: FT) -> FT {
        central_difference_deriv_h(|hh| self.weight(r, hh), h)
    }
}

/** Central difference in h with the step size that balances truncation and rounding error. */
pub fn central_difference_deriv_h(w: impl Fn(FT) -> FT, h: FT) -> FT {
    let step = h * FT::EPSILON.cbrt();
    (w(h + step) - w(h - step)) / (2. * step)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GadgetKernel;

impl Kernel for GadgetKernel {
    fn weight(&self, r: FT, h: FT) -> FT {
        GADGET_NORM_1D / h * cubic_kernel_unnormalized(r.abs() / h)
    }

    fn weight_deriv_h(&self, r: FT, h: FT) -> FT {
        let q = r.abs() / h;
        scaled_deriv_h(
            GADGET_NORM_1D,
            h,
            q,
            cubic_kernel_unnormalized(q),
            cubic_kernel_unnormalized_deriv(q),
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnarchyKernel;

impl Kernel for AnarchyKernel {
    fn weight(&self, r: FT, h: FT) -> FT {
        ANARCHY_NORM_1D / h * wendland_c2_unnormalized(r.abs() / h)
    }

    fn weight_deriv_h(&self, r: FT, h: FT) -> FT {
        let q = r.abs() / h;
        scaled_deriv_h(
            ANARCHY_NORM_1D,
            h,
            q,
            wendland_c2_unnormalized(q),
            wendland_c2_unnormalized_deriv(q),
        )
    }
}

type KernelFn = Arc<dyn Fn(FT, FT) -> FT + Send + Sync>;

/**
 * A caller supplied kernel. Normalisation and positivity are the caller's responsibility;
 * negative or non-finite weights surface as `SphError::Domain` during the neighbor sums.
 */
#[derive(Clone)]
pub struct CustomKernel {
    weight_fn: KernelFn,
    deriv_h_fn: Option<KernelFn>,
}

impl CustomKernel {
    pub fn new(weight_fn: impl Fn(FT, FT) -> FT + Send + Sync + 'static) -> Self {
        CustomKernel {
            weight_fn: Arc::new(weight_fn),
            deriv_h_fn: None,
        }
    }

    /// Supplies an analytic dW/dh instead of the finite-difference fallback.
    pub fn with_deriv_h(mut self, deriv_h_fn: impl Fn(FT, FT) -> FT + Send + Sync + 'static) -> Self {
        self.deriv_h_fn = Some(Arc::new(deriv_h_fn));
        self
    }
}

impl fmt::Debug for CustomKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomKernel")
            .field("analytic_deriv_h", &self.deriv_h_fn.is_some())
            .finish()
    }
}

impl Kernel for CustomKernel {
    fn weight(&self, r: FT, h: FT) -> FT {
        (self.weight_fn)(r, h)
    }

    fn weight_deriv_h(&self, r: FT, h: FT) -> FT {
        match &self.deriv_h_fn {
            Some(deriv_h_fn) => deriv_h_fn(r, h),
            None => central_difference_deriv_h(|hh| (self.weight_fn)(r, hh), h),
        }
    }
}

#[enum_dispatch(Kernel)]
#[derive(Debug, Clone)]
pub enum SphKernel {
    GadgetKernel(GadgetKernel),
    AnarchyKernel(AnarchyKernel),
    CustomKernel(CustomKernel),
}

impl Default for SphKernel {
    fn default() -> Self {
        GadgetKernel.into()
    }
}

/** Midpoint-rule integral of W(., h) over [-half_width, half_width]. */
pub fn integrate_kernel_1d<K: Kernel + ?Sized>(kernel: &K, h: FT, half_width: FT, steps: usize) -> FT {
    let dx = 2. * half_width / steps as FT;
    (0..steps)
        .map(|k| {
            let x = -half_width + (k as FT + 0.5) * dx;
            kernel.weight(x, h) * dx
        })
        .sum()
}

#[test]
fn kernel_1d_integration_test() {
    let kernels: [SphKernel; 2] = [GadgetKernel.into(), AnarchyKernel.into()];

    for kernel in kernels.iter() {
        for h in [0.05, 1., 7.5] {
            let integral = integrate_kernel_1d(kernel, h, 1.5 * h, 30000);

            println!("Integration of {:?} with h={:.2}: {}", kernel, h, integral);
            crate::assert_ft_approx_eq(integral, 1., 1e-5, || format!("integral of {:?}", kernel));
        }
    }
}

#[test]
fn kernel_compact_support_and_positivity_test() {
    let kernels: [SphKernel; 2] = [GadgetKernel.into(), AnarchyKernel.into()];
    let h = 2.;

    for kernel in kernels.iter() {
        for k in 0..=300 {
            let r = k as FT * 0.01;
            let w = kernel.weight(r, h);
            assert!(w.is_finite() && w >= 0., "{:?}: W({})={}", kernel, r, w);
            assert_eq!(w, kernel.weight(-r, h));
            if r >= h {
                assert_eq!(w, 0.);
                assert_eq!(kernel.weight_deriv_h(r, h), 0.);
            }
        }
    }

    assert_eq!(GadgetKernel.weight(0., h), GADGET_NORM_1D / h);
    assert_eq!(AnarchyKernel.weight(0., h), ANARCHY_NORM_1D / h);
}

#[test]
fn kernel_deriv_h_test() {
    let kernels: [SphKernel; 2] = [GadgetKernel.into(), AnarchyKernel.into()];
    let h = 1.;
    let diff = 1e-4;

    for kernel in kernels.iter() {
        for k in 0..=120 {
            // stay off the piecewise junctions
            let r = k as FT * 0.01 + 0.0037;

            let analytical_deriv = kernel.weight_deriv_h(r, h);
            let approx_deriv = (kernel.weight(r, h + 0.5 * diff) - kernel.weight(r, h - 0.5 * diff)) / diff;

            println!(
                "{:?} r={:.4}: analytical={:+.7} approx={:+.7}",
                kernel, r, analytical_deriv, approx_deriv
            );
            crate::assert_ft_approx_eq(analytical_deriv, approx_deriv, 1e-5, || format!("dW/dh at r={}", r));
        }
    }
}

#[test]
fn custom_kernel_falls_back_to_finite_difference() {
    let custom: SphKernel = CustomKernel::new(|r, h| GadgetKernel.weight(r, h)).into();
    let analytic: SphKernel = CustomKernel::new(|r, h| GadgetKernel.weight(r, h))
        .with_deriv_h(|r, h| GadgetKernel.weight_deriv_h(r, h))
        .into();

    for r in [0., 0.1, 0.33, 0.72, 0.9] {
        let expected = GadgetKernel.weight_deriv_h(r, 1.);
        crate::assert_ft_approx_eq(custom.weight_deriv_h(r, 1.), expected, 1e-6, || format!("fallback r={}", r));
        assert_eq!(analytic.weight_deriv_h(r, 1.), expected);
        assert_eq!(custom.weight(r, 1.), GadgetKernel.weight(r, 1.));
    }
}
