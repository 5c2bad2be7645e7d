pub mod linalg;

pub use linalg::{DenseMatrix, LuDecomposition, LuError, lu_factorize, lu_solve};

/// 1 / (2 * sqrt(2 * ln 2)): converts a Gaussian FWHM into its sigma.
pub const FWHM_TO_SIGMA: f64 = 0.424_660_900_144_009_5;

fn kahan_add(sum: &mut f64, correction: &mut f64, value: f64) {
    let corrected = value - *correction;
    let next = *sum + corrected;
    *correction = (next - *sum) - corrected;
    *sum = next;
}

pub fn stable_sum(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut correction = 0.0;

    for &value in values {
        kahan_add(&mut sum, &mut correction, value);
    }

    sum
}

/// Inclusive linear ramp from `first` to `last` with `count` samples.
///
/// The final sample is pinned to `last` so endpoint offsets survive rounding.
pub fn linear_ramp(first: f64, last: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![first],
        _ => {
            let step = (last - first) / ((count - 1) as f64);
            let mut ramp: Vec<f64> = (0..count).map(|index| first + step * index as f64).collect();
            ramp[count - 1] = last;
            ramp
        }
    }
}

/// Trapezoidal integral of `ys` sampled on the (possibly non-uniform) grid `xs`.
pub fn trapezoid(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.len() < 2 || xs.len() != ys.len() {
        return 0.0;
    }

    let mut sum = 0.0;
    let mut correction = 0.0;
    for index in 1..xs.len() {
        let panel = 0.5 * (ys[index] + ys[index - 1]) * (xs[index] - xs[index - 1]);
        kahan_add(&mut sum, &mut correction, panel);
    }

    sum
}

/// Trapezoidal integral of `ys` sampled with uniform spacing `step`.
pub fn trapezoid_uniform(step: f64, ys: &[f64]) -> f64 {
    if ys.len() < 2 {
        return 0.0;
    }

    let interior: f64 = stable_sum(&ys[1..ys.len() - 1]);
    step * (interior + 0.5 * (ys[0] + ys[ys.len() - 1]))
}

/// Complementary error function, |relative error| < 1.2e-7.
///
/// Rational Chebyshev approximation.
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let polynomial = t
        * (-z * z - 1.265_512_23
            + t * (1.000_023_68
                + t * (0.374_091_96
                    + t * (0.096_784_18
                        + t * (-0.186_288_06
                            + t * (0.278_868_07
                                + t * (-1.135_203_98
                                    + t * (1.488_515_87
                                        + t * (-0.822_152_23 + t * 0.170_872_77)))))))))
        .exp();

    if x >= 0.0 { polynomial } else { 2.0 - polynomial }
}

/// Scaled complementary error function `exp(x^2) * erfc(x)`.
///
/// Stable for large positive arguments where `erfc` underflows; used by the
/// exponentially modified Gaussian evaluation.
pub fn erfcx(x: f64) -> f64 {
    if x < 5.0 {
        return (x * x).exp() * erfc(x);
    }

    // Asymptotic expansion for large positive arguments.
    let inv_sq = 1.0 / (x * x);
    (1.0 - 0.5 * inv_sq + 0.75 * inv_sq * inv_sq) / (x * std::f64::consts::PI.sqrt())
}

#[cfg(test)]
mod tests {
    use super::{erfc, erfcx, linear_ramp, stable_sum, trapezoid, trapezoid_uniform};

    #[test]
    fn stable_sum_reduces_order_loss_for_large_and_small_values() {
        let input = [1.0e16, 1.0, -1.0e16];
        assert_eq!(stable_sum(&input), 0.0);
    }

    #[test]
    fn linear_ramp_is_inclusive_and_handles_degenerate_counts() {
        assert!(linear_ramp(0.0, 1.0, 0).is_empty());
        assert_eq!(linear_ramp(7.0, 1.0, 1), vec![7.0]);
        assert_eq!(linear_ramp(0.0, 2.0, 5), vec![0.0, 0.5, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn trapezoid_matches_analytic_quadratic_integral() {
        let xs: Vec<f64> = (0..=1000).map(|index| index as f64 * 1.0e-3).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| x * x).collect();
        let integral = trapezoid(&xs, &ys);
        assert!((integral - 1.0 / 3.0).abs() < 1.0e-6);
    }

    #[test]
    fn trapezoid_uniform_agrees_with_general_form() {
        let xs: Vec<f64> = (0..200).map(|index| index as f64 * 0.05).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| (x * 0.4).sin()).collect();
        let general = trapezoid(&xs, &ys);
        let uniform = trapezoid_uniform(0.05, &ys);
        assert!((general - uniform).abs() < 1.0e-12);
    }

    #[test]
    fn erfc_matches_reference_values() {
        // erfc(0) = 1, erfc(1) = 0.15729920705..., erfc(-1) = 1.84270079...
        assert!((erfc(0.0) - 1.0).abs() < 1.0e-7);
        assert!((erfc(1.0) - 0.157_299_207_050_285).abs() < 1.0e-7);
        assert!((erfc(-1.0) - 1.842_700_792_949_715).abs() < 1.0e-7);
        assert!(erfc(10.0) < 1.0e-44);
    }

    #[test]
    fn erfcx_stays_finite_where_erfc_underflows() {
        let value = erfcx(40.0);
        assert!(value.is_finite() && value > 0.0);
        // erfcx(x) ~ 1 / (x sqrt(pi)) for large x.
        let asymptote = 1.0 / (40.0 * std::f64::consts::PI.sqrt());
        assert!((value - asymptote).abs() / asymptote < 1.0e-3);
    }
}
