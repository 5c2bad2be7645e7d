//! Line-shape evaluation and the height/area parameterization bridge.
//!
//! Grid peaks express their width as a FWHM regardless of shape;
//! [`PeakProfile`] derives each shape's native widths from it. The free
//! functions at the bottom evaluate single shapes with their native
//! parameters for callers that do not hold a [`Peak`].

use crate::domain::{CoreError, CoreResult, Peak, PeakShape};
use crate::numerics::{FWHM_TO_SIGMA, erfc, erfcx};
use std::f64::consts::{LN_2, PI, SQRT_2};

const FOUR_LN2: f64 = 4.0 * LN_2;

/// Half-width of the Gaussian convolution kernel, in units of sigma. The
/// Gaussian mass outside +-8 sigma is below 1e-15.
const KERNEL_HALF_WIDTH_SIGMAS: f64 = 8.0;
const KERNEL_POINTS: usize = 257;

/// Half-width of the numerical-area window, in units of FWHM. Wide enough
/// that the slowest tails in the family contribute below the round-trip
/// tolerance.
const AREA_HALF_WIDTH_FWHMS: f64 = 50.0;
const AREA_POINTS: usize = 20_001;

fn require_positive(field: &'static str, value: f64) -> CoreResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(CoreError::InvalidParameter { field, value })
    }
}

fn mix_fraction(lg_ratio: f64) -> f64 {
    (lg_ratio / 100.0).clamp(0.0, 1.0)
}

/// Gaussian-Lorentzian product, unit height, `u = (x - center) / fwhm`.
fn gl_profile(u: f64, mix: f64) -> f64 {
    let quad = 4.0 * u * u;
    (-FOUR_LN2 * (1.0 - mix) * u * u).exp() / (1.0 + mix * quad)
}

/// Gaussian-Lorentzian sum, unit height.
fn sgl_profile(u: f64, mix: f64) -> f64 {
    let quad = 4.0 * u * u;
    mix / (1.0 + quad) + (1.0 - mix) * (-FOUR_LN2 * u * u).exp()
}

/// Unit-area Gaussian density.
fn gaussian_density(dx: f64, sigma: f64) -> f64 {
    let u = dx / sigma;
    (-0.5 * u * u).exp() / (sigma * (2.0 * PI).sqrt())
}

/// Unit-area Lorentzian density with half-width `gamma`.
fn lorentzian_density(dx: f64, gamma: f64) -> f64 {
    (gamma / PI) / (dx * dx + gamma * gamma)
}

fn pseudo_voigt_density(dx: f64, sigma: f64, mix: f64) -> f64 {
    (1.0 - mix) * gaussian_density(dx, sigma) + mix * lorentzian_density(dx, sigma)
}

/// Voigt density with the Lorentzian width expressed as a fraction of the
/// Gaussian sigma. A vanishing fraction collapses to the pure Gaussian,
/// which the convolution grid cannot resolve on its own.
fn voigt_area_lg_density(dx: f64, gauss_sigma: f64, mix: f64) -> f64 {
    if mix <= 1.0e-6 {
        gaussian_density(dx, gauss_sigma)
    } else {
        voigt_density(dx, gauss_sigma, gauss_sigma * mix)
    }
}

/// Gaussian (+) Lorentzian convolution, evaluated by trapezoidal quadrature
/// over a truncated Gaussian kernel. Unit area up to kernel truncation.
fn voigt_density(dx: f64, sigma: f64, gamma: f64) -> f64 {
    let half_width = KERNEL_HALF_WIDTH_SIGMAS * sigma;
    let step = 2.0 * half_width / ((KERNEL_POINTS - 1) as f64);

    let mut sum = 0.0;
    for index in 0..KERNEL_POINTS {
        let t = -half_width + step * index as f64;
        let weight = if index == 0 || index == KERNEL_POINTS - 1 {
            0.5
        } else {
            1.0
        };
        sum += weight * gaussian_density(t, sigma) * lorentzian_density(dx - t, gamma);
    }

    sum * step
}

/// Asymmetric Lorentzian, unit height at center: the Lorentzian base is
/// raised to a side-dependent exponent, `gamma` below center and `sigma`
/// above.
fn la_profile(dx: f64, fwhm: f64, sigma: f64, gamma: f64) -> f64 {
    let u = dx / fwhm;
    let base = 1.0 / (1.0 + 4.0 * u * u);
    let exponent = if dx < 0.0 { gamma } else { sigma };
    base.powf(exponent)
}

/// Area under the unit-height asymmetric Lorentzian. Arbitrary exponents
/// admit no closed form, so this integrates a wide truncated window.
fn la_unit_area(fwhm: f64, sigma: f64, gamma: f64) -> f64 {
    let half_width = AREA_HALF_WIDTH_FWHMS * fwhm;
    let step = 2.0 * half_width / ((AREA_POINTS - 1) as f64);

    let mut sum = 0.0;
    for index in 0..AREA_POINTS {
        let dx = -half_width + step * index as f64;
        let weight = if index == 0 || index == AREA_POINTS - 1 {
            0.5
        } else {
            1.0
        };
        sum += weight * la_profile(dx, fwhm, sigma, gamma);
    }

    sum * step
}

/// Asymmetric Lorentzian convolved with a unit-area Gaussian of width
/// `broadening_sigma`.
fn la_gauss_profile(dx: f64, fwhm: f64, sigma: f64, gamma: f64, broadening_sigma: f64) -> f64 {
    if broadening_sigma <= 0.0 {
        return la_profile(dx, fwhm, sigma, gamma);
    }

    let half_width = KERNEL_HALF_WIDTH_SIGMAS * broadening_sigma;
    let step = 2.0 * half_width / ((KERNEL_POINTS - 1) as f64);

    let mut sum = 0.0;
    for index in 0..KERNEL_POINTS {
        let t = -half_width + step * index as f64;
        let weight = if index == 0 || index == KERNEL_POINTS - 1 {
            0.5
        } else {
            1.0
        };
        sum += weight * gaussian_density(t, broadening_sigma) * la_profile(dx - t, fwhm, sigma, gamma);
    }

    sum * step
}

/// Exponentially modified Gaussian density, unit area, tail toward higher
/// energy. Evaluated through the scaled complement `erfcx` so the Gaussian
/// flank stays finite where plain `erfc` underflows.
fn emg_density(dx: f64, sigma: f64, rate: f64) -> f64 {
    let z = (rate * sigma - dx / sigma) / SQRT_2;
    if z < -5.0 {
        // Deep exponential tail: erfc(z) has saturated at 2.
        let exponent = 0.5 * rate * rate * sigma * sigma - rate * dx;
        if exponent < -700.0 {
            0.0
        } else {
            rate * exponent.exp()
        }
    } else {
        let u = dx / sigma;
        0.5 * rate * (-0.5 * u * u).exp() * erfcx(z)
    }
}

/// Area under the unit-height Gaussian-Lorentzian product.
///
/// The product integrates in closed form through `erfc`; the asymptotic
/// branch covers the near-pure-Gaussian corner where the exponential factor
/// would overflow.
fn gl_unit_area(fwhm: f64, mix: f64) -> f64 {
    if mix <= 0.0 {
        return 0.5 * fwhm * (PI / LN_2).sqrt();
    }
    if mix >= 1.0 {
        return 0.5 * PI * fwhm;
    }

    let gauss_coeff = FOUR_LN2 * (1.0 - mix);
    let lorentz_coeff = 4.0 * mix;
    let ratio = gauss_coeff / lorentz_coeff;
    if ratio > 650.0 {
        fwhm * (PI / gauss_coeff).sqrt() * (1.0 - 0.5 / ratio)
    } else {
        fwhm * (PI / lorentz_coeff.sqrt()) * ratio.exp() * erfc(ratio.sqrt())
    }
}

fn sgl_unit_area(fwhm: f64, mix: f64) -> f64 {
    fwhm * (mix * 0.5 * PI + (1.0 - mix) * 0.5 * (PI / LN_2).sqrt())
}

/// One peak's resolved evaluation state: shape dispatch, native widths, and
/// the amplitude normalization are settled here once, so per-point
/// evaluation stays branch-light inside solver loops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakProfile {
    shape: PeakShape,
    center: f64,
    amplitude: f64,
    fwhm: f64,
    mix: f64,
    sigma: f64,
    gamma: f64,
    /// Multiplies the raw shape kernel so that `amplitude` means what the
    /// shape declares (height or area).
    scale: f64,
}

impl PeakProfile {
    pub fn from_peak(peak: &Peak) -> CoreResult<Self> {
        let amplitude = if peak.shape.amplitude_is_area() {
            peak.area
        } else {
            peak.height
        };
        Self::new(
            peak.shape,
            peak.position,
            amplitude,
            peak.fwhm,
            peak.lg_ratio,
            peak.sigma,
            peak.gamma,
        )
    }

    pub fn new(
        shape: PeakShape,
        center: f64,
        amplitude: f64,
        fwhm: f64,
        lg_ratio: f64,
        sigma: f64,
        gamma: f64,
    ) -> CoreResult<Self> {
        let fwhm = require_positive("fwhm", fwhm)?;
        let mix = mix_fraction(lg_ratio);

        match shape {
            PeakShape::Voigt | PeakShape::ExpGauss => {
                require_positive("gamma", gamma)?;
            }
            PeakShape::La | PeakShape::LaXG => {
                require_positive("sigma", sigma)?;
                require_positive("gamma", gamma)?;
            }
            PeakShape::Gl | PeakShape::Sgl | PeakShape::VoigtAreaLg | PeakShape::PseudoVoigt => {}
        }

        let scale = match shape {
            PeakShape::Gl | PeakShape::Sgl | PeakShape::PseudoVoigt | PeakShape::VoigtAreaLg => 1.0,
            PeakShape::Voigt => {
                let gauss_sigma = fwhm * FWHM_TO_SIGMA;
                1.0 / voigt_density(0.0, gauss_sigma, gamma)
            }
            PeakShape::La => 1.0 / la_unit_area(fwhm, sigma, gamma),
            PeakShape::LaXG => 1.0 / la_unit_area(fwhm, sigma, gamma),
            PeakShape::ExpGauss => {
                let gauss_sigma = fwhm * FWHM_TO_SIGMA;
                let rate = 1.0 / gamma;
                1.0 / emg_density(0.0, gauss_sigma, rate)
            }
        };

        Ok(Self {
            shape,
            center,
            amplitude,
            fwhm,
            mix,
            sigma,
            gamma,
            scale,
        })
    }

    pub fn center(&self) -> f64 {
        self.center
    }

    /// Intensity contribution at energy `x`.
    pub fn intensity_at(&self, x: f64) -> f64 {
        let dx = x - self.center;
        let raw = match self.shape {
            PeakShape::Gl => gl_profile(dx / self.fwhm, self.mix),
            PeakShape::Sgl => sgl_profile(dx / self.fwhm, self.mix),
            PeakShape::PseudoVoigt => {
                pseudo_voigt_density(dx, self.fwhm * FWHM_TO_SIGMA, self.mix)
            }
            PeakShape::Voigt => voigt_density(dx, self.fwhm * FWHM_TO_SIGMA, self.gamma),
            PeakShape::VoigtAreaLg => {
                voigt_area_lg_density(dx, self.fwhm * FWHM_TO_SIGMA, self.mix)
            }
            PeakShape::La => la_profile(dx, self.fwhm, self.sigma, self.gamma),
            PeakShape::LaXG => la_gauss_profile(
                dx,
                self.fwhm,
                self.sigma,
                self.gamma,
                self.fwhm * self.mix * FWHM_TO_SIGMA,
            ),
            PeakShape::ExpGauss => {
                emg_density(dx, self.fwhm * FWHM_TO_SIGMA, 1.0 / self.gamma)
            }
        };

        self.amplitude * self.scale * raw
    }
}

/// Area of the unit-height profile: the single factor that converts between
/// the height and area parameterizations of every shape. Multiplying a
/// height by it yields the area; dividing an area by it yields the height.
pub fn height_to_area_factor(
    shape: PeakShape,
    fwhm: f64,
    lg_ratio: f64,
    sigma: f64,
    gamma: f64,
) -> CoreResult<f64> {
    let fwhm = require_positive("fwhm", fwhm)?;
    let mix = mix_fraction(lg_ratio);

    match shape {
        PeakShape::Gl => Ok(gl_unit_area(fwhm, mix)),
        PeakShape::Sgl => Ok(sgl_unit_area(fwhm, mix)),
        PeakShape::PseudoVoigt => {
            let shared_sigma = fwhm * FWHM_TO_SIGMA;
            let center_density = pseudo_voigt_density(0.0, shared_sigma, mix);
            Ok(1.0 / center_density)
        }
        PeakShape::Voigt => {
            let gamma = require_positive("gamma", gamma)?;
            let gauss_sigma = fwhm * FWHM_TO_SIGMA;
            Ok(1.0 / voigt_density(0.0, gauss_sigma, gamma))
        }
        PeakShape::VoigtAreaLg => {
            let gauss_sigma = fwhm * FWHM_TO_SIGMA;
            Ok(1.0 / voigt_area_lg_density(0.0, gauss_sigma, mix))
        }
        PeakShape::La => {
            let sigma = require_positive("sigma", sigma)?;
            let gamma = require_positive("gamma", gamma)?;
            Ok(la_unit_area(fwhm, sigma, gamma))
        }
        PeakShape::LaXG => {
            let sigma = require_positive("sigma", sigma)?;
            let gamma = require_positive("gamma", gamma)?;
            let broadening_sigma = fwhm * mix * FWHM_TO_SIGMA;
            let center = la_gauss_profile(0.0, fwhm, sigma, gamma, broadening_sigma);
            Ok(la_unit_area(fwhm, sigma, gamma) / center)
        }
        PeakShape::ExpGauss => {
            let gamma = require_positive("gamma", gamma)?;
            let gauss_sigma = fwhm * FWHM_TO_SIGMA;
            Ok(1.0 / emg_density(0.0, gauss_sigma, 1.0 / gamma))
        }
    }
}

pub fn area_from_height(
    shape: PeakShape,
    height: f64,
    fwhm: f64,
    lg_ratio: f64,
    sigma: f64,
    gamma: f64,
) -> CoreResult<f64> {
    Ok(height * height_to_area_factor(shape, fwhm, lg_ratio, sigma, gamma)?)
}

pub fn height_from_area(
    shape: PeakShape,
    area: f64,
    fwhm: f64,
    lg_ratio: f64,
    sigma: f64,
    gamma: f64,
) -> CoreResult<f64> {
    Ok(area / height_to_area_factor(shape, fwhm, lg_ratio, sigma, gamma)?)
}

/// Gaussian-Lorentzian product at `x`: both factors share `fwhm`, and
/// `lg_fraction` (0-100) moves the mixing inside each factor.
pub fn gl(x: f64, center: f64, fwhm: f64, lg_fraction: f64, height: f64) -> CoreResult<f64> {
    let fwhm = require_positive("fwhm", fwhm)?;
    Ok(height * gl_profile((x - center) / fwhm, mix_fraction(lg_fraction)))
}

/// Gaussian-Lorentzian sum at `x`: pure components weighted by
/// `lg_fraction / 100`.
pub fn sgl(x: f64, center: f64, fwhm: f64, lg_fraction: f64, height: f64) -> CoreResult<f64> {
    let fwhm = require_positive("fwhm", fwhm)?;
    Ok(height * sgl_profile((x - center) / fwhm, mix_fraction(lg_fraction)))
}

/// Area-parameterized pseudo-Voigt at `x`: a linear combination of
/// unit-area Gaussian and Lorentzian densities sharing width `sigma`.
pub fn pseudo_voigt(x: f64, center: f64, area: f64, sigma: f64, lg_fraction: f64) -> CoreResult<f64> {
    let sigma = require_positive("sigma", sigma)?;
    Ok(area * pseudo_voigt_density(x - center, sigma, mix_fraction(lg_fraction)))
}

/// Height-parameterized Voigt at `x`: the true Gaussian (+) Lorentzian
/// convolution. The height at center has no closed form, so the
/// normalization evaluates the convolution at `x = center`.
pub fn voigt(x: f64, center: f64, sigma: f64, gamma: f64, height: f64) -> CoreResult<f64> {
    let sigma = require_positive("sigma", sigma)?;
    let gamma = require_positive("gamma", gamma)?;
    Ok(height * voigt_density(x - center, sigma, gamma) / voigt_density(0.0, sigma, gamma))
}

/// Area-parameterized asymmetric Lorentzian at `x`: tail exponent `gamma`
/// below center, `sigma` above.
pub fn la(x: f64, center: f64, area: f64, fwhm: f64, sigma: f64, gamma: f64) -> CoreResult<f64> {
    let fwhm = require_positive("fwhm", fwhm)?;
    let sigma = require_positive("sigma", sigma)?;
    let gamma = require_positive("gamma", gamma)?;
    Ok(area * la_profile(x - center, fwhm, sigma, gamma) / la_unit_area(fwhm, sigma, gamma))
}
