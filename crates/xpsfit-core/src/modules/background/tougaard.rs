//! Tougaard loss-function convolution background, one to three components.
//!
//! For each point inside the window the inelastic tail is accumulated as a
//! trapezoidal sum over everything above it in energy:
//!
//! `B(E_i) = baseline + sum_j integral K_j(E' - E_i) * (y(E') - baseline) dE'`
//!
//! with `K_j(dE) = B_j * dE / ((C_j - dE^2)^2 + D_j * dE^2)` and the
//! baseline pinned at the last point of the window. Every point integrates
//! over its full remaining tail (O(n^2) over the window).

use super::model::{BackgroundMethod, BackgroundSpec};
use crate::domain::{CoreError, CoreResult, EnergyWindow, Spectrum};
use crate::modules::fit::solver::{SolverConfig, minimize_least_squares};
use serde::{Deserialize, Serialize};

/// One loss-function term. The defaults are the universal-cross-section
/// coefficients commonly used as a starting point for polymers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TougaardComponent {
    pub b: f64,
    pub c: f64,
    pub d: f64,
    /// Loss-energy onset: the kernel is zero below this energy transfer.
    pub t0: f64,
}

impl Default for TougaardComponent {
    fn default() -> Self {
        Self {
            b: 2866.0,
            c: 1643.0,
            d: 1.0,
            t0: 0.0,
        }
    }
}

/// Which coefficients of one component the least-squares refinement may
/// move. `t0` stays where the user put it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TougaardVary {
    pub b: bool,
    pub c: bool,
    pub d: bool,
}

impl Default for TougaardVary {
    fn default() -> Self {
        Self {
            b: true,
            c: true,
            d: true,
        }
    }
}

pub fn tougaard_background(
    spectrum: &Spectrum<'_>,
    spec: &BackgroundSpec,
    components: u8,
) -> CoreResult<Vec<f64>> {
    if !(1..=3).contains(&components) {
        return Err(CoreError::InvalidParameter {
            field: "tougaard_components",
            value: components as f64,
        });
    }

    let (first, last) = spectrum.window_indices(spec.low_energy, spec.high_energy)?;
    let kernels = resolved_components(spec, components);

    let mut background = spectrum.intensity().to_vec();
    fill_tougaard(&mut background, spectrum, first, last, &kernels);
    Ok(background)
}

fn resolved_components(spec: &BackgroundSpec, components: u8) -> Vec<TougaardComponent> {
    (0..components as usize)
        .map(|index| spec.tougaard.get(index).copied().unwrap_or_default())
        .collect()
}

fn loss_kernel(delta: f64, component: &TougaardComponent) -> f64 {
    let shifted = delta - component.t0;
    if shifted <= 0.0 {
        return 0.0;
    }

    let shifted_sq = shifted * shifted;
    let denominator = (component.c - shifted_sq).powi(2) + component.d * shifted_sq;
    if denominator <= 0.0 {
        0.0
    } else {
        component.b * shifted / denominator
    }
}

fn fill_tougaard(
    background: &mut [f64],
    spectrum: &Spectrum<'_>,
    first: usize,
    last: usize,
    kernels: &[TougaardComponent],
) {
    let energy = spectrum.energy();
    let intensity = spectrum.intensity();
    let baseline = intensity[last];

    for point in first..=last {
        let mut value = baseline;
        for component in kernels {
            value += tail_integral(energy, intensity, point, last, baseline, component);
        }
        background[point] = value;
    }
}

/// Trapezoidal sum of `K(E' - E_i) * (y(E') - baseline)` from `point` to
/// the end of the window.
fn tail_integral(
    energy: &[f64],
    intensity: &[f64],
    point: usize,
    last: usize,
    baseline: f64,
    component: &TougaardComponent,
) -> f64 {
    let mut sum = 0.0;
    let origin = energy[point];
    let mut left = loss_kernel(0.0, component) * (intensity[point] - baseline);
    for index in (point + 1)..=last {
        let right = loss_kernel(energy[index] - origin, component) * (intensity[index] - baseline);
        sum += 0.5 * (left + right) * (energy[index] - energy[index - 1]);
        left = right;
    }
    sum
}

/// Least-squares refinement of the free `{B, C, D}` coefficients against
/// the data inside `fit_window`, reusing the forward convolution as the
/// residual model. Returns the refined components without touching `spec`.
pub fn fit_tougaard(
    spectrum: &Spectrum<'_>,
    spec: &BackgroundSpec,
    fit_window: EnergyWindow,
    vary: &[TougaardVary],
    config: &SolverConfig,
) -> CoreResult<Vec<TougaardComponent>> {
    let BackgroundMethod::Tougaard { components } = spec.method else {
        return Err(CoreError::InvalidParameter {
            field: "background_method",
            value: 0.0,
        });
    };
    if !(1..=3).contains(&components) {
        return Err(CoreError::InvalidParameter {
            field: "tougaard_components",
            value: components as f64,
        });
    }

    let (window_first, window_last) = spectrum.window_indices(spec.low_energy, spec.high_energy)?;
    let (fit_first, fit_last) = spectrum.window_indices(fit_window.low, fit_window.high)?;

    let base = resolved_components(spec, components);

    // Pack the free coefficients into a flat parameter vector.
    #[derive(Clone, Copy)]
    enum Coefficient {
        B,
        C,
        D,
    }
    let mut layout: Vec<(usize, Coefficient)> = Vec::new();
    let mut initial: Vec<f64> = Vec::new();
    let mut bounds: Vec<(f64, f64)> = Vec::new();
    for (index, component) in base.iter().enumerate() {
        let flags = vary.get(index).copied().unwrap_or_default();
        if flags.b {
            layout.push((index, Coefficient::B));
            initial.push(component.b);
            bounds.push((0.0, f64::INFINITY));
        }
        if flags.c {
            layout.push((index, Coefficient::C));
            initial.push(component.c);
            bounds.push((1.0e-6, f64::INFINITY));
        }
        if flags.d {
            layout.push((index, Coefficient::D));
            initial.push(component.d);
            bounds.push((0.0, f64::INFINITY));
        }
    }

    let intensity = spectrum.intensity();
    let mut scratch = vec![0.0; spectrum.len()];
    let mut candidates = base.clone();

    let outcome = minimize_least_squares(
        |params: &[f64], out: &mut Vec<f64>| {
            candidates.copy_from_slice(&base);
            for (&value, &(component, coefficient)) in params.iter().zip(&layout) {
                match coefficient {
                    Coefficient::B => candidates[component].b = value,
                    Coefficient::C => candidates[component].c = value,
                    Coefficient::D => candidates[component].d = value,
                }
            }

            scratch.copy_from_slice(intensity);
            fill_tougaard(&mut scratch, spectrum, window_first, window_last, &candidates);

            out.clear();
            for index in fit_first..=fit_last {
                out.push(intensity[index] - scratch[index]);
            }
        },
        &initial,
        &bounds,
        config,
    );

    tracing::debug!(
        nfev = outcome.nfev,
        cost = outcome.cost,
        "tougaard coefficient refinement finished"
    );

    let mut refined = base;
    for (&value, &(component, coefficient)) in outcome.params.iter().zip(&layout) {
        match coefficient {
            Coefficient::B => refined[component].b = value,
            Coefficient::C => refined[component].c = value,
            Coefficient::D => refined[component].d = value,
        }
    }
    Ok(refined)
}
