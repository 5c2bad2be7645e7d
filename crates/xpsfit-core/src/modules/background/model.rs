//! Background estimation over a selected energy window.
//!
//! Every method fills a freshly allocated curve that equals the raw
//! intensity outside the selected window, so subtraction leaves those
//! points untouched. Window validation happens before anything is written:
//! an invalid window returns an error and the caller's previous background
//! survives as-is.

use super::tougaard::{self, TougaardComponent};
use crate::domain::{CoreError, CoreResult, EnergyWindow, Spectrum};
use crate::numerics::linear_ramp;
use serde::{Deserialize, Serialize};

pub const SHIRLEY_TOLERANCE: f64 = 1.0e-6;
pub const SHIRLEY_MAX_ITERATIONS: usize = 100;

/// Fraction of the window replicated at each end before Shirley iteration,
/// stripped again afterward. Stabilizes the boundary area terms.
const SHIRLEY_PADDING_FRACTION: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackgroundMethod {
    Linear,
    Shirley,
    Smart,
    MultiRegionSmart,
    Tougaard { components: u8 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundSpec {
    pub method: BackgroundMethod,
    pub low_energy: f64,
    pub high_energy: f64,
    pub offset_low: f64,
    pub offset_high: f64,
    /// Accepted sub-ranges for the multi-region method; the main window is
    /// used when empty.
    pub regions: Vec<EnergyWindow>,
    /// Loss-function coefficients for the Tougaard methods.
    pub tougaard: Vec<TougaardComponent>,
}

impl BackgroundSpec {
    pub fn new(method: BackgroundMethod, low_energy: f64, high_energy: f64) -> Self {
        Self {
            method,
            low_energy,
            high_energy,
            offset_low: 0.0,
            offset_high: 0.0,
            regions: Vec::new(),
            tougaard: Vec::new(),
        }
    }

    pub fn window(&self) -> EnergyWindow {
        EnergyWindow::new(self.low_energy, self.high_energy)
    }
}

/// Compute the background curve for `spec`, aligned 1:1 with the spectrum.
pub fn compute_background(spectrum: &Spectrum<'_>, spec: &BackgroundSpec) -> CoreResult<Vec<f64>> {
    match spec.method {
        BackgroundMethod::Linear => {
            let (first, last) = spectrum.window_indices(spec.low_energy, spec.high_energy)?;
            let mut background = spectrum.intensity().to_vec();
            fill_linear(&mut background, spectrum, first, last, spec.offset_low, spec.offset_high);
            Ok(background)
        }
        BackgroundMethod::Shirley => {
            let (first, last) = spectrum.window_indices(spec.low_energy, spec.high_energy)?;
            let mut background = spectrum.intensity().to_vec();
            fill_shirley(&mut background, spectrum, first, last, spec.offset_low, spec.offset_high);
            Ok(background)
        }
        BackgroundMethod::Smart => {
            let (first, last) = spectrum.window_indices(spec.low_energy, spec.high_energy)?;
            let mut background = spectrum.intensity().to_vec();
            fill_smart(&mut background, spectrum, first, last, spec.offset_low, spec.offset_high);
            Ok(background)
        }
        BackgroundMethod::MultiRegionSmart => {
            // Validate every region before touching the output so a bad
            // region cannot leave a half-written curve behind.
            let mut spans = Vec::new();
            if spec.regions.is_empty() {
                spans.push(spectrum.window_indices(spec.low_energy, spec.high_energy)?);
            } else {
                for region in &spec.regions {
                    spans.push(spectrum.window_indices(region.low, region.high)?);
                }
            }

            let mut background = spectrum.intensity().to_vec();
            for (first, last) in spans {
                fill_smart(&mut background, spectrum, first, last, spec.offset_low, spec.offset_high);
            }
            Ok(background)
        }
        BackgroundMethod::Tougaard { components } => {
            tougaard::tougaard_background(spectrum, spec, components)
        }
    }
}

/// Recompute only the sub-range touched by an endpoint drag, anchoring at
/// the existing curve's boundary values so the merge stays continuous.
pub fn refresh_smart_background(
    spectrum: &Spectrum<'_>,
    background: &mut [f64],
    window: EnergyWindow,
) -> CoreResult<()> {
    if background.len() != spectrum.len() {
        return Err(CoreError::LengthMismatch {
            energy: spectrum.len(),
            intensity: background.len(),
        });
    }

    let (first, last) = spectrum.window_indices(window.low, window.high)?;
    let anchor_start = background[first];
    let anchor_end = background[last];

    if anchor_start > anchor_end {
        let energy = &spectrum.energy()[first..=last];
        let intensity = &spectrum.intensity()[first..=last];
        let curve = shirley_curve(energy, intensity, anchor_start, anchor_end);
        background[first..=last].copy_from_slice(&curve);
    } else {
        let ramp = linear_ramp(anchor_start, anchor_end, last - first + 1);
        background[first..=last].copy_from_slice(&ramp);
    }

    clamp_to_raw(background, spectrum, first, last);
    Ok(())
}

fn fill_linear(
    background: &mut [f64],
    spectrum: &Spectrum<'_>,
    first: usize,
    last: usize,
    offset_low: f64,
    offset_high: f64,
) {
    let intensity = spectrum.intensity();
    let ramp = linear_ramp(
        intensity[first] + offset_low,
        intensity[last] + offset_high,
        last - first + 1,
    );
    background[first..=last].copy_from_slice(&ramp);
}

fn fill_shirley(
    background: &mut [f64],
    spectrum: &Spectrum<'_>,
    first: usize,
    last: usize,
    offset_low: f64,
    offset_high: f64,
) {
    let energy = &spectrum.energy()[first..=last];
    let intensity = &spectrum.intensity()[first..=last];
    let curve = shirley_curve(
        energy,
        intensity,
        intensity[0] + offset_low,
        intensity[intensity.len() - 1] + offset_high,
    );
    background[first..=last].copy_from_slice(&curve);
}

fn fill_smart(
    background: &mut [f64],
    spectrum: &Spectrum<'_>,
    first: usize,
    last: usize,
    offset_low: f64,
    offset_high: f64,
) {
    let intensity = spectrum.intensity();
    if intensity[first] > intensity[last] {
        fill_shirley(background, spectrum, first, last, offset_low, offset_high);
    } else {
        fill_linear(background, spectrum, first, last, offset_low, offset_high);
    }
    clamp_to_raw(background, spectrum, first, last);
}

/// The background must never cross above the raw data.
fn clamp_to_raw(background: &mut [f64], spectrum: &Spectrum<'_>, first: usize, last: usize) {
    let intensity = spectrum.intensity();
    for index in first..=last {
        background[index] = background[index].min(intensity[index]);
    }
}

/// Iterative self-consistent Shirley background over one window.
///
/// `B[i] = i_end + (i_start - i_end) * A2(i) / (A1(i) + A2(i))` with A1 and
/// A2 the trapezoidal areas of `intensity - B` on either side of `i`,
/// repeated until the largest update falls below [`SHIRLEY_TOLERANCE`] or
/// [`SHIRLEY_MAX_ITERATIONS`] is reached.
fn shirley_curve(energy: &[f64], intensity: &[f64], i_start: f64, i_end: f64) -> Vec<f64> {
    let n = intensity.len();
    if n < 2 {
        return vec![i_end; n];
    }

    // Replicated edge padding, stripped after iteration.
    let pad = ((n as f64 * SHIRLEY_PADDING_FRACTION) as usize).max(1);
    let step_front = energy[1] - energy[0];
    let step_back = energy[n - 1] - energy[n - 2];

    let padded_len = n + 2 * pad;
    let mut padded_energy = Vec::with_capacity(padded_len);
    let mut padded_intensity = Vec::with_capacity(padded_len);
    for index in 0..pad {
        padded_energy.push(energy[0] - step_front * (pad - index) as f64);
        padded_intensity.push(i_start);
    }
    padded_energy.extend_from_slice(energy);
    padded_intensity.extend_from_slice(intensity);
    for index in 0..pad {
        padded_energy.push(energy[n - 1] + step_back * (index + 1) as f64);
        padded_intensity.push(i_end);
    }

    let mut current = vec![i_end; padded_len];
    let mut cumulative = vec![0.0; padded_len];

    for iteration in 0..SHIRLEY_MAX_ITERATIONS {
        // Cumulative trapezoidal area of the residual intensity.
        cumulative[0] = 0.0;
        for index in 1..padded_len {
            let residual_left = padded_intensity[index - 1] - current[index - 1];
            let residual_right = padded_intensity[index] - current[index];
            let width = padded_energy[index] - padded_energy[index - 1];
            cumulative[index] =
                cumulative[index - 1] + 0.5 * (residual_left + residual_right) * width;
        }
        let total = cumulative[padded_len - 1];

        let mut largest_update = 0.0f64;
        for index in 0..padded_len {
            let area_below = cumulative[index];
            let area_above = total - cumulative[index];
            let denominator = area_below + area_above;
            let updated = if denominator.abs() > 0.0 {
                i_end + (i_start - i_end) * (area_above / denominator)
            } else {
                i_end
            };
            largest_update = largest_update.max((updated - current[index]).abs());
            current[index] = updated;
        }

        if largest_update < SHIRLEY_TOLERANCE {
            tracing::debug!(iterations = iteration + 1, "shirley background converged");
            break;
        }
    }

    current[pad..pad + n].to_vec()
}
