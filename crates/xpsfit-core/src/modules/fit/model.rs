//! Composite-model assembly, optimization, and goodness-of-fit statistics.
//!
//! A fit walks `Building -> Optimizing -> Done` (or `Failed`): constraints
//! resolve to solver bounds against current sibling values, active peaks
//! sum into one composite model over `raw - background` inside the window,
//! the bounded solver runs against its evaluation budget, and resolved
//! values are written back all-or-nothing.

use super::solver::{SolverConfig, minimize_least_squares};
use crate::domain::{
    CoreError, CoreResult, EnergyWindow, ParamKind, Peak, PeakCollection, PeakId, PeakShape,
    Spectrum,
};
use crate::modules::constraints::{ResolvedBounds, parse_constraint, resolve_constraint};
use crate::modules::shapes::{PeakProfile, area_from_height, height_from_area};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Residual magnitude used to reject solver excursions that break a shape's
/// parameter domain (for example a width driven to zero).
const REJECTED_STEP_RESIDUAL: f64 = 1.0e30;

/// Poisson floor for the chi-square and RSD denominators.
const COUNT_FLOOR: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FitPhase {
    Idle,
    Building,
    Optimizing,
    Done,
    Failed,
}

impl FitPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Building => "building",
            Self::Optimizing => "optimizing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl Display for FitPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitStatistics {
    pub r_squared: f64,
    pub chi_square: f64,
    pub reduced_chi_square: f64,
    /// Residual standard deviation, weighted by sqrt of the raw counts.
    pub residual_std_dev: f64,
    pub n_function_evals: usize,
    pub n_points: usize,
    pub n_varied: usize,
}

/// Snapshot of one peak's resolved values after a successful fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPeak {
    pub id: PeakId,
    pub label: String,
    pub shape: PeakShape,
    pub position: f64,
    pub height: f64,
    pub fwhm: f64,
    pub lg_ratio: f64,
    pub area: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub statistics: FitStatistics,
    pub peaks: Vec<ResolvedPeak>,
    /// Background plus composite model inside the fit window, raw intensity
    /// outside; freshly allocated, never aliasing the input.
    pub fitted_curve: Vec<f64>,
}

/// The four solver slots each peak can contribute. `Mix` is the L/G ratio
/// where the shape uses one; shapes with native sigma/gamma widths hold
/// those fixed during the fit.
const SLOT_COUNT: usize = 4;
const SLOT_POSITION: usize = 0;
const SLOT_AMPLITUDE: usize = 1;
const SLOT_WIDTH: usize = 2;
const SLOT_MIX: usize = 3;

fn uses_mix(shape: PeakShape) -> bool {
    matches!(
        shape,
        PeakShape::Gl
            | PeakShape::Sgl
            | PeakShape::PseudoVoigt
            | PeakShape::VoigtAreaLg
            | PeakShape::LaXG
    )
}

fn slot_param(shape: PeakShape, slot: usize) -> ParamKind {
    match slot {
        SLOT_POSITION => ParamKind::Position,
        SLOT_AMPLITUDE => {
            if shape.amplitude_is_area() {
                ParamKind::Area
            } else {
                ParamKind::Height
            }
        }
        SLOT_WIDTH => ParamKind::Fwhm,
        _ => ParamKind::LgRatio,
    }
}

/// Fit the active peaks against `raw - background` inside `window`.
///
/// On success the resolved values are written back into `peaks` in one
/// step; on any error the collection is left untouched.
pub fn fit(
    spectrum: &Spectrum<'_>,
    background: &[f64],
    window: EnergyWindow,
    peaks: &mut PeakCollection,
    config: &SolverConfig,
) -> CoreResult<FitResult> {
    match fit_inner(spectrum, background, window, peaks, config) {
        Ok(result) => {
            tracing::debug!(
                phase = %FitPhase::Done,
                r_squared = result.statistics.r_squared,
                nfev = result.statistics.n_function_evals,
                "fit finished"
            );
            Ok(result)
        }
        Err(error) => {
            tracing::debug!(phase = %FitPhase::Failed, error = %error, "fit aborted");
            Err(error)
        }
    }
}

fn fit_inner(
    spectrum: &Spectrum<'_>,
    background: &[f64],
    window: EnergyWindow,
    peaks: &mut PeakCollection,
    config: &SolverConfig,
) -> CoreResult<FitResult> {
    if background.len() != spectrum.len() {
        return Err(CoreError::LengthMismatch {
            energy: spectrum.len(),
            intensity: background.len(),
        });
    }
    let (first, last) = spectrum.window_indices(window.low, window.high)?;
    let n_points = last - first + 1;

    tracing::debug!(
        phase = %FitPhase::Building,
        peaks = peaks.len(),
        points = n_points,
        "assembling composite model"
    );

    // Resolve every peak's constraints to bounds against current sibling
    // values, and flatten the varying slots into one parameter vector.
    let peak_list: Vec<Peak> = peaks.iter().cloned().collect();
    let mut slot_values: Vec<[f64; SLOT_COUNT]> = Vec::with_capacity(peak_list.len());
    let mut varying: Vec<(usize, usize)> = Vec::new();
    let mut initial: Vec<f64> = Vec::new();
    let mut bounds: Vec<(f64, f64)> = Vec::new();

    for (peak_index, peak) in peak_list.iter().enumerate() {
        // Fail fast on invalid shape parameters before any optimization.
        PeakProfile::from_peak(peak)?;

        let amplitude = if peak.shape.amplitude_is_area() {
            peak.area
        } else {
            peak.height
        };
        let values = [peak.position, amplitude, peak.fwhm, peak.lg_ratio];

        for slot in 0..SLOT_COUNT {
            if slot == SLOT_MIX && !uses_mix(peak.shape) {
                continue;
            }
            let param = slot_param(peak.shape, slot);
            let current = values[slot];
            let resolved = match peak.constraints.get(param) {
                Some(text) => {
                    resolve_constraint(&parse_constraint(text), param, current, &*peaks)
                }
                None => ResolvedBounds::unconstrained(),
            };

            if resolved.vary {
                initial.push(resolved.clamp(current));
                bounds.push((resolved.min, resolved.max));
                varying.push((peak_index, slot));
            }
        }

        slot_values.push(values);
    }

    let energy = spectrum.energy();
    let raw = spectrum.intensity();

    tracing::debug!(
        phase = %FitPhase::Optimizing,
        varied = varying.len(),
        budget = config.max_function_evals,
        "running bounded least squares"
    );

    let outcome = {
        let mut scratch_values = slot_values.clone();
        let mut profiles: Vec<PeakProfile> = Vec::with_capacity(peak_list.len());
        minimize_least_squares(
            |params: &[f64], out: &mut Vec<f64>| {
                for (k, &(peak_index, slot)) in varying.iter().enumerate() {
                    scratch_values[peak_index][slot] = params[k];
                }

                profiles.clear();
                for (peak_index, peak) in peak_list.iter().enumerate() {
                    let values = scratch_values[peak_index];
                    match PeakProfile::new(
                        peak.shape,
                        values[SLOT_POSITION],
                        values[SLOT_AMPLITUDE],
                        values[SLOT_WIDTH],
                        values[SLOT_MIX],
                        peak.sigma,
                        peak.gamma,
                    ) {
                        Ok(profile) => profiles.push(profile),
                        Err(_) => {
                            out.clear();
                            out.extend(std::iter::repeat_n(REJECTED_STEP_RESIDUAL, n_points));
                            return;
                        }
                    }
                }

                out.clear();
                for index in first..=last {
                    let model: f64 = profiles
                        .iter()
                        .map(|profile| profile.intensity_at(energy[index]))
                        .sum();
                    out.push((raw[index] - background[index]) - model);
                }
            },
            &initial,
            &bounds,
            config,
        )
    };

    // Scatter the optimizer's final parameters back over the slot values.
    let mut final_values = slot_values;
    for (k, &(peak_index, slot)) in varying.iter().enumerate() {
        final_values[peak_index][slot] = outcome.params[k];
    }

    let final_profiles: Vec<PeakProfile> = peak_list
        .iter()
        .enumerate()
        .map(|(peak_index, peak)| {
            let values = final_values[peak_index];
            PeakProfile::new(
                peak.shape,
                values[SLOT_POSITION],
                values[SLOT_AMPLITUDE],
                values[SLOT_WIDTH],
                values[SLOT_MIX],
                peak.sigma,
                peak.gamma,
            )
        })
        .collect::<CoreResult<_>>()?;

    let mut fitted_curve = raw.to_vec();
    for index in first..=last {
        let model: f64 = final_profiles
            .iter()
            .map(|profile| profile.intensity_at(energy[index]))
            .sum();
        fitted_curve[index] = background[index] + model;
    }

    let statistics = compute_statistics(
        &raw[first..=last],
        &fitted_curve[first..=last],
        varying.len(),
        outcome.nfev,
    );

    // All-or-nothing write-back: convert amplitudes on a scratch collection
    // first, commit only when every peak resolved cleanly.
    let mut updated = peaks.clone();
    let mut resolved_peaks = Vec::with_capacity(peak_list.len());
    for (peak_index, peak) in peak_list.iter().enumerate() {
        let values = final_values[peak_index];
        let lg_ratio = if uses_mix(peak.shape) {
            values[SLOT_MIX]
        } else {
            peak.lg_ratio
        };
        let (height, area) = if peak.shape.amplitude_is_area() {
            let height = height_from_area(
                peak.shape,
                values[SLOT_AMPLITUDE],
                values[SLOT_WIDTH],
                lg_ratio,
                peak.sigma,
                peak.gamma,
            )?;
            (height, values[SLOT_AMPLITUDE])
        } else {
            let area = area_from_height(
                peak.shape,
                values[SLOT_AMPLITUDE],
                values[SLOT_WIDTH],
                lg_ratio,
                peak.sigma,
                peak.gamma,
            )?;
            (values[SLOT_AMPLITUDE], area)
        };

        if let Some(target) = updated.get_mut(peak.id) {
            target.position = values[SLOT_POSITION];
            target.fwhm = values[SLOT_WIDTH];
            target.lg_ratio = lg_ratio;
            target.height = height;
            target.area = area;
        }

        resolved_peaks.push(ResolvedPeak {
            id: peak.id,
            label: peak.label.clone(),
            shape: peak.shape,
            position: values[SLOT_POSITION],
            height,
            fwhm: values[SLOT_WIDTH],
            lg_ratio,
            area,
        });
    }
    *peaks = updated;

    Ok(FitResult {
        statistics,
        peaks: resolved_peaks,
        fitted_curve,
    })
}

fn compute_statistics(
    raw: &[f64],
    fitted: &[f64],
    n_varied: usize,
    n_function_evals: usize,
) -> FitStatistics {
    let n = raw.len();
    let mean = raw.iter().sum::<f64>() / n as f64;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    let mut chi_square = 0.0;
    let mut rsd_sum = 0.0;
    for (&observed, &modeled) in raw.iter().zip(fitted) {
        let residual = observed - modeled;
        ss_res += residual * residual;
        let centered = observed - mean;
        ss_tot += centered * centered;
        chi_square += residual * residual / modeled.max(COUNT_FLOOR);
        rsd_sum += residual * residual / observed.max(COUNT_FLOOR);
    }

    let degrees_of_freedom = n.saturating_sub(n_varied).max(1);
    FitStatistics {
        r_squared: 1.0 - ss_res / ss_tot.max(f64::MIN_POSITIVE),
        chi_square,
        reduced_chi_square: chi_square / degrees_of_freedom as f64,
        residual_std_dev: (rsd_sum / n as f64).sqrt(),
        n_function_evals,
        n_points: n,
        n_varied,
    }
}

/// Re-run the single-fit entry point `iterations` times, reseeding each
/// pass from the previous write-back and yielding to `on_iteration` between
/// passes for progress reporting. Strictly sequential.
pub fn fit_sequence<F>(
    spectrum: &Spectrum<'_>,
    background: &[f64],
    window: EnergyWindow,
    peaks: &mut PeakCollection,
    config: &SolverConfig,
    iterations: usize,
    mut on_iteration: F,
) -> CoreResult<FitResult>
where
    F: FnMut(usize, &FitResult),
{
    let iterations = iterations.max(1);
    let mut result = fit(spectrum, background, window, peaks, config)?;
    on_iteration(0, &result);
    for index in 1..iterations {
        result = fit(spectrum, background, window, peaks, config)?;
        on_iteration(index, &result);
    }
    Ok(result)
}
