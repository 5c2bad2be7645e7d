//! Bounded nonlinear least-squares drivers.
//!
//! Levenberg-Marquardt with a forward-difference Jacobian and damped normal
//! equations is the default; a Nelder-Mead simplex is available for models
//! whose residuals are too rough for derivative steps. Both respect simple
//! box bounds by clamping trial points and stop on the function-evaluation
//! budget.

use crate::numerics::{DenseMatrix, lu_solve};
use serde::{Deserialize, Serialize};

const LAMBDA_INITIAL: f64 = 1.0e-3;
const LAMBDA_UP: f64 = 10.0;
const LAMBDA_DOWN: f64 = 0.1;
const LAMBDA_CEILING: f64 = 1.0e10;
const JACOBIAN_RELATIVE_STEP: f64 = 1.0e-7;
const JACOBIAN_STEP_FLOOR: f64 = 1.0e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SolverMethod {
    #[default]
    LevenbergMarquardt,
    NelderMead,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub method: SolverMethod,
    /// Hard cap on residual-function evaluations.
    pub max_function_evals: usize,
    /// Relative cost-decrease threshold that counts as convergence.
    pub tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            method: SolverMethod::default(),
            max_function_evals: 2000,
            tolerance: 1.0e-10,
        }
    }
}

/// Terminal state of one minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub params: Vec<f64>,
    /// Sum of squared residuals at `params`.
    pub cost: f64,
    /// Residual-function evaluations actually spent.
    pub nfev: usize,
    pub converged: bool,
}

/// Minimize the squared norm of `residual_fn` over box-bounded parameters.
///
/// `residual_fn` fills its output vector with one residual per data point;
/// `bounds` pairs are `(min, max)` per parameter and may be infinite. With
/// an empty parameter vector the residuals are evaluated once and returned
/// as-is.
pub fn minimize_least_squares<F>(
    residual_fn: F,
    initial: &[f64],
    bounds: &[(f64, f64)],
    config: &SolverConfig,
) -> SolveOutcome
where
    F: FnMut(&[f64], &mut Vec<f64>),
{
    match config.method {
        SolverMethod::LevenbergMarquardt => {
            run_levenberg_marquardt(residual_fn, initial, bounds, config)
        }
        SolverMethod::NelderMead => run_nelder_mead(residual_fn, initial, bounds, config),
    }
}

fn clamp_into_bounds(params: &mut [f64], bounds: &[(f64, f64)]) {
    for (param, &(low, high)) in params.iter_mut().zip(bounds) {
        *param = param.clamp(low, high);
    }
}

fn sum_of_squares(residuals: &[f64]) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}

fn run_levenberg_marquardt<F>(
    mut residual_fn: F,
    initial: &[f64],
    bounds: &[(f64, f64)],
    config: &SolverConfig,
) -> SolveOutcome
where
    F: FnMut(&[f64], &mut Vec<f64>),
{
    let budget = config.max_function_evals.max(1);
    let p = initial.len();

    let mut params = initial.to_vec();
    clamp_into_bounds(&mut params, bounds);

    let mut residuals = Vec::new();
    residual_fn(&params, &mut residuals);
    let mut nfev = 1;
    let mut cost = sum_of_squares(&residuals);
    let n = residuals.len();

    if p == 0 || n == 0 {
        return SolveOutcome {
            params,
            cost,
            nfev,
            converged: true,
        };
    }

    let mut lambda = LAMBDA_INITIAL;
    let mut converged = false;
    let mut jacobian = vec![0.0; n * p];
    let mut trial_residuals = Vec::with_capacity(n);
    let mut trial = vec![0.0; p];

    'outer: while nfev < budget {
        // Forward-difference Jacobian of the residual vector.
        for col in 0..p {
            if nfev >= budget {
                break 'outer;
            }

            let step = (params[col].abs() * JACOBIAN_RELATIVE_STEP).max(JACOBIAN_STEP_FLOOR);
            trial.copy_from_slice(&params);
            trial[col] = (params[col] + step).min(bounds[col].1);
            let mut actual = trial[col] - params[col];
            if actual == 0.0 {
                // Pinned against the upper bound: step downward instead.
                trial[col] = (params[col] - step).max(bounds[col].0);
                actual = trial[col] - params[col];
            }
            if actual == 0.0 {
                // Degenerate bounds: the column stays zero.
                for row in 0..n {
                    jacobian[row * p + col] = 0.0;
                }
                continue;
            }

            residual_fn(&trial, &mut trial_residuals);
            nfev += 1;
            for row in 0..n {
                jacobian[row * p + col] = (trial_residuals[row] - residuals[row]) / actual;
            }
        }

        // Normal equations J^T J and gradient J^T r.
        let mut jtj = DenseMatrix::zeros(p, p);
        let mut jtr = vec![0.0; p];
        for row in 0..n {
            let residual = residuals[row];
            for a in 0..p {
                let ja = jacobian[row * p + a];
                jtr[a] += ja * residual;
                for b in a..p {
                    let updated = jtj[(a, b)] + ja * jacobian[row * p + b];
                    jtj[(a, b)] = updated;
                }
            }
        }
        for a in 0..p {
            for b in 0..a {
                jtj[(a, b)] = jtj[(b, a)];
            }
        }

        // Damped step loop: retry with stiffer damping until the cost drops.
        loop {
            if nfev >= budget {
                break 'outer;
            }

            let mut damped = jtj.clone();
            for index in 0..p {
                damped[(index, index)] = jtj[(index, index)] * (1.0 + lambda) + 1.0e-12;
            }

            let delta = match lu_solve(&damped, &jtr) {
                Ok(delta) => delta,
                Err(_) => {
                    lambda *= LAMBDA_UP;
                    if lambda > LAMBDA_CEILING {
                        break 'outer;
                    }
                    continue;
                }
            };

            for index in 0..p {
                trial[index] = params[index] - delta[index];
            }
            clamp_into_bounds(&mut trial, bounds);

            residual_fn(&trial, &mut trial_residuals);
            nfev += 1;
            let trial_cost = sum_of_squares(&trial_residuals);

            if trial_cost < cost {
                let relative_drop = (cost - trial_cost) / cost.max(f64::MIN_POSITIVE);
                params.copy_from_slice(&trial);
                std::mem::swap(&mut residuals, &mut trial_residuals);
                cost = trial_cost;
                lambda = (lambda * LAMBDA_DOWN).max(1.0e-12);

                if relative_drop < config.tolerance {
                    converged = true;
                    break 'outer;
                }
                break;
            }

            lambda *= LAMBDA_UP;
            if lambda > LAMBDA_CEILING {
                break 'outer;
            }
        }
    }

    SolveOutcome {
        params,
        cost,
        nfev,
        converged,
    }
}

fn run_nelder_mead<F>(
    mut residual_fn: F,
    initial: &[f64],
    bounds: &[(f64, f64)],
    config: &SolverConfig,
) -> SolveOutcome
where
    F: FnMut(&[f64], &mut Vec<f64>),
{
    const REFLECTION: f64 = 1.0;
    const EXPANSION: f64 = 2.0;
    const CONTRACTION: f64 = 0.5;
    const SHRINK: f64 = 0.5;

    let budget = config.max_function_evals.max(1);
    let p = initial.len();

    let mut residuals = Vec::new();
    let mut nfev = 0;
    let mut evaluate = |point: &[f64], residuals: &mut Vec<f64>, nfev: &mut usize| -> f64 {
        residual_fn(point, residuals);
        *nfev += 1;
        sum_of_squares(residuals)
    };

    let mut origin = initial.to_vec();
    clamp_into_bounds(&mut origin, bounds);
    let origin_cost = evaluate(&origin, &mut residuals, &mut nfev);

    if p == 0 {
        return SolveOutcome {
            params: origin,
            cost: origin_cost,
            nfev,
            converged: true,
        };
    }

    // Initial simplex: the start point plus one per-coordinate step.
    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(p + 1);
    simplex.push((origin.clone(), origin_cost));
    for index in 0..p {
        if nfev >= budget {
            break;
        }
        let mut vertex = origin.clone();
        let step = (vertex[index].abs() * 0.05).max(1.0e-4);
        vertex[index] += step;
        clamp_into_bounds(&mut vertex, bounds);
        if vertex[index] == origin[index] {
            vertex[index] = (origin[index] - step).max(bounds[index].0);
        }
        let cost = evaluate(&vertex, &mut residuals, &mut nfev);
        simplex.push((vertex, cost));
    }

    let mut converged = false;
    while simplex.len() == p + 1 && nfev < budget {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        let best_cost = simplex[0].1;
        let worst_cost = simplex[p].1;
        if (worst_cost - best_cost) / best_cost.max(f64::MIN_POSITIVE) < config.tolerance {
            converged = true;
            break;
        }

        // Centroid of every vertex except the worst.
        let mut centroid = vec![0.0; p];
        for (vertex, _) in &simplex[..p] {
            for (sum, &coord) in centroid.iter_mut().zip(vertex) {
                *sum += coord;
            }
        }
        for coord in &mut centroid {
            *coord /= p as f64;
        }

        let blend = |scale: f64, bounds: &[(f64, f64)], centroid: &[f64], worst: &[f64]| {
            let mut point: Vec<f64> = centroid
                .iter()
                .zip(worst)
                .map(|(&c, &w)| c + scale * (c - w))
                .collect();
            clamp_into_bounds(&mut point, bounds);
            point
        };

        let worst_vertex = simplex[p].0.clone();
        let reflected = blend(REFLECTION, bounds, &centroid, &worst_vertex);
        let reflected_cost = evaluate(&reflected, &mut residuals, &mut nfev);

        if reflected_cost < simplex[0].1 {
            if nfev < budget {
                let expanded = blend(EXPANSION, bounds, &centroid, &worst_vertex);
                let expanded_cost = evaluate(&expanded, &mut residuals, &mut nfev);
                simplex[p] = if expanded_cost < reflected_cost {
                    (expanded, expanded_cost)
                } else {
                    (reflected, reflected_cost)
                };
            } else {
                simplex[p] = (reflected, reflected_cost);
            }
            continue;
        }

        if reflected_cost < simplex[p - 1].1 {
            simplex[p] = (reflected, reflected_cost);
            continue;
        }

        if nfev >= budget {
            break;
        }
        let contracted = blend(-CONTRACTION, bounds, &centroid, &worst_vertex);
        let contracted_cost = evaluate(&contracted, &mut residuals, &mut nfev);
        if contracted_cost < simplex[p].1 {
            simplex[p] = (contracted, contracted_cost);
            continue;
        }

        // Shrink toward the best vertex.
        let best_vertex = simplex[0].0.clone();
        for (vertex, cost) in simplex.iter_mut().skip(1) {
            for (coord, &anchor) in vertex.iter_mut().zip(&best_vertex) {
                *coord = anchor + SHRINK * (*coord - anchor);
            }
            clamp_into_bounds(vertex, bounds);
            if nfev >= budget {
                break;
            }
            *cost = evaluate(vertex, &mut residuals, &mut nfev);
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    let (params, cost) = simplex.swap_remove(0);
    SolveOutcome {
        params,
        cost,
        nfev,
        converged,
    }
}
