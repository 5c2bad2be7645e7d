//! Typed constraint expressions and their resolution to solver bounds.
//!
//! Raw constraint strings are parsed into [`ConstraintExpr`] at the core
//! boundary; numeric code only ever sees resolved `(min, max, vary)`
//! windows.

use crate::domain::{ParamKind, PeakCollection, PeakId};
use serde::{Deserialize, Serialize};

/// Window half-width around a `Fixed` L/G parameter; wider than for the
/// energy-scale parameters.
const FIXED_EPSILON_LG: f64 = 0.5;
const FIXED_EPSILON: f64 = 1.0e-3;

/// Half-width applied to bare numbers, fallback windows, and unresolvable
/// references.
const PERMISSIVE_HALF_WIDTH: f64 = 0.1;

/// Keeps a collapsed window non-degenerate for the solver.
const DEGENERATE_NUDGE: f64 = 1.0e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintOp {
    Add,
    Mul,
}

impl ConstraintOp {
    pub fn apply(self, base: f64, operand: f64) -> f64 {
        match self {
            Self::Add => base + operand,
            Self::Mul => base * operand,
        }
    }

    pub const fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Mul => '*',
        }
    }

    /// Tolerance used when the constraint text does not carry a `#` suffix.
    pub const fn default_tolerance(self) -> f64 {
        match self {
            Self::Add => 0.05,
            Self::Mul => 1.0e-4,
        }
    }
}

/// Semantic form of one constraint string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstraintExpr {
    /// Freeze the parameter inside a hair-width window around its current
    /// value.
    Fixed,
    /// Literal numeric bounds.
    Bounds { min: f64, max: f64 },
    /// Window derived from a sibling peak's current value:
    /// `[op(peer, value - tolerance), op(peer, value + tolerance)]`,
    /// re-evaluated on every fit or drag.
    RefOffset {
        peak: PeakId,
        op: ConstraintOp,
        value: f64,
        tolerance: f64,
    },
    /// Bare number: a permissive window around the stated value.
    Bare { value: f64 },
    /// Unparsable text: a permissive window around the current value.
    Fallback,
}

impl ConstraintExpr {
    pub fn referenced_peak(&self) -> Option<PeakId> {
        match self {
            Self::RefOffset { peak, .. } => Some(*peak),
            _ => None,
        }
    }
}

/// Solver-ready bounds for one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedBounds {
    pub min: f64,
    pub max: f64,
    pub vary: bool,
}

impl ResolvedBounds {
    fn window(center: f64, half_width: f64, vary: bool) -> Self {
        Self {
            min: center - half_width,
            max: center + half_width,
            vary,
        }
    }

    pub fn unconstrained() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            vary: true,
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Lookup of sibling-peak current values during constraint resolution.
pub trait PeerValueLookup {
    fn peak_value(&self, peak: PeakId, param: ParamKind) -> Option<f64>;
}

impl PeerValueLookup for PeakCollection {
    fn peak_value(&self, peak: PeakId, param: ParamKind) -> Option<f64> {
        self.value_of(peak, param)
    }
}

/// Resolve a constraint expression to numeric bounds.
///
/// A cross-peak reference whose target peak (or parameter) does not exist
/// degrades to the permissive window around `current`; nothing here can
/// fail.
pub fn resolve_constraint(
    expr: &ConstraintExpr,
    param: ParamKind,
    current: f64,
    peers: &dyn PeerValueLookup,
) -> ResolvedBounds {
    let mut resolved = match expr {
        ConstraintExpr::Fixed => {
            let epsilon = if param == ParamKind::LgRatio {
                FIXED_EPSILON_LG
            } else {
                FIXED_EPSILON
            };
            ResolvedBounds::window(current, epsilon, false)
        }
        ConstraintExpr::Bounds { min, max } => ResolvedBounds {
            min: *min,
            max: *max,
            vary: true,
        },
        ConstraintExpr::RefOffset {
            peak,
            op,
            value,
            tolerance,
        } => match peers.peak_value(*peak, param) {
            Some(peer) => {
                let first = op.apply(peer, value - tolerance);
                let second = op.apply(peer, value + tolerance);
                ResolvedBounds {
                    min: first.min(second),
                    max: first.max(second),
                    vary: true,
                }
            }
            None => ResolvedBounds::window(current, PERMISSIVE_HALF_WIDTH, true),
        },
        ConstraintExpr::Bare { value } => {
            ResolvedBounds::window(*value, PERMISSIVE_HALF_WIDTH, true)
        }
        ConstraintExpr::Fallback => ResolvedBounds::window(current, PERMISSIVE_HALF_WIDTH, true),
    };

    if resolved.min == resolved.max {
        resolved.max += DEGENERATE_NUDGE;
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::{ConstraintExpr, ConstraintOp, ResolvedBounds, resolve_constraint};
    use crate::domain::{ParamKind, Peak, PeakCollection, PeakId, PeakShape};

    fn peaks_with_a_at(position: f64) -> PeakCollection {
        let mut peaks = PeakCollection::new();
        let mut peak = Peak::new(PeakId::A, PeakShape::Gl);
        peak.position = position;
        peaks.insert(peak);
        peaks
    }

    #[test]
    fn fixed_windows_are_wider_for_the_mixing_ratio() {
        let peers = PeakCollection::new();

        let lg = resolve_constraint(&ConstraintExpr::Fixed, ParamKind::LgRatio, 5.0, &peers);
        assert_eq!((lg.min, lg.max, lg.vary), (4.5, 5.5, false));

        let position = resolve_constraint(&ConstraintExpr::Fixed, ParamKind::Position, 530.0, &peers);
        assert_eq!(
            (position.min, position.max, position.vary),
            (529.999, 530.001, false)
        );
    }

    #[test]
    fn reference_windows_apply_the_operator_around_the_peer_value() {
        let peers = peaks_with_a_at(10.0);
        let expr = ConstraintExpr::RefOffset {
            peak: PeakId::A,
            op: ConstraintOp::Add,
            value: 1.5,
            tolerance: 0.5,
        };

        let resolved = resolve_constraint(&expr, ParamKind::Position, 11.4, &peers);
        assert!((resolved.min - 11.0).abs() < 1.0e-12);
        assert!((resolved.max - 12.0).abs() < 1.0e-12);
        assert!(resolved.vary);
    }

    #[test]
    fn multiplicative_reference_orders_bounds_for_negative_peers() {
        let peers = peaks_with_a_at(-4.0);
        let expr = ConstraintExpr::RefOffset {
            peak: PeakId::A,
            op: ConstraintOp::Mul,
            value: 0.5,
            tolerance: 0.1,
        };

        let resolved = resolve_constraint(&expr, ParamKind::Position, 0.0, &peers);
        assert!(resolved.min < resolved.max);
        assert!((resolved.min - (-2.4)).abs() < 1.0e-12);
        assert!((resolved.max - (-1.6)).abs() < 1.0e-12);
    }

    #[test]
    fn missing_reference_degrades_to_a_window_around_current() {
        let peers = PeakCollection::new();
        let expr = ConstraintExpr::RefOffset {
            peak: PeakId::C,
            op: ConstraintOp::Add,
            value: 2.0,
            tolerance: 0.2,
        };

        let resolved = resolve_constraint(&expr, ParamKind::Height, 700.0, &peers);
        assert_eq!((resolved.min, resolved.max, resolved.vary), (699.9, 700.1, true));
    }

    #[test]
    fn degenerate_windows_are_nudged_open() {
        let peers = PeakCollection::new();
        let expr = ConstraintExpr::Bounds { min: 2.0, max: 2.0 };
        let resolved = resolve_constraint(&expr, ParamKind::Area, 2.0, &peers);
        assert!(resolved.max > resolved.min);
        assert!((resolved.max - resolved.min - 1.0e-6).abs() < 1.0e-15);
    }

    #[test]
    fn unconstrained_bounds_accept_everything() {
        let bounds = ResolvedBounds::unconstrained();
        assert_eq!(bounds.clamp(1.0e12), 1.0e12);
        assert_eq!(bounds.clamp(-1.0e12), -1.0e12);
        assert!(bounds.vary);
    }
}
