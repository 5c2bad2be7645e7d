//! Parser for the textual constraint mini-language.
//!
//! The grammar, with `L` a peak letter `A`-`P` (case-insensitive):
//!
//! - `Fixed`                 freeze at the current value
//! - `L+1.18#0.2` / `L*2#.1` window around a sibling peak's value
//! - `L+1.18` / `L*2`        same, with an operator-specific tolerance
//! - `528,535` / `528:535`   literal bounds
//! - `530.2`                 permissive window around a stated value
//!
//! Anything else degrades to a permissive window around the current value.
//! Parsing never fails: a malformed constraint must not block a fit.

use super::model::{ConstraintExpr, ConstraintOp};
use crate::domain::PeakId;

pub fn parse_constraint(text: &str) -> ConstraintExpr {
    let trimmed = text.trim();

    if trimmed.eq_ignore_ascii_case("fixed") {
        return ConstraintExpr::Fixed;
    }
    if let Some(expr) = parse_reference(trimmed) {
        return expr;
    }
    if let Some(expr) = parse_bounds_pair(trimmed) {
        return expr;
    }
    if let Some(value) = parse_finite(trimmed) {
        return ConstraintExpr::Bare { value };
    }

    tracing::warn!(
        constraint = trimmed,
        "unparsable constraint, falling back to a permissive window"
    );
    ConstraintExpr::Fallback
}

fn parse_finite(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn parse_reference(text: &str) -> Option<ConstraintExpr> {
    let mut chars = text.chars();
    let peak = PeakId::from_letter(chars.next()?)?;
    let op = match chars.next()? {
        '+' => ConstraintOp::Add,
        '*' => ConstraintOp::Mul,
        _ => return None,
    };

    let rest = chars.as_str();
    let (value_text, tolerance_text) = match rest.split_once('#') {
        Some((value, tolerance)) => (value, Some(tolerance)),
        None => (rest, None),
    };

    let value = parse_finite(value_text.trim())?;
    let tolerance = match tolerance_text {
        Some(text) => parse_finite(text.trim())?,
        None => op.default_tolerance(),
    };

    Some(ConstraintExpr::RefOffset {
        peak,
        op,
        value,
        tolerance,
    })
}

fn parse_bounds_pair(text: &str) -> Option<ConstraintExpr> {
    let (first, second) = text.split_once(',').or_else(|| text.split_once(':'))?;
    let first = parse_finite(first.trim())?;
    let second = parse_finite(second.trim())?;

    Some(ConstraintExpr::Bounds {
        min: first.min(second),
        max: first.max(second),
    })
}

/// Constraint strings tying a spin-orbit partner to its parent peak:
/// position offset by the doublet splitting, height scaled by the intensity
/// ratio, width locked to the parent.
#[derive(Debug, Clone, PartialEq)]
pub struct DoubletConstraints {
    pub position: String,
    pub height: String,
    pub fwhm: String,
}

pub fn doublet_constraints(
    parent: PeakId,
    splitting: f64,
    intensity_ratio: f64,
) -> DoubletConstraints {
    DoubletConstraints {
        position: format!("{parent}+{splitting}"),
        height: format!("{parent}*{intensity_ratio}"),
        fwhm: format!("{parent}*1"),
    }
}
