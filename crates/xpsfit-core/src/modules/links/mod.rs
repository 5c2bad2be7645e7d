//! Cross-peak parameter propagation.
//!
//! When a peak's position, height, FWHM, or area changes, every peak whose
//! constraint on that parameter references it is rewritten through the
//! constraint's operator, recursively. A visited set caps any reference
//! cycle at one update per peak per pass, so termination never depends on
//! numeric convergence. FWHM-only propagation is the same walk invoked with
//! [`ParamKind::Fwhm`].

use crate::domain::{CoreResult, ParamKind, PeakCollection, PeakId};
use crate::modules::constraints::{ConstraintExpr, parse_constraint};
use crate::modules::shapes;
use std::collections::BTreeSet;

/// One-hop dependents: peaks whose constraint on `param` references
/// `origin`.
pub fn linked_peaks(peaks: &PeakCollection, origin: PeakId, param: ParamKind) -> Vec<PeakId> {
    peaks
        .iter()
        .filter(|peak| peak.id != origin)
        .filter(|peak| {
            peak.constraints
                .get(param)
                .is_some_and(|text| references_origin(text, origin))
        })
        .map(|peak| peak.id)
        .collect()
}

/// A constraint belongs to `origin` when its text leads with the origin's
/// letter. `Fixed` is a keyword, never a reference to peak F.
fn references_origin(text: &str, origin: PeakId) -> bool {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("fixed") {
        return false;
    }
    trimmed
        .chars()
        .next()
        .is_some_and(|letter| PeakId::from_letter(letter) == Some(origin))
}

/// Write `new_value` into `origin`'s `param` and ripple it through every
/// transitive dependent. Returns the updated peak ids in walk order; on any
/// error the collection is left exactly as it was.
pub fn propagate_edit(
    peaks: &mut PeakCollection,
    origin: PeakId,
    param: ParamKind,
    new_value: f64,
) -> CoreResult<Vec<PeakId>> {
    if peaks.get(origin).is_none() {
        return Ok(Vec::new());
    }

    let mut scratch = peaks.clone();
    let mut visited = BTreeSet::new();
    let mut updated = Vec::new();

    apply_value(&mut scratch, origin, param, new_value)?;
    visited.insert(origin);
    updated.push(origin);
    propagate_from(&mut scratch, origin, param, new_value, &mut visited, &mut updated)?;

    *peaks = scratch;
    Ok(updated)
}

fn propagate_from(
    peaks: &mut PeakCollection,
    origin: PeakId,
    param: ParamKind,
    origin_value: f64,
    visited: &mut BTreeSet<PeakId>,
    updated: &mut Vec<PeakId>,
) -> CoreResult<()> {
    for dependent in linked_peaks(peaks, origin, param) {
        if visited.contains(&dependent) {
            continue;
        }

        let derived = match peaks
            .get(dependent)
            .and_then(|peak| peak.constraints.get(param))
            .map(parse_constraint)
        {
            Some(ConstraintExpr::RefOffset { op, value, .. }) => op.apply(origin_value, value),
            // Letter-prefixed text that no longer parses as a reference
            // still tracks the origin verbatim.
            _ => origin_value,
        };

        apply_value(peaks, dependent, param, derived)?;
        visited.insert(dependent);
        updated.push(dependent);
        propagate_from(peaks, dependent, param, derived, visited, updated)?;
    }

    Ok(())
}

/// Set one parameter and restore the height/area consistency the shape
/// demands: amplitude-by-area shapes re-derive height when their anchor
/// moves, everything else re-derives area.
fn apply_value(
    peaks: &mut PeakCollection,
    id: PeakId,
    param: ParamKind,
    value: f64,
) -> CoreResult<()> {
    let Some(peak) = peaks.get_mut(id) else {
        return Ok(());
    };
    peak.set_value(param, value);

    match param {
        ParamKind::Height => {
            peak.area = shapes::area_from_height(
                peak.shape,
                peak.height,
                peak.fwhm,
                peak.lg_ratio,
                peak.sigma,
                peak.gamma,
            )?;
        }
        ParamKind::Area => {
            peak.height = shapes::height_from_area(
                peak.shape,
                peak.area,
                peak.fwhm,
                peak.lg_ratio,
                peak.sigma,
                peak.gamma,
            )?;
        }
        ParamKind::Fwhm => {
            if peak.shape.amplitude_is_area() {
                peak.height = shapes::height_from_area(
                    peak.shape,
                    peak.area,
                    peak.fwhm,
                    peak.lg_ratio,
                    peak.sigma,
                    peak.gamma,
                )?;
            } else {
                peak.area = shapes::area_from_height(
                    peak.shape,
                    peak.height,
                    peak.fwhm,
                    peak.lg_ratio,
                    peak.sigma,
                    peak.gamma,
                )?;
            }
        }
        ParamKind::Position | ParamKind::LgRatio => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{linked_peaks, propagate_edit};
    use crate::domain::{ParamKind, Peak, PeakCollection, PeakId, PeakShape};
    use crate::modules::shapes;

    fn peak_with(
        id: PeakId,
        position: f64,
        height: f64,
        position_constraint: Option<&str>,
    ) -> Peak {
        let mut peak = Peak::new(id, PeakShape::Gl);
        peak.position = position;
        peak.height = height;
        peak.area =
            shapes::area_from_height(peak.shape, height, peak.fwhm, peak.lg_ratio, 0.0, 0.0)
                .unwrap();
        if let Some(text) = position_constraint {
            peak.constraints.set(ParamKind::Position, text);
        }
        peak
    }

    #[test]
    fn linked_peaks_finds_one_hop_dependents_only() {
        let mut peaks = PeakCollection::new();
        peaks.insert(peak_with(PeakId::A, 530.0, 1000.0, None));
        peaks.insert(peak_with(PeakId::B, 531.2, 500.0, Some("A+1.2")));
        peaks.insert(peak_with(PeakId::C, 533.0, 300.0, Some("B+1.8")));
        peaks.insert(peak_with(PeakId::D, 536.0, 200.0, Some("Fixed")));

        assert_eq!(linked_peaks(&peaks, PeakId::A, ParamKind::Position), vec![PeakId::B]);
        assert_eq!(linked_peaks(&peaks, PeakId::B, ParamKind::Position), vec![PeakId::C]);
        // "Fixed" must not read as a reference to peak F.
        assert!(linked_peaks(&peaks, PeakId::F, ParamKind::Position).is_empty());
    }

    #[test]
    fn position_edits_ripple_down_reference_chains() {
        let mut peaks = PeakCollection::new();
        peaks.insert(peak_with(PeakId::A, 530.0, 1000.0, None));
        peaks.insert(peak_with(PeakId::B, 531.2, 500.0, Some("A+1.2")));
        peaks.insert(peak_with(PeakId::C, 533.0, 300.0, Some("B+1.8")));

        let updated =
            propagate_edit(&mut peaks, PeakId::A, ParamKind::Position, 529.5).unwrap();
        assert_eq!(updated, vec![PeakId::A, PeakId::B, PeakId::C]);
        assert!((peaks.get(PeakId::A).unwrap().position - 529.5).abs() < 1.0e-12);
        assert!((peaks.get(PeakId::B).unwrap().position - 530.7).abs() < 1.0e-12);
        assert!((peaks.get(PeakId::C).unwrap().position - 532.5).abs() < 1.0e-12);
    }

    #[test]
    fn mutual_references_terminate_with_one_update_per_peak() {
        let mut peaks = PeakCollection::new();
        peaks.insert(peak_with(PeakId::A, 530.0, 1000.0, Some("B+-1.2")));
        peaks.insert(peak_with(PeakId::B, 531.2, 500.0, Some("A+1.2")));

        let updated =
            propagate_edit(&mut peaks, PeakId::A, ParamKind::Position, 530.4).unwrap();
        assert_eq!(updated, vec![PeakId::A, PeakId::B]);
        assert!((peaks.get(PeakId::A).unwrap().position - 530.4).abs() < 1.0e-12);
        assert!((peaks.get(PeakId::B).unwrap().position - 531.6).abs() < 1.0e-12);
    }

    #[test]
    fn height_propagation_rescales_and_rederives_areas() {
        let mut parent = peak_with(PeakId::A, 530.0, 1000.0, None);
        let mut partner = peak_with(PeakId::B, 531.2, 500.0, None);
        parent.constraints.clear(ParamKind::Position);
        partner.constraints.set(ParamKind::Height, "A*0.5");

        let mut peaks = PeakCollection::new();
        peaks.insert(parent);
        peaks.insert(partner);

        propagate_edit(&mut peaks, PeakId::A, ParamKind::Height, 800.0).unwrap();

        let partner = peaks.get(PeakId::B).unwrap();
        assert!((partner.height - 400.0).abs() < 1.0e-9);
        let expected_area = shapes::area_from_height(
            partner.shape,
            partner.height,
            partner.fwhm,
            partner.lg_ratio,
            partner.sigma,
            partner.gamma,
        )
        .unwrap();
        assert!((partner.area - expected_area).abs() < 1.0e-9);
    }

    #[test]
    fn area_edits_rederive_height_instead() {
        let mut peaks = PeakCollection::new();
        peaks.insert(peak_with(PeakId::A, 530.0, 1000.0, None));
        let before = peaks.get(PeakId::A).unwrap().clone();

        propagate_edit(&mut peaks, PeakId::A, ParamKind::Area, before.area * 2.0).unwrap();

        let after = peaks.get(PeakId::A).unwrap();
        assert!((after.height - 2.0 * before.height).abs() < 1.0e-6);
    }

    #[test]
    fn failed_propagation_leaves_the_collection_untouched() {
        let mut peaks = PeakCollection::new();
        peaks.insert(peak_with(PeakId::A, 530.0, 1000.0, None));
        peaks.insert(peak_with(PeakId::B, 531.2, 500.0, None));
        let before = peaks.clone();

        let error = propagate_edit(&mut peaks, PeakId::A, ParamKind::Fwhm, -0.5)
            .expect_err("negative width must fail");
        assert!(matches!(
            error,
            crate::domain::CoreError::InvalidParameter { field: "fwhm", .. }
        ));
        assert_eq!(peaks, before);
    }

    #[test]
    fn propagation_from_an_absent_peak_is_a_no_op() {
        let mut peaks = PeakCollection::new();
        let updated =
            propagate_edit(&mut peaks, PeakId::A, ParamKind::Position, 1.0).unwrap();
        assert!(updated.is_empty());
    }
}
