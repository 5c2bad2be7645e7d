//! Spectral deconvolution core for X-ray photoelectron spectra.
//!
//! The crate owns the numerically interesting part of a peak-fitting
//! application and nothing else: the line-shape library with its
//! height/area parameterizations, the textual constraint mini-language and
//! its cross-peak propagation graph, the background estimators (linear,
//! iterative Shirley, Smart, multi-region Smart, Tougaard convolution with
//! coefficient refinement), and the bounded least-squares orchestrator with
//! goodness-of-fit statistics.
//!
//! The hosting application owns the spectra, the peak collection, and every
//! surface around them (grids, plots, files). This core borrows those
//! inputs, computes, and returns freshly allocated outputs; it holds no
//! state between calls.

pub mod domain;
pub mod modules;
pub mod numerics;

pub use domain::{
    ConstraintSet, CoreError, CoreResult, EnergyWindow, ParamKind, Peak, PeakCollection, PeakId,
    PeakShape, Spectrum,
};
pub use modules::background::{
    BackgroundMethod, BackgroundSpec, TougaardComponent, TougaardVary, compute_background,
    fit_tougaard, refresh_smart_background, tougaard_background,
};
pub use modules::constraints::{
    ConstraintExpr, ConstraintOp, DoubletConstraints, PeerValueLookup, ResolvedBounds,
    doublet_constraints, parse_constraint, resolve_constraint,
};
pub use modules::fit::{
    FitPhase, FitResult, FitStatistics, ResolvedPeak, SolverConfig, SolverMethod, fit,
    fit_sequence,
};
pub use modules::links::{linked_peaks, propagate_edit};
pub use modules::shapes::{
    PeakProfile, area_from_height, gl, height_from_area, height_to_area_factor, la, pseudo_voigt,
    sgl, voigt,
};
