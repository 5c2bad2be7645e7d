pub mod errors;

pub use errors::{CoreError, CoreResult};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Identity of one fitted component. The letters double as the reference
/// syntax of the constraint language, so the set is closed at sixteen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PeakId {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
}

impl PeakId {
    pub const ALL: [PeakId; 16] = [
        Self::A,
        Self::B,
        Self::C,
        Self::D,
        Self::E,
        Self::F,
        Self::G,
        Self::H,
        Self::I,
        Self::J,
        Self::K,
        Self::L,
        Self::M,
        Self::N,
        Self::O,
        Self::P,
    ];

    pub fn from_letter(letter: char) -> Option<Self> {
        let upper = letter.to_ascii_uppercase();
        let index = (upper as u32).checked_sub('A' as u32)? as usize;
        Self::ALL.get(index).copied()
    }

    pub const fn letter(self) -> char {
        (b'A' + self as u8) as char
    }
}

impl Display for PeakId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// The five per-peak quantities a constraint string can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKind {
    Position,
    Height,
    Fwhm,
    Area,
    LgRatio,
}

impl ParamKind {
    pub const ALL: [ParamKind; 5] = [
        Self::Position,
        Self::Height,
        Self::Fwhm,
        Self::Area,
        Self::LgRatio,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Height => "height",
            Self::Fwhm => "fwhm",
            Self::Area => "area",
            Self::LgRatio => "l/g",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Position => 0,
            Self::Height => 1,
            Self::Fwhm => 2,
            Self::Area => 3,
            Self::LgRatio => 4,
        }
    }
}

impl Display for ParamKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Closed set of supported line shapes, resolved once from the shape name at
/// model-build time so evaluation never matches on strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeakShape {
    Gl,
    Sgl,
    Voigt,
    VoigtAreaLg,
    PseudoVoigt,
    La,
    LaXG,
    ExpGauss,
}

impl PeakShape {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gl => "GL",
            Self::Sgl => "SGL",
            Self::Voigt => "Voigt",
            Self::VoigtAreaLg => "Voigt (Area, L/G)",
            Self::PseudoVoigt => "Pseudo-Voigt",
            Self::La => "LA",
            Self::LaXG => "LA*G",
            Self::ExpGauss => "ExpGauss",
        }
    }

    /// Resolve a shape name from the host grid. Unknown names are fatal to
    /// the fit that tried to use them.
    pub fn parse(name: &str) -> CoreResult<Self> {
        let normalized: String = name
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        match normalized.as_str() {
            "GL" => Ok(Self::Gl),
            "SGL" => Ok(Self::Sgl),
            "VOIGT" => Ok(Self::Voigt),
            "VOIGT(AREA,L/G)" | "VOIGTAREALG" => Ok(Self::VoigtAreaLg),
            "PSEUDO-VOIGT" | "PSEUDOVOIGT" | "PV" => Ok(Self::PseudoVoigt),
            "LA" => Ok(Self::La),
            "LA*G" | "LAXG" => Ok(Self::LaXG),
            "EXPGAUSS" | "EXP-GAUSS" | "EMG" => Ok(Self::ExpGauss),
            _ => Err(CoreError::UnknownShape {
                name: name.to_string(),
            }),
        }
    }

    /// Whether the shape's amplitude parameter is an integrated area rather
    /// than a peak height.
    pub const fn amplitude_is_area(self) -> bool {
        matches!(
            self,
            Self::VoigtAreaLg | Self::PseudoVoigt | Self::La | Self::LaXG
        )
    }
}

impl Display for PeakShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Raw constraint strings for one peak, indexed by parameter. The strings
/// are the wire format shared with the host grid; parsing happens at the
/// core boundary, never in numeric code.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConstraintSet {
    entries: [Option<String>; 5],
}

impl ConstraintSet {
    pub fn get(&self, param: ParamKind) -> Option<&str> {
        self.entries[param.index()].as_deref()
    }

    pub fn set(&mut self, param: ParamKind, text: impl Into<String>) {
        self.entries[param.index()] = Some(text.into());
    }

    pub fn clear(&mut self, param: ParamKind) {
        self.entries[param.index()] = None;
    }
}

/// One fitted spectral component.
///
/// `sigma` and `gamma` carry shape-specific meaning: Gaussian and Lorentzian
/// widths for the Voigt family, tail exponents for the asymmetric LA family,
/// and the exponential decay constant for ExpGauss. They are kept as two
/// distinct fields so the semantics never collapse into one number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub id: PeakId,
    pub label: String,
    pub shape: PeakShape,
    pub position: f64,
    pub height: f64,
    pub fwhm: f64,
    pub lg_ratio: f64,
    pub sigma: f64,
    pub gamma: f64,
    pub area: f64,
    pub constraints: ConstraintSet,
}

impl Peak {
    pub fn new(id: PeakId, shape: PeakShape) -> Self {
        Self {
            id,
            label: format!("Peak {id}"),
            shape,
            position: 0.0,
            height: 0.0,
            fwhm: 1.6,
            lg_ratio: 30.0,
            sigma: 1.2,
            gamma: 0.4,
            area: 0.0,
            constraints: ConstraintSet::default(),
        }
    }

    pub fn value(&self, param: ParamKind) -> f64 {
        match param {
            ParamKind::Position => self.position,
            ParamKind::Height => self.height,
            ParamKind::Fwhm => self.fwhm,
            ParamKind::Area => self.area,
            ParamKind::LgRatio => self.lg_ratio,
        }
    }

    pub fn set_value(&mut self, param: ParamKind, value: f64) {
        match param {
            ParamKind::Position => self.position = value,
            ParamKind::Height => self.height = value,
            ParamKind::Fwhm => self.fwhm = value,
            ParamKind::Area => self.area = value,
            ParamKind::LgRatio => self.lg_ratio = value,
        }
    }
}

/// Insertion-ordered peak aggregate for the displayed core level. The host
/// owns it; the fitting core borrows it and returns fresh values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PeakCollection {
    peaks: Vec<Peak>,
}

impl PeakCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a peak, replacing any existing peak with the same id in place.
    pub fn insert(&mut self, peak: Peak) {
        match self.peaks.iter_mut().find(|existing| existing.id == peak.id) {
            Some(slot) => *slot = peak,
            None => self.peaks.push(peak),
        }
    }

    pub fn remove(&mut self, id: PeakId) -> Option<Peak> {
        let index = self.peaks.iter().position(|peak| peak.id == id)?;
        Some(self.peaks.remove(index))
    }

    pub fn get(&self, id: PeakId) -> Option<&Peak> {
        self.peaks.iter().find(|peak| peak.id == id)
    }

    pub fn get_mut(&mut self, id: PeakId) -> Option<&mut Peak> {
        self.peaks.iter_mut().find(|peak| peak.id == id)
    }

    pub fn value_of(&self, id: PeakId, param: ParamKind) -> Option<f64> {
        self.get(id).map(|peak| peak.value(param))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peak> {
        self.peaks.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Peak> {
        self.peaks.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }
}

/// One contiguous energy interval, `low < high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyWindow {
    pub low: f64,
    pub high: f64,
}

impl EnergyWindow {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }
}

/// Borrowed view of one energy-vs-intensity dataset. Energies must be
/// strictly increasing; the spectrum is immutable for the duration of any
/// core call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spectrum<'a> {
    energy: &'a [f64],
    intensity: &'a [f64],
}

impl<'a> Spectrum<'a> {
    pub fn new(energy: &'a [f64], intensity: &'a [f64]) -> CoreResult<Self> {
        if energy.is_empty() || energy.len() != intensity.len() {
            return Err(CoreError::LengthMismatch {
                energy: energy.len(),
                intensity: intensity.len(),
            });
        }

        for index in 1..energy.len() {
            if energy[index] <= energy[index - 1] {
                return Err(CoreError::NonIncreasingEnergy {
                    index,
                    previous: energy[index - 1],
                    current: energy[index],
                });
            }
        }

        Ok(Self { energy, intensity })
    }

    pub fn energy(&self) -> &'a [f64] {
        self.energy
    }

    pub fn intensity(&self) -> &'a [f64] {
        self.intensity
    }

    pub fn len(&self) -> usize {
        self.energy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.energy.is_empty()
    }

    /// Inclusive index bounds of the points inside `[low, high]`.
    pub fn window_indices(&self, low: f64, high: f64) -> CoreResult<(usize, usize)> {
        if !(low < high) {
            return Err(CoreError::InvalidRange { low, high });
        }

        let first = self.energy.iter().position(|&e| e >= low);
        let last = self.energy.iter().rposition(|&e| e <= high);
        match (first, last) {
            (Some(first), Some(last)) if first <= last => Ok((first, last)),
            _ => Err(CoreError::EmptyRange { low, high }),
        }
    }
}
