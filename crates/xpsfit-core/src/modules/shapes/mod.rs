mod model;

pub use model::{
    PeakProfile, area_from_height, gl, height_from_area, height_to_area_factor, la, pseudo_voigt,
    sgl, voigt,
};
