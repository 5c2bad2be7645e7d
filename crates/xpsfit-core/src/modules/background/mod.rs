mod model;
mod tougaard;

pub use model::{
    BackgroundMethod, BackgroundSpec, SHIRLEY_MAX_ITERATIONS, SHIRLEY_TOLERANCE,
    compute_background, refresh_smart_background,
};
pub use tougaard::{TougaardComponent, TougaardVary, fit_tougaard, tougaard_background};
