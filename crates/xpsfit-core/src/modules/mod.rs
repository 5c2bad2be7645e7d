pub mod background;
pub mod constraints;
pub mod fit;
pub mod links;
pub mod shapes;
