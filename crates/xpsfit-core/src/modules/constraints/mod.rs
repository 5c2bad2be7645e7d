mod model;
mod parser;

pub use model::{
    ConstraintExpr, ConstraintOp, PeerValueLookup, ResolvedBounds, resolve_constraint,
};
pub use parser::{DoubletConstraints, doublet_constraints, parse_constraint};
