//! A tree-IR optimizer for shader programs: constant folding, algebraic
//! simplification, copy/constant propagation, dead-code elimination,
//! grafting, rebalancing and vectorization, plus the lowering passes that
//! rewrite constructs a back end cannot express.

pub mod ir;
pub mod utils;
