pub mod seismology;
pub mod solution;

pub use seismology::*;
pub use solution::{Field, NormalizedSolution, TensorComponents};
