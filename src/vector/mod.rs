// Embedding normalization and vector math shared by clustering and story assembly
pub mod preprocess;
pub mod similarity;

pub use preprocess::*;
pub use similarity::*;

/// Maximum distance from 1.0 tolerated for a vector to count as unit length.
pub const UNIT_NORM_TOLERANCE: f32 = 1e-5;
