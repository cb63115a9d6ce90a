pub mod addon;

pub use addon::*;
