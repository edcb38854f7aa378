pub mod diagnostics;
mod run;
pub mod sampler;
pub mod trajectory;

pub use crate::simulation::run::{simulate, simulate_batch, RunReport, RunResult};
pub use crate::simulation::sampler::{NoiseSource, SeededNoise, Silent, ThreadNoise};
