pub mod config;
pub mod error;
pub mod export;
pub mod session;
pub mod simulation;
pub mod tracking;

pub use crate::error::{Error, Result};
pub use crate::export::Export;
pub use crate::session::Session;
pub use crate::simulation::{simulate, RunResult};
pub use crate::tracking::ModelDefinition;
