use std::ops::Range;

use log::{debug, warn};
use rayon::prelude::*;
use serde::Serialize;

use super::diagnostics::{component, estimation_errors, mean_absolute_error, root_mean_square_error};
use super::sampler::{NoiseSource, SeededNoise};
use super::trajectory;
use crate::error::Result;
use crate::tracking::{Kalman, Matrix, ModelDefinition, Vector};

/// Everything one run produces, index-aligned over the model's steps.
#[derive(Clone, Debug, PartialEq)]
pub struct RunResult {
    pub time: Vec<f64>,
    pub measurements: Vec<Vector>,
    pub trajectory: Vec<Vector>,
    pub estimates: Vec<Vector>,
    pub errors: Vec<Vector>,
    pub final_covariance: Matrix,
}

impl RunResult {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Error series of one state component, `None` past the state dimension.
    pub fn component_error(&self, index: usize) -> Option<Vec<f64>> {
        let dimension = self.errors.first()?.len();
        (index < dimension).then(|| component(&self.errors, index))
    }

    pub fn position_error(&self) -> Option<Vec<f64>> {
        self.component_error(0)
    }

    pub fn velocity_error(&self) -> Option<Vec<f64>> {
        self.component_error(1)
    }

    pub fn mean_absolute_error(&self, index: usize, steps: Range<usize>) -> Option<f64> {
        mean_absolute_error(&self.errors, index, steps)
    }

    pub fn root_mean_square_error(&self, index: usize) -> Option<f64> {
        root_mean_square_error(&self.errors, index)
    }

    /// Plain nested vectors for serialization.
    pub fn to_report(&self) -> RunReport {
        let rows = |series: &[Vector]| -> Vec<Vec<f64>> { series.iter().map(|v| v.to_vec()).collect() };
        RunReport {
            time: self.time.clone(),
            measurements: rows(&self.measurements),
            trajectory: rows(&self.trajectory),
            estimates: rows(&self.estimates),
            errors: rows(&self.errors),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunReport {
    pub time: Vec<f64>,
    pub measurements: Vec<Vec<f64>>,
    pub trajectory: Vec<Vec<f64>>,
    pub estimates: Vec<Vec<f64>>,
    pub errors: Vec<Vec<f64>>,
}

/// Generate truth and measurements, filter them and derive the errors.
///
/// Nothing partial is returned: a singular innovation covariance fails the
/// whole run with the step at which it occurred.
pub fn simulate(model: &ModelDefinition, noise: &mut impl NoiseSource) -> Result<RunResult> {
    let (trajectory, measurements) = trajectory::generate(model, noise);

    let mut kalman = Kalman::new(model);
    let estimates = kalman.filter(&measurements).map_err(|error| {
        if error.is_singular() {
            warn!("Run of '{}' aborted: {}", model.name(), error);
        }
        error
    })?;

    let errors = estimation_errors(&estimates, &trajectory);
    debug!("Completed run of '{}' over {} steps", model.name(), estimates.len());

    Ok(RunResult {
        time: model.time_labels(),
        measurements,
        trajectory,
        estimates,
        errors,
        final_covariance: kalman.estimate_covariance,
    })
}

/// Independent runs on the rayon pool, run `i` seeded with `seed + i`.
pub fn simulate_batch(models: &[ModelDefinition], seed: u64) -> Vec<Result<RunResult>> {
    models
        .par_iter()
        .enumerate()
        .map(|(i, model)| simulate(model, &mut SeededNoise::from_seed(seed.wrapping_add(i as u64))))
        .collect()
}
