use log::debug;

use super::sampler::NoiseSource;
use crate::tracking::algebra::add_vector;
use crate::tracking::{ModelDefinition, Vector};

/// Ground truth from `x_k = A·x_{k-1} (+ G·u)`, starting at the model's x₀.
pub fn propagate(model: &ModelDefinition) -> Vec<Vector> {
    let mut trajectory = Vec::with_capacity(model.steps());
    trajectory.push(model.initial_state().clone());

    for k in 1..model.steps() {
        let next = model.forward(&trajectory[k - 1]);
        trajectory.push(next);
    }

    trajectory
}

/// One measurement `C·x_k` per trajectory entry, index 0 included.
///
/// For a noisy model every component `i` gets `√R_ii · n` added, with `n`
/// drawn from `noise` in step-major, component-minor order. A noiseless model
/// never touches `noise`.
pub fn measure(model: &ModelDefinition, trajectory: &[Vector], noise: &mut impl NoiseSource) -> Vec<Vector> {
    if !model.is_noisy() {
        return trajectory.iter().map(|state| model.measure(state)).collect();
    }

    let deviation = model.sensor_deviation();
    trajectory
        .iter()
        .map(|state| {
            let perturbation = Vector::from_shape_fn(deviation.len(), |i| deviation[i] * noise.standard_normal());
            add_vector(&model.measure(state), &perturbation)
        })
        .collect()
}

/// Trajectory and measurement series of one run.
pub fn generate(model: &ModelDefinition, noise: &mut impl NoiseSource) -> (Vec<Vector>, Vec<Vector>) {
    let trajectory = propagate(model);
    let measurements = measure(model, &trajectory, noise);
    debug!(
        "Generated {} true states and measurements for '{}' (noisy: {})",
        trajectory.len(),
        model.name(),
        model.is_noisy()
    );

    (trajectory, measurements)
}
