use log::trace;

use super::algebra::{
    add, add_vector, identity, inverse, multiply, multiply_vector, subtract, subtract_vector,
    transpose,
};
use super::{Matrix, ModelDefinition, Vector};
use crate::error::Result;

#[derive(Clone, Debug)]
pub struct Kalman<'a> {
    // Gaussian estimation of state
    pub prediction: Vector,
    pub prediction_covariance: Matrix,
    pub estimate: Vector,
    pub estimate_covariance: Matrix,

    // The model of the tracked process, including its noise covariances
    model: &'a ModelDefinition,

    // Kalman values
    residual: Vector,
    residual_covariance: Matrix,
    kalman_gain: Matrix,
}

impl<'a> Kalman<'a> {
    /// Start from the model's initial estimate and error covariance.
    pub fn new(model: &'a ModelDefinition) -> Self {
        let x_dim = model.get_state_dimension();
        let z_dim = model.get_measurement_dimension();

        Self {
            prediction: model.initial_estimate().clone(),
            prediction_covariance: model.initial_covariance().clone(),
            estimate: model.initial_estimate().clone(),
            estimate_covariance: model.initial_covariance().clone(),
            model,
            residual: Vector::zeros(z_dim),
            residual_covariance: Matrix::zeros((z_dim, z_dim)),
            kalman_gain: Matrix::zeros((x_dim, z_dim)),
        }
    }

    pub fn predict(&mut self) {
        // Predict next state and prediction covariance
        let forward_model = self.model.forward_model();
        self.prediction = self.model.forward(&self.estimate);
        self.prediction_covariance = add(
            &multiply(
                &multiply(forward_model, &self.estimate_covariance),
                &transpose(forward_model),
            ),
            self.model.process_noise(),
        );
    }

    /// Correct the prediction with a measurement.
    ///
    /// Fails if the innovation covariance cannot be inverted; the estimate is
    /// left at its previous value in that case.
    pub fn update(&mut self, measurement: &Vector) -> Result<()> {
        let output_model = self.model.output_model();
        let output_transposed = transpose(output_model);

        // Compute the residual covariance and the new Kalman gain
        let residual_covariance = add(
            &multiply(
                &multiply(output_model, &self.prediction_covariance),
                &output_transposed,
            ),
            self.model.sensor_noise(),
        );
        let kalman_gain = multiply(
            &multiply(&self.prediction_covariance, &output_transposed),
            &inverse(&residual_covariance)?,
        );

        // Estimate new state
        let residual = subtract_vector(measurement, &self.model.measure(&self.prediction));
        self.estimate = add_vector(&self.prediction, &multiply_vector(&kalman_gain, &residual));
        self.estimate_covariance = multiply(
            &subtract(
                &identity(self.model.get_state_dimension()),
                &multiply(&kalman_gain, output_model),
            ),
            &self.prediction_covariance,
        );

        trace!("Innovation {residual} with gain {kalman_gain}");
        self.residual = residual;
        self.residual_covariance = residual_covariance;
        self.kalman_gain = kalman_gain;

        Ok(())
    }

    pub fn innovation(&self) -> &Vector {
        &self.residual
    }

    pub fn innovation_covariance(&self) -> &Matrix {
        &self.residual_covariance
    }

    pub fn gain(&self) -> &Matrix {
        &self.kalman_gain
    }

    pub fn covariance(&self) -> &Matrix {
        &self.estimate_covariance
    }

    /// Run the predict/update cycle over a measurement series.
    ///
    /// Entry 0 of the returned series is the initial estimate; measurement 0
    /// is not consumed. A singular innovation covariance aborts the run with
    /// the index of the failing step.
    pub fn filter(&mut self, measurements: &[Vector]) -> Result<Vec<Vector>> {
        let mut estimates = Vec::with_capacity(measurements.len());
        estimates.push(self.estimate.clone());

        for (step, measurement) in measurements.iter().enumerate().skip(1) {
            self.predict();
            self.update(measurement).map_err(|error| error.at_step(step))?;
            estimates.push(self.estimate.clone());
        }

        Ok(estimates)
    }
}
