use log::debug;
use ndarray::array;

use super::algebra::{add_vector, is_positive_semidefinite, multiply_vector};
use super::{Matrix, Vector};
use crate::config::{KinematicParameters, LinearParameters};
use crate::error::{Error, Result};

/// Constant input applied at every step through the control gain.
#[derive(Clone, Debug, PartialEq)]
pub struct Control {
    pub gain: Matrix,
    pub input: Vector,
}

/// Linear state-space model plus noise and initial conditions of one run.
///
/// Validated once in [`ModelBuilder::build`] and immutable afterwards; a new
/// parameter set means a new definition.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelDefinition {
    name: String,
    forward_model: Matrix,
    control: Option<Control>,
    output_model: Matrix,
    process_noise: Matrix,
    sensor_noise: Matrix,
    initial_state: Vector,
    initial_estimate: Vector,
    initial_covariance: Matrix,
    steps: usize,
    dt: Option<f64>,
}

impl ModelDefinition {
    pub fn builder(name: &str, forward_model: Matrix) -> ModelBuilder {
        ModelBuilder::new(name, forward_model)
    }

    /// Position/velocity model with a scalar position measurement.
    pub fn kinematic(parameters: &KinematicParameters) -> Result<Self> {
        let dt = parameters.dt;

        Self::builder("kalmanFilterEstimation", array![[1.0, dt], [0.0, 1.0]])
            .control(array![[-0.5 * dt * dt], [-dt]], array![parameters.u])
            .output_model(array![[1.0, 0.0]])
            .process_noise(Matrix::zeros((2, 2)))
            .sensor_noise(array![[parameters.r]])
            .initial_state(array![parameters.y0, parameters.v0])
            .initial_estimate(array![10.0, 0.0])
            .initial_covariance(array![[50.0, 0.0], [0.0, 0.01]])
            .steps(parameters.steps)
            .dt(dt)
            .build()
    }

    /// Generic two-state model, fully and noiselessly observed.
    pub fn linear(parameters: &LinearParameters) -> Result<Self> {
        let a = &parameters.a;

        Self::builder("kalmanFilterSimulation", array![[a[0][0], a[0][1]], [a[1][0], a[1][1]]])
            .output_model(Matrix::eye(2))
            .process_noise(array![[1e-6, 0.0], [0.0, 1e-6]])
            .sensor_noise(Matrix::zeros((2, 2)))
            .initial_state(array![parameters.x0[0], parameters.x0[1]])
            .initial_estimate(array![parameters.x0_estimate[0], parameters.x0_estimate[1]])
            .initial_covariance(Matrix::eye(2))
            .steps(parameters.steps)
            .build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn forward_model(&self) -> &Matrix {
        &self.forward_model
    }

    pub fn control(&self) -> Option<&Control> {
        self.control.as_ref()
    }

    pub fn output_model(&self) -> &Matrix {
        &self.output_model
    }

    pub fn process_noise(&self) -> &Matrix {
        &self.process_noise
    }

    pub fn sensor_noise(&self) -> &Matrix {
        &self.sensor_noise
    }

    pub fn initial_state(&self) -> &Vector {
        &self.initial_state
    }

    pub fn initial_estimate(&self) -> &Vector {
        &self.initial_estimate
    }

    pub fn initial_covariance(&self) -> &Matrix {
        &self.initial_covariance
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn dt(&self) -> Option<f64> {
        self.dt
    }

    pub fn get_state_dimension(&self) -> usize {
        self.forward_model.nrows()
    }

    pub fn get_measurement_dimension(&self) -> usize {
        self.output_model.nrows()
    }

    /// One step of the dynamics, `A·x (+ G·u)`.
    pub fn forward(&self, state: &Vector) -> Vector {
        let propagated = multiply_vector(&self.forward_model, state);
        match &self.control {
            Some(control) => add_vector(&propagated, &multiply_vector(&control.gain, &control.input)),
            None => propagated,
        }
    }

    pub fn measure(&self, state: &Vector) -> Vector {
        multiply_vector(&self.output_model, state)
    }

    /// Whether measurements are perturbed, i.e. R has a positive diagonal entry.
    pub fn is_noisy(&self) -> bool {
        self.sensor_noise.diag().iter().any(|variance| *variance > 0.0)
    }

    /// Per-component measurement standard deviation `√R_ii`.
    pub fn sensor_deviation(&self) -> Vector {
        self.sensor_noise.diag().mapv(f64::sqrt)
    }

    /// `dt·(k+1)` with a sampling interval, `k+1` without.
    pub fn time_labels(&self) -> Vec<f64> {
        (0..self.steps)
            .map(|k| match self.dt {
                Some(dt) => dt * (k + 1) as f64,
                None => (k + 1) as f64,
            })
            .collect()
    }
}

/// Assembles and validates a [`ModelDefinition`].
///
/// Unset noise matrices default to zero, the measurement to the identity and
/// the initial covariance to the identity.
#[derive(Clone, Debug)]
pub struct ModelBuilder {
    name: String,
    forward_model: Matrix,
    control: Option<Control>,
    output_model: Option<Matrix>,
    process_noise: Option<Matrix>,
    sensor_noise: Option<Matrix>,
    initial_state: Option<Vector>,
    initial_estimate: Option<Vector>,
    initial_covariance: Option<Matrix>,
    steps: usize,
    dt: Option<f64>,
}

impl ModelBuilder {
    pub fn new(name: &str, forward_model: Matrix) -> Self {
        Self {
            name: name.to_owned(),
            forward_model,
            control: None,
            output_model: None,
            process_noise: None,
            sensor_noise: None,
            initial_state: None,
            initial_estimate: None,
            initial_covariance: None,
            steps: 2,
            dt: None,
        }
    }

    pub fn control(mut self, gain: Matrix, input: Vector) -> Self {
        self.control = Some(Control { gain, input });
        self
    }

    pub fn output_model(mut self, output_model: Matrix) -> Self {
        self.output_model = Some(output_model);
        self
    }

    pub fn process_noise(mut self, process_noise: Matrix) -> Self {
        self.process_noise = Some(process_noise);
        self
    }

    pub fn sensor_noise(mut self, sensor_noise: Matrix) -> Self {
        self.sensor_noise = Some(sensor_noise);
        self
    }

    pub fn initial_state(mut self, initial_state: Vector) -> Self {
        self.initial_state = Some(initial_state);
        self
    }

    pub fn initial_estimate(mut self, initial_estimate: Vector) -> Self {
        self.initial_estimate = Some(initial_estimate);
        self
    }

    pub fn initial_covariance(mut self, initial_covariance: Matrix) -> Self {
        self.initial_covariance = Some(initial_covariance);
        self
    }

    pub fn steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn dt(mut self, dt: f64) -> Self {
        self.dt = Some(dt);
        self
    }

    pub fn build(self) -> Result<ModelDefinition> {
        let n = self.forward_model.nrows();
        let output_model = self.output_model.unwrap_or_else(|| Matrix::eye(n));
        let m = output_model.nrows();

        let model = ModelDefinition {
            name: self.name,
            process_noise: self.process_noise.unwrap_or_else(|| Matrix::zeros((n, n))),
            sensor_noise: self.sensor_noise.unwrap_or_else(|| Matrix::zeros((m, m))),
            initial_state: self.initial_state.unwrap_or_else(|| Vector::zeros(n)),
            initial_estimate: self.initial_estimate.unwrap_or_else(|| Vector::zeros(n)),
            initial_covariance: self.initial_covariance.unwrap_or_else(|| Matrix::eye(n)),
            forward_model: self.forward_model,
            control: self.control,
            output_model,
            steps: self.steps,
            dt: self.dt,
        };

        validate(&model)?;
        debug!(
            "Built model '{}' with {} states, {} measurements, {} steps",
            model.name, n, m, model.steps
        );

        Ok(model)
    }
}

fn invalid(message: String) -> Error {
    Error::InvalidModel(message)
}

fn validate(model: &ModelDefinition) -> Result<()> {
    let (n, cols) = model.forward_model.dim();
    if n == 0 || n != cols {
        return Err(invalid(format!("transition matrix must be square, got {n}x{cols}")));
    }

    let expect_square = |name: &str, matrix: &Matrix, size: usize| {
        if matrix.dim() != (size, size) {
            let (rows, cols) = matrix.dim();
            return Err(invalid(format!("{name} must be {size}x{size}, got {rows}x{cols}")));
        }
        Ok(())
    };
    let expect_length = |name: &str, vector: &Vector, size: usize| {
        if vector.len() != size {
            return Err(invalid(format!("{name} must have {size} entries, got {}", vector.len())));
        }
        Ok(())
    };

    let (m, c_cols) = model.output_model.dim();
    if m == 0 || c_cols != n {
        return Err(invalid(format!(
            "measurement matrix must be m x {n}, got {m}x{c_cols}"
        )));
    }

    expect_square("process noise covariance", &model.process_noise, n)?;
    expect_square("measurement noise covariance", &model.sensor_noise, m)?;
    expect_square("initial error covariance", &model.initial_covariance, n)?;
    expect_length("initial state", &model.initial_state, n)?;
    expect_length("initial estimate", &model.initial_estimate, n)?;

    if let Some(control) = &model.control {
        let (rows, k) = control.gain.dim();
        if rows != n {
            return Err(invalid(format!("control gain must have {n} rows, got {rows}")));
        }
        expect_length("control input", &control.input, k)?;
    }

    if model.steps < 2 {
        return Err(invalid(format!("at least 2 steps are required, got {}", model.steps)));
    }

    if let Some(dt) = model.dt {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(invalid(format!("sampling interval must be positive, got {dt}")));
        }
    }

    let matrices = [
        &model.forward_model,
        &model.output_model,
        &model.process_noise,
        &model.sensor_noise,
        &model.initial_covariance,
    ];
    let vectors = [&model.initial_state, &model.initial_estimate];
    let control_finite = model.control.as_ref().map_or(true, |control| {
        control.gain.iter().chain(control.input.iter()).all(|value| value.is_finite())
    });
    if !control_finite
        || matrices.iter().any(|matrix| matrix.iter().any(|value| !value.is_finite()))
        || vectors.iter().any(|vector| vector.iter().any(|value| !value.is_finite()))
    {
        return Err(invalid("all model entries must be finite".to_string()));
    }

    for (name, covariance) in [
        ("process noise covariance", &model.process_noise),
        ("measurement noise covariance", &model.sensor_noise),
        ("initial error covariance", &model.initial_covariance),
    ] {
        if !is_positive_semidefinite(covariance) {
            return Err(invalid(format!("{name} must be symmetric positive semi-definite")));
        }
    }

    // The scalar innovation is divided by S, keep R away from zero
    if m == 1 && model.sensor_noise[[0, 0]] <= 0.0 {
        return Err(invalid(format!(
            "scalar measurement variance must be positive, got {}",
            model.sensor_noise[[0, 0]]
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::ModelDefinition;
    use crate::config::{KinematicParameters, LinearParameters};
    use crate::error::Error;
    use crate::tracking::Matrix;

    #[test]
    fn test_kinematic_model() {
        let model = ModelDefinition::kinematic(&KinematicParameters::default()).unwrap();

        assert_eq!(model.name(), "kalmanFilterEstimation");
        assert_eq!(model.forward_model(), &array![[1.0, 0.01], [0.0, 1.0]]);
        assert_eq!(model.control().unwrap().gain, array![[-0.5 * 0.01 * 0.01], [-0.01]]);
        assert_eq!(model.control().unwrap().input, array![5.0]);
        assert_eq!(model.output_model(), &array![[1.0, 0.0]]);
        assert_eq!(model.initial_state(), &array![60.0, 10.0]);
        assert_eq!(model.initial_estimate(), &array![10.0, 0.0]);
        assert_eq!(model.steps(), 500);
        assert_eq!(model.get_state_dimension(), 2);
        assert_eq!(model.get_measurement_dimension(), 1);
        assert!(model.is_noisy());
        assert_eq!(model.sensor_deviation(), array![10.0_f64.sqrt()]);
    }

    #[test]
    fn test_linear_model() {
        let model = ModelDefinition::linear(&LinearParameters::default()).unwrap();

        assert_eq!(model.name(), "kalmanFilterSimulation");
        assert_eq!(model.forward_model(), &array![[1.0, 1.0], [0.0, 1.0]]);
        assert!(model.control().is_none());
        assert_eq!(model.output_model(), &Matrix::eye(2));
        assert_eq!(model.initial_state(), &array![0.0, 1.0]);
        assert_eq!(model.initial_estimate(), &array![0.0, 0.0]);
        assert_eq!(model.steps(), 50);
        assert!(!model.is_noisy());
    }

    #[test]
    fn test_forward_and_measure() {
        let model = ModelDefinition::kinematic(&KinematicParameters::default()).unwrap();
        let next = model.forward(&array![60.0, 10.0]);

        assert_eq!(next[0], 60.0 + 0.01 * 10.0 + (-0.5 * 0.01 * 0.01) * 5.0);
        assert_eq!(next[1], 10.0 + (-0.01) * 5.0);
        assert_eq!(model.measure(&next), array![next[0]]);
    }

    #[test]
    fn test_time_labels() {
        let kinematic = ModelDefinition::kinematic(&KinematicParameters::default()).unwrap();
        let labels = kinematic.time_labels();
        assert_eq!(labels.len(), 500);
        assert_eq!(labels[0], 0.01);
        assert_eq!(labels[499], 0.01 * 500.0);

        let linear = ModelDefinition::linear(&LinearParameters::default()).unwrap();
        assert_eq!(linear.time_labels()[..3], [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_builder_defaults() {
        let model = ModelDefinition::builder("plain", array![[1.0, 0.0], [0.0, 1.0]])
            .build()
            .unwrap();

        assert_eq!(model.output_model(), &Matrix::eye(2));
        assert_eq!(model.sensor_noise(), &Matrix::zeros((2, 2)));
        assert_eq!(model.initial_covariance(), &Matrix::eye(2));
        assert_eq!(model.steps(), 2);
        assert_eq!(model.dt(), None);
    }

    #[test]
    fn test_invalid_models() {
        let a = array![[1.0, 1.0], [0.0, 1.0]];
        let rejected = [
            ModelDefinition::builder("non-square", array![[1.0, 1.0]]).build(),
            ModelDefinition::builder("q", a.clone()).process_noise(Matrix::eye(3)).build(),
            ModelDefinition::builder("c", a.clone()).output_model(array![[1.0, 0.0, 0.0]]).build(),
            ModelDefinition::builder("x0", a.clone()).initial_state(array![1.0]).build(),
            ModelDefinition::builder("steps", a.clone()).steps(1).build(),
            ModelDefinition::builder("dt", a.clone()).dt(0.0).build(),
            ModelDefinition::builder("nan", a.clone()).initial_estimate(array![f64::NAN, 0.0]).build(),
            ModelDefinition::builder("r", a.clone())
                .sensor_noise(array![[-1.0, 0.0], [0.0, 1.0]])
                .build(),
            ModelDefinition::builder("p", a.clone())
                .initial_covariance(array![[1.0, 2.0], [0.0, 1.0]])
                .build(),
            ModelDefinition::builder("gain", a.clone())
                .control(array![[1.0]], array![1.0])
                .build(),
            ModelDefinition::builder("input", a.clone())
                .control(array![[1.0], [0.0]], array![1.0, 2.0])
                .build(),
            ModelDefinition::builder("scalar", a.clone())
                .output_model(array![[1.0, 0.0]])
                .sensor_noise(array![[0.0]])
                .build(),
        ];

        for result in rejected {
            assert!(matches!(result, Err(Error::InvalidModel(_))));
        }
    }

    #[test]
    fn test_kinematic_rejects_zero_variance() {
        let parameters = KinematicParameters {
            r: 0.0,
            ..KinematicParameters::default()
        };
        assert!(matches!(
            ModelDefinition::kinematic(&parameters),
            Err(Error::InvalidModel(_))
        ));
    }
}
