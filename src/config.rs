//! Parameter catalogues for the two model families.
//!
//! Each adjustable scalar has a documented range and step granularity. Front
//! ends clamp user input with [`ParameterSpec::clamp`] before assembling a
//! [`crate::tracking::ModelDefinition`].

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ParameterSpec {
    pub id: &'static str,
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub default: f64,
}

impl ParameterSpec {
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.default;
        }
        value.clamp(self.min, self.max)
    }

    /// Clamp and round to the nearest multiple of `step` above `min`.
    pub fn snap(&self, value: f64) -> f64 {
        let clamped = self.clamp(value);
        let steps = ((clamped - self.min) / self.step).round();
        (self.min + steps * self.step).clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

pub fn find(catalogue: &[ParameterSpec], id: &str) -> Option<ParameterSpec> {
    catalogue.iter().find(|spec| spec.id == id).copied()
}

const fn spec(id: &'static str, label: &'static str, min: f64, max: f64, step: f64, default: f64) -> ParameterSpec {
    ParameterSpec { id, label, min, max, step, default }
}

pub const KINEMATIC_PARAMETERS: [ParameterSpec; 6] = [
    spec("N", "No. of time steps", 100.0, 1000.0, 1.0, 500.0),
    spec("dt", "Sampling time", 0.001, 0.01, 0.001, 0.01),
    spec("u", "U", 1.0, 10.0, 1.0, 5.0),
    spec("y0", "Initial position", 50.0, 100.0, 1.0, 60.0),
    spec("v0", "Velocity", 0.0, 100.0, 1.0, 10.0),
    spec("R", "Variance", 2.0, 100.0, 0.1, 10.0),
];

pub const LINEAR_PARAMETERS: [ParameterSpec; 9] = [
    spec("A00", "state_transition_matrix_00", -1.0, 1.0, 0.01, 1.0),
    spec("A01", "state_transition_matrix_01", -1.0, 1.0, 0.01, 1.0),
    spec("A10", "state_transition_matrix_10", -1.0, 1.0, 0.01, 0.0),
    spec("A11", "state_transition_matrix_11", -1.0, 1.0, 0.01, 1.0),
    spec("x0", "true_state_00", -1.0, 1.0, 0.001, 0.0),
    spec("x1", "true_state_01", -1.0, 1.0, 0.001, 1.0),
    spec("num_steps", "No.of time steps", 10.0, 100.0, 1.0, 50.0),
    spec("x0_est_0", "initial_state_estimate_00", -1.0, 1.0, 0.001, 0.0),
    spec("x0_est_1", "initial_state_estimate_01", -1.0, 1.0, 0.001, 0.0),
];

fn clamp_by_id(catalogue: &[ParameterSpec], id: &str, value: f64) -> f64 {
    find(catalogue, id).map_or(value, |spec| {
        if !spec.contains(value) {
            warn!("{} = {} outside [{}, {}], clamping", spec.id, value, spec.min, spec.max);
        }
        spec.clamp(value)
    })
}

/// Step counts land on the catalogue grid.
fn snap_by_id(catalogue: &[ParameterSpec], id: &str, value: usize) -> usize {
    let value = clamp_by_id(catalogue, id, value as f64);
    find(catalogue, id).map_or(value, |spec| spec.snap(value)).round() as usize
}

/// Inputs of the position/velocity model with a noisy position sensor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicParameters {
    pub steps: usize,
    pub dt: f64,
    pub u: f64,
    pub y0: f64,
    pub v0: f64,
    pub r: f64,
}

impl Default for KinematicParameters {
    fn default() -> Self {
        Self {
            steps: 500,
            dt: 0.01,
            u: 5.0,
            y0: 60.0,
            v0: 10.0,
            r: 10.0,
        }
    }
}

impl KinematicParameters {
    pub fn clamped(&self) -> Self {
        let c = |id, value| clamp_by_id(&KINEMATIC_PARAMETERS, id, value);
        Self {
            steps: snap_by_id(&KINEMATIC_PARAMETERS, "N", self.steps),
            dt: c("dt", self.dt),
            u: c("u", self.u),
            y0: c("y0", self.y0),
            v0: c("v0", self.v0),
            r: c("R", self.r),
        }
    }

    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }
}

/// Inputs of the generic two-state model with identity measurement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearParameters {
    pub a: [[f64; 2]; 2],
    pub x0: [f64; 2],
    pub x0_estimate: [f64; 2],
    pub steps: usize,
}

impl Default for LinearParameters {
    fn default() -> Self {
        Self {
            a: [[1.0, 1.0], [0.0, 1.0]],
            x0: [0.0, 1.0],
            x0_estimate: [0.0, 0.0],
            steps: 50,
        }
    }
}

impl LinearParameters {
    pub fn clamped(&self) -> Self {
        let c = |id, value| clamp_by_id(&LINEAR_PARAMETERS, id, value);
        Self {
            a: [
                [c("A00", self.a[0][0]), c("A01", self.a[0][1])],
                [c("A10", self.a[1][0]), c("A11", self.a[1][1])],
            ],
            x0: [c("x0", self.x0[0]), c("x1", self.x0[1])],
            x0_estimate: [c("x0_est_0", self.x0_estimate[0]), c("x0_est_1", self.x0_estimate[1])],
            steps: snap_by_id(&LINEAR_PARAMETERS, "num_steps", self.steps),
        }
    }

    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }
}
