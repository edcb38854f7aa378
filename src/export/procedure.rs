//! Statement form of one complete run.
//!
//! A [`Procedure`] describes truth propagation, measurement generation, the
//! filter loop and the error series as a short list of assignments over the
//! shared algebra. It is built from the model shape alone; rendering it gives
//! the exported text and executing it gives an independent re-run.

use std::collections::HashMap;

use log::debug;
use ndarray::s;

use super::render;
use crate::error::{Error, Result};
use crate::simulation::sampler::NoiseSource;
use crate::simulation::RunResult;
use crate::tracking::algebra::{add, identity, inverse, multiply, subtract, transpose};
use crate::tracking::{Matrix, ModelDefinition, Vector};

/// Column of a series relative to the loop counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Index {
    First,
    Current,
    Previous,
}

impl Index {
    fn resolve(self, k: usize) -> usize {
        match self {
            Index::First => 0,
            Index::Current => k,
            Index::Previous => k - 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Var(&'static str),
    Column(&'static str, Index),
    Product(Box<Expr>, Box<Expr>),
    Sum(Box<Expr>, Box<Expr>),
    Difference(Box<Expr>, Box<Expr>),
    Transpose(Box<Expr>),
    Inverse(Box<Expr>),
    Identity(usize),
    /// `sigma .* n` with one fresh standard normal per entry of `sigma`.
    Noise(&'static str),
}

fn var(name: &'static str) -> Expr {
    Expr::Var(name)
}

fn column(name: &'static str, index: Index) -> Expr {
    Expr::Column(name, index)
}

fn product(left: Expr, right: Expr) -> Expr {
    Expr::Product(Box::new(left), Box::new(right))
}

fn sum(left: Expr, right: Expr) -> Expr {
    Expr::Sum(Box::new(left), Box::new(right))
}

fn difference(left: Expr, right: Expr) -> Expr {
    Expr::Difference(Box::new(left), Box::new(right))
}

fn transposed(inner: Expr) -> Expr {
    Expr::Transpose(Box::new(inner))
}

fn inverted(inner: Expr) -> Expr {
    Expr::Inverse(Box::new(inner))
}

#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    Var(&'static str),
    Column(&'static str, Index),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Comment(&'static str),
    /// A `rows × N` series of zeros.
    Allocate { name: &'static str, rows: usize },
    Assign { target: Target, value: Expr },
    /// Body runs for every step `k` from `from` to `N - 1`.
    Loop { from: usize, body: Vec<Statement> },
}

fn assign(name: &'static str, value: Expr) -> Statement {
    Statement::Assign {
        target: Target::Var(name),
        value,
    }
}

fn assign_column(name: &'static str, index: Index, value: Expr) -> Statement {
    Statement::Assign {
        target: Target::Column(name, index),
        value,
    }
}

#[derive(Clone, Debug)]
pub struct Procedure {
    model: ModelDefinition,
    statements: Vec<Statement>,
}

impl Procedure {
    pub fn for_model(model: &ModelDefinition) -> Self {
        let n = model.get_state_dimension();
        let m = model.get_measurement_dimension();

        // A·x (+ G·u) for the given state column
        let forward = |state: Expr| match model.control() {
            Some(_) => sum(product(var("A"), state), product(var("G"), var("u"))),
            None => product(var("A"), state),
        };

        let mut measurement = product(var("C"), column("x_true", Index::Current));
        if model.is_noisy() {
            measurement = sum(measurement, Expr::Noise("sigma"));
        }

        let statements = vec![
            Statement::Comment("True states"),
            Statement::Allocate { name: "x_true", rows: n },
            assign_column("x_true", Index::First, var("x0")),
            Statement::Loop {
                from: 1,
                body: vec![assign_column(
                    "x_true",
                    Index::Current,
                    forward(column("x_true", Index::Previous)),
                )],
            },
            Statement::Comment("Measurements"),
            Statement::Allocate { name: "z", rows: m },
            Statement::Loop {
                from: 0,
                body: vec![assign_column("z", Index::Current, measurement)],
            },
            Statement::Comment("Kalman filter"),
            Statement::Allocate { name: "x_est", rows: n },
            assign_column("x_est", Index::First, var("x0_est")),
            assign("P", var("P0")),
            Statement::Loop {
                from: 1,
                body: vec![
                    Statement::Comment("Prediction"),
                    assign("x_pred", forward(column("x_est", Index::Previous))),
                    assign(
                        "P_pred",
                        sum(product(product(var("A"), var("P")), transposed(var("A"))), var("Q")),
                    ),
                    Statement::Comment("Kalman gain"),
                    assign(
                        "S",
                        sum(product(product(var("C"), var("P_pred")), transposed(var("C"))), var("R")),
                    ),
                    assign(
                        "K",
                        product(product(var("P_pred"), transposed(var("C"))), inverted(var("S"))),
                    ),
                    Statement::Comment("Update"),
                    assign(
                        "innovation",
                        difference(column("z", Index::Current), product(var("C"), var("x_pred"))),
                    ),
                    assign_column(
                        "x_est",
                        Index::Current,
                        sum(var("x_pred"), product(var("K"), var("innovation"))),
                    ),
                    assign(
                        "P",
                        product(difference(Expr::Identity(n), product(var("K"), var("C"))), var("P_pred")),
                    ),
                ],
            },
            Statement::Comment("Errors"),
            assign("err", difference(var("x_est"), var("x_true"))),
        ];

        Self {
            model: model.clone(),
            statements,
        }
    }

    pub fn model(&self) -> &ModelDefinition {
        &self.model
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// The procedure as ".m" source text.
    pub fn render(&self) -> String {
        render::render(self)
    }

    /// Named constants bound before the first statement.
    pub fn constants(&self) -> Vec<(&'static str, Matrix)> {
        let model = &self.model;
        let mut constants = vec![("A", model.forward_model().clone())];
        if let Some(control) = model.control() {
            constants.push(("G", control.gain.clone()));
            constants.push(("u", as_column(&control.input)));
        }
        constants.extend([
            ("C", model.output_model().clone()),
            ("Q", model.process_noise().clone()),
            ("R", model.sensor_noise().clone()),
            ("x0", as_column(model.initial_state())),
            ("x0_est", as_column(model.initial_estimate())),
            ("P0", model.initial_covariance().clone()),
        ]);
        constants
    }

    /// Run the statements with fresh noise and collect the series.
    pub fn execute(&self, noise: &mut impl NoiseSource) -> Result<RunResult> {
        let mut environment = Environment {
            steps: self.model.steps(),
            values: self.constants().into_iter().collect(),
            noise,
        };
        if self.model.is_noisy() {
            environment
                .values
                .insert("sigma", as_column(&self.model.sensor_deviation()));
        }

        environment.run(&self.statements, 0)?;
        debug!("Executed procedure '{}'", self.model.name());

        let columns = |name: &'static str| -> Result<Vec<Vector>> {
            let series = environment.get(name)?;
            Ok(series.columns().into_iter().map(|c| c.to_owned()).collect())
        };

        Ok(RunResult {
            time: self.model.time_labels(),
            measurements: columns("z")?,
            trajectory: columns("x_true")?,
            estimates: columns("x_est")?,
            errors: columns("err")?,
            final_covariance: environment.get("P")?.clone(),
        })
    }
}

fn as_column(vector: &Vector) -> Matrix {
    vector.clone().insert_axis(ndarray::Axis(1))
}

struct Environment<'n, N: NoiseSource> {
    steps: usize,
    values: HashMap<&'static str, Matrix>,
    noise: &'n mut N,
}

impl<N: NoiseSource> Environment<'_, N> {
    fn get(&self, name: &str) -> Result<&Matrix> {
        self.values
            .get(name)
            .ok_or_else(|| Error::InvalidModel(format!("procedure reads undefined '{name}'")))
    }

    fn run(&mut self, statements: &[Statement], k: usize) -> Result<()> {
        for statement in statements {
            match statement {
                Statement::Comment(_) => {}
                Statement::Allocate { name, rows } => {
                    self.values.insert(*name, Matrix::zeros((*rows, self.steps)));
                }
                Statement::Assign { target, value } => {
                    let value = self.evaluate(value, k).map_err(|error| error.at_step(k))?;
                    match target {
                        Target::Var(name) => {
                            self.values.insert(*name, value);
                        }
                        Target::Column(name, index) => {
                            let series = self
                                .values
                                .get_mut(name)
                                .ok_or_else(|| Error::InvalidModel(format!("procedure writes undefined '{name}'")))?;
                            series.column_mut(index.resolve(k)).assign(&value.column(0));
                        }
                    }
                }
                Statement::Loop { from, body } => {
                    for step in *from..self.steps {
                        self.run(body, step)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn evaluate(&mut self, expr: &Expr, k: usize) -> Result<Matrix> {
        Ok(match expr {
            Expr::Var(name) => self.get(name)?.clone(),
            Expr::Column(name, index) => {
                let column = index.resolve(k);
                self.get(name)?.slice(s![.., column..column + 1]).to_owned()
            }
            Expr::Product(left, right) => {
                let left = self.evaluate(left, k)?;
                multiply(&left, &self.evaluate(right, k)?)
            }
            Expr::Sum(left, right) => {
                let left = self.evaluate(left, k)?;
                add(&left, &self.evaluate(right, k)?)
            }
            Expr::Difference(left, right) => {
                let left = self.evaluate(left, k)?;
                subtract(&left, &self.evaluate(right, k)?)
            }
            Expr::Transpose(inner) => transpose(&self.evaluate(inner, k)?),
            Expr::Inverse(inner) => inverse(&self.evaluate(inner, k)?)?,
            Expr::Identity(n) => identity(*n),
            Expr::Noise(name) => {
                let sigma = self.get(name)?.clone();
                let noise = &mut self.noise;
                sigma.mapv(|deviation| deviation * noise.standard_normal())
            }
        })
    }
}
