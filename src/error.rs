use thiserror::Error;

/// Errors surfaced by model construction, the recursion and the workbench.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Precondition(String),

    #[error("{}", singular_message(.step, .determinant))]
    SingularMatrix {
        step: Option<usize>,
        determinant: f64,
    },

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Attach the index of the filter step to a singular matrix failure.
    pub fn at_step(self, step: usize) -> Self {
        match self {
            Error::SingularMatrix { determinant, .. } => Error::SingularMatrix {
                step: Some(step),
                determinant,
            },
            other => other,
        }
    }

    pub fn is_singular(&self) -> bool {
        matches!(self, Error::SingularMatrix { .. })
    }
}

fn singular_message(step: &Option<usize>, determinant: &f64) -> String {
    match step {
        Some(step) => format!("Singular matrix at step {step} (determinant {determinant:e})"),
        None => format!("Singular matrix (determinant {determinant:e})"),
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn test_at_step() {
        let error = Error::SingularMatrix {
            step: None,
            determinant: 0.0,
        }
        .at_step(7);

        assert!(matches!(error, Error::SingularMatrix { step: Some(7), .. }));
        assert!(error.is_singular());
        assert_eq!(error.to_string(), "Singular matrix at step 7 (determinant 0e0)");
    }

    #[test]
    fn test_at_step_keeps_other_errors() {
        let error = Error::InvalidModel("N must be at least 2".to_string()).at_step(3);
        assert_eq!(error.to_string(), "Invalid model: N must be at least 2");
        assert!(!error.is_singular());
    }
}
