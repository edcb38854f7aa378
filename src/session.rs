use log::{info, warn};

use crate::error::{Error, Result};
use crate::export::Export;
use crate::simulation::{simulate, NoiseSource, RunResult};
use crate::tracking::ModelDefinition;

/// A model together with its exported procedure and the latest run.
///
/// Running is only allowed once the procedure has been generated for the
/// current model.
#[derive(Clone, Debug)]
pub struct Session {
    model: ModelDefinition,
    export: Option<Export>,
    last_result: Option<RunResult>,
}

impl Session {
    pub fn new(model: ModelDefinition) -> Self {
        Self {
            model,
            export: None,
            last_result: None,
        }
    }

    pub fn model(&self) -> &ModelDefinition {
        &self.model
    }

    /// Replace the model, discarding the generated procedure and last result.
    pub fn set_model(&mut self, model: ModelDefinition) {
        info!("Switching session to '{}'", model.name());
        self.model = model;
        self.export = None;
        self.last_result = None;
    }

    pub fn generate(&mut self) -> &Export {
        self.export.insert(Export::for_model(&self.model))
    }

    pub fn export(&self) -> Option<&Export> {
        self.export.as_ref()
    }

    pub fn run(&mut self, noise: &mut impl NoiseSource) -> Result<&RunResult> {
        if self.export.is_none() {
            warn!("Run of '{}' requested before generating the code", self.model.name());
            return Err(Error::Precondition("Please generate the code first.".to_string()));
        }

        let result = simulate(&self.model, noise)?;
        info!("Finished run of '{}' over {} steps", self.model.name(), result.len());
        Ok(self.last_result.insert(result))
    }

    pub fn last_result(&self) -> Option<&RunResult> {
        self.last_result.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KinematicParameters, LinearParameters};
    use crate::simulation::SeededNoise;

    fn kinematic() -> ModelDefinition {
        ModelDefinition::kinematic(&KinematicParameters::default()).unwrap()
    }

    #[test]
    fn test_run_requires_generate() {
        let mut session = Session::new(kinematic());

        let error = session.run(&mut SeededNoise::from_seed(0)).unwrap_err();
        assert!(matches!(error, Error::Precondition(_)));
        assert_eq!(error.to_string(), "Please generate the code first.");
        assert!(session.export().is_none());
        assert!(session.last_result().is_none());
    }

    #[test]
    fn test_generate_then_run() {
        let mut session = Session::new(kinematic());
        assert_eq!(session.generate().file_name, "kalmanFilterEstimation.m");

        let result = session.run(&mut SeededNoise::from_seed(4)).unwrap().clone();
        assert_eq!(result, simulate(&kinematic(), &mut SeededNoise::from_seed(4)).unwrap());
        assert_eq!(session.last_result(), Some(&result));

        // Generating once allows any number of runs
        let again = session.run(&mut SeededNoise::from_seed(5)).unwrap().clone();
        assert_ne!(again.measurements, result.measurements);
    }

    #[test]
    fn test_new_model_clears_state() {
        let mut session = Session::new(kinematic());
        session.generate();
        session.run(&mut SeededNoise::from_seed(1)).unwrap();

        session.set_model(ModelDefinition::linear(&LinearParameters::default()).unwrap());
        assert!(session.export().is_none());
        assert!(session.last_result().is_none());
        assert!(matches!(
            session.run(&mut SeededNoise::from_seed(1)),
            Err(Error::Precondition(_))
        ));

        assert_eq!(session.generate().file_name, "kalmanFilterSimulation.m");
        assert_eq!(session.run(&mut SeededNoise::from_seed(1)).unwrap().len(), 50);
    }
}
