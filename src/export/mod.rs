mod procedure;
mod render;

pub use crate::export::procedure::{Expr, Index, Procedure, Statement, Target};

use log::info;

use crate::tracking::ModelDefinition;

/// Exported procedure text with its suggested file name and a display-safe preview.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Export {
    pub file_name: String,
    pub source: String,
    pub preview_html: String,
}

impl Export {
    /// Pure function of the model; no run is involved.
    pub fn for_model(model: &ModelDefinition) -> Self {
        let source = Procedure::for_model(model).render();
        let export = Self::from_source(model.name(), source);
        info!("Exported '{}' ({} bytes)", export.file_name, export.source.len());
        export
    }

    fn from_source(name: &str, source: String) -> Self {
        Self {
            file_name: format!("{name}.m"),
            preview_html: format!("<pre>{}</pre>", escape_html(&source)),
            source,
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KinematicParameters, LinearParameters};

    #[test]
    fn test_file_names() {
        let kinematic = Export::for_model(&ModelDefinition::kinematic(&KinematicParameters::default()).unwrap());
        let linear = Export::for_model(&ModelDefinition::linear(&LinearParameters::default()).unwrap());

        assert_eq!(kinematic.file_name, "kalmanFilterEstimation.m");
        assert_eq!(linear.file_name, "kalmanFilterSimulation.m");
    }

    #[test]
    fn test_preview_is_escaped() {
        let export = Export::from_source("demo", "a = b' < c & d;\n".to_string());

        assert_eq!(export.preview_html, "<pre>a = b&#39; &lt; c &amp; d;\n</pre>");
        assert_eq!(export.source, "a = b' < c & d;\n");
    }

    #[test]
    fn test_export_depends_on_parameters_only() {
        let model = ModelDefinition::kinematic(&KinematicParameters::default()).unwrap();
        assert_eq!(Export::for_model(&model), Export::for_model(&model));

        let other = ModelDefinition::kinematic(&KinematicParameters {
            r: 20.0,
            ..KinematicParameters::default()
        })
        .unwrap();
        let changed = Export::for_model(&other);
        assert_ne!(Export::for_model(&model).source, changed.source);
        assert!(changed.source.contains("  R = [20.0];\n"));
    }
}
