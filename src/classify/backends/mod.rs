pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

use crate::config::ModelSettings;
use crate::error::PipelineError;

use super::backend::InferenceBackend;

/// Construct the backend named in `settings`, loading its model.
pub fn build_backend(settings: &ModelSettings) -> Result<Box<dyn InferenceBackend>, PipelineError> {
    match settings.backend.as_str() {
        "stub" => {
            let backend = match settings.stub_scores {
                Some(scores) => StubBackend::new(scores),
                None => StubBackend::default(),
            };
            Ok(Box::new(backend))
        }
        "tract" => {
            #[cfg(feature = "backend-tract")]
            {
                let backend = TractBackend::load(&settings.path, settings.layout)?;
                Ok(Box::new(backend))
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                Err(PipelineError::ModelLoad {
                    path: settings.path.display().to_string(),
                    reason: "tract backend requires the backend-tract feature".into(),
                })
            }
        }
        other => Err(PipelineError::ModelLoad {
            path: settings.path.display().to_string(),
            reason: format!("unknown backend '{}'", other),
        }),
    }
}
