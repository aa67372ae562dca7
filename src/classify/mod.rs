mod backend;
pub mod backends;
mod classifier;
mod result;

pub use backend::InferenceBackend;
pub use backends::{build_backend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use classifier::{argmax, check_threshold, decide, Classifier};
pub use result::{ClassLabel, Classification, ProbabilityVector, TensorLayout};
