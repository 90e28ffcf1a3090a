pub mod ml_model;
pub mod training;
pub mod inference;
pub mod backend;

pub use ml_model::{BreedClassifier, FeatureExtractor, ModelConfig};
pub use training::{train_model, BreedBatcher, BreedDataset, TrainingRequest};
pub use inference::{BreedModel, InferenceEngine};
pub use backend::{load_engine, train_on};
