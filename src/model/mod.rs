pub mod config;
pub mod model_metadata;
pub mod model_storage;

pub use config::{AppConfig, CollectionSettings, TrainingSettings};
pub use model_metadata::BundleMetadata;
pub use model_storage::{list_model_versions, load_bundle, load_metadata, save_bundle};
