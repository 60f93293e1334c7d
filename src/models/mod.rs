pub mod backend;
pub mod catalog;
pub mod fetch;
pub mod handle;
pub mod registry;

pub use backend::{CommandModel, CommandModelFactory};
pub use catalog::{Catalog, ModelInfo, MODELS};
pub use fetch::{format_bytes, FetchedModel, ModelFetcher};
pub use handle::{ModelHandle, SpeechModel};
pub use registry::{ModelFactory, ModelRegistry};
