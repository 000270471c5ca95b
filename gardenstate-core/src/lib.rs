pub mod config;
pub mod db;
pub mod error;
pub mod generation;
pub mod ipc;
pub mod models;
pub mod store;

pub use config::GardenConfig;
pub use error::GardenError;
pub use generation::{GeminiConfig, GeminiGenerationClient, GenerationBackend, GenerationError, Part};
pub use store::{DocumentStore, MemoryStore, PgStore, StoreError};
