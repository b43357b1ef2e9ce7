pub mod adapter;
pub mod comparator;
pub mod config;
pub mod evaluator;
pub mod executor;
pub mod reporter;
pub mod sandbox;

// Re-export the pieces the binaries wire together
pub use adapter::{adapter_for, AdapterError, EntryPoint, Invocation, LanguageAdapter};
pub use config::{LanguageConfig, LanguageConfigManager};
pub use executor::Grader;
pub use reporter::RenderedReport;
pub use sandbox::{DockerEngine, ExecutionEngine, ProcessEngine, Sandbox};
