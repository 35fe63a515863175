pub mod closure;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod emitter;
pub mod error;
pub mod extensions;
pub mod header;
pub mod module_registry;
pub mod orchestrator;
pub mod resolver;
pub mod sandbox;
pub mod scanner;
pub mod sources;
pub mod transform;

pub use config::{Config, ProjectConfig};
pub use emitter::BuildOutput;
pub use error::{BuildError, Result};
pub use orchestrator::{BuildResult, Bundler};
