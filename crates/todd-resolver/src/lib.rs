pub mod error;
pub mod keywords;
pub mod resolver;
pub mod rules;
pub mod schema;

// Re-exports
pub use error::{ResolutionError, Result};
pub use keywords::{Category, Credentials, ParsedCommand};
pub use resolver::{
    IntentResolver, Resolution, ResolutionPreview, ResolutionSource, ResolveMode, ResolverConfig,
    WorkflowCatalog,
};
