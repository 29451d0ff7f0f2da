//! TOML registration source for fieldgate.
//!
//! A configuration document declares entity schemas, global exclusions
//! and policies. [`FieldGateConfig::apply`] registers them into a
//! [`fieldgate::PolicyRegistry`] in that order, so policies can reference
//! every entity declared in the same document.
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [projection]
//! max_depth = 3
//!
//! [[entities]]
//! name = "Product"
//! fields = [{ name = "Id", type = "integer" }, { name = "Name", type = "string" }]
//!
//! [exclusions]
//! Product = ["Color"]
//!
//! [[policies]]
//! entity = "Product"
//! name = "Public"
//!
//! [policies.roles.Default]
//! fields = ["Id", "Name"]
//! order_by = ["Name"]
//! filters = [{ field = "Name", operations = ["equals", "contains"] }]
//! ```

pub mod loader;
pub mod model;

pub use loader::{ApplySummary, load_file};
pub use model::{
    FieldGateConfig, FilterConfig, LoggingConfig, NestedConfig, PolicyConfig, ProjectionConfig,
    RoleConfig,
};

/// Error types for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Policy error: {0}")]
    Policy(#[from] fieldgate::PolicyError),
}

impl ConfigError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
