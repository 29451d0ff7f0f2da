pub mod check;
pub mod inspect;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use fieldgate::{PolicyEngine, PolicyRegistry};
use fieldgate_config::{ApplySummary, FieldGateConfig};

/// A loaded configuration registered into a sealed registry.
pub struct Session {
    pub summary: ApplySummary,
    pub engine: PolicyEngine,
}

impl Session {
    pub fn from_config(config: &FieldGateConfig) -> Result<Self> {
        let registry = Arc::new(PolicyRegistry::new());
        let summary = config
            .apply(&registry)
            .context("failed to register configuration")?;
        registry.seal();
        let engine = PolicyEngine::with_options(registry, config.engine_options());
        Ok(Self {
            summary,
            engine,
        })
    }
}

pub fn load_config(path: &Path) -> Result<FieldGateConfig> {
    fieldgate_config::load_file(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub const DOCUMENT: &str = r#"
[[entities]]
name = "Category"
fields = [{ name = "Name", type = "string" }]

[[entities]]
name = "Product"
fields = [
    { name = "Id", type = "integer" },
    { name = "Name", type = "string" },
    { name = "Price", type = "decimal" },
    { name = "Cost", type = "decimal", excluded = true },
]
navigations = [{ name = "Category", target = "Category" }]

[[policies]]
entity = "Product"
name = "Public"

[policies.roles.Default]
fields = ["Id", "Name", "Cost"]
order_by = ["Price"]
filters = [{ field = "Name", operations = ["text"] }]
nested = [{ navigation = "Category", fields = ["Name"] }]
"#;

    pub fn session() -> Session {
        Session::from_config(&FieldGateConfig::from_toml(DOCUMENT).unwrap()).unwrap()
    }
}
