//! Loading configuration files and applying them to a registry.

use std::path::Path;

use fieldgate::PolicyRegistry;
use serde::Serialize;
use tracing::{debug, info};

use crate::Result;
use crate::model::FieldGateConfig;

/// Counts of what [`FieldGateConfig::apply`] registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub entities: usize,
    pub exclusions: usize,
    pub policies: usize,
}

/// Read, parse and validate a configuration file.
pub fn load_file(path: impl AsRef<Path>) -> Result<FieldGateConfig> {
    let path = path.as_ref();
    debug!("Loading configuration from {:?}", path);
    let content = std::fs::read_to_string(path)?;
    let config = FieldGateConfig::from_toml(&content)?;
    config.validate()?;
    info!(
        path = %path.display(),
        entities = config.entities.len(),
        policies = config.policies.len(),
        "configuration loaded"
    );
    Ok(config)
}

impl FieldGateConfig {
    /// Register schemas, then exclusions, then policies, in document order.
    ///
    /// Stops at the first failing registration; registrations made before
    /// it stay in place.
    pub fn apply(&self, registry: &PolicyRegistry) -> Result<ApplySummary> {
        let mut summary = ApplySummary::default();

        for schema in &self.entities {
            registry.register_entity(schema.clone())?;
            summary.entities += 1;
        }
        for (entity, fields) in &self.exclusions {
            for field in fields {
                registry.exclude_field(entity, field)?;
                summary.exclusions += 1;
            }
        }
        for definition in self.policy_definitions()? {
            registry.register_policy(definition)?;
            summary.policies += 1;
        }

        info!(
            entities = summary.entities,
            exclusions = summary.exclusions,
            policies = summary.policies,
            "configuration applied"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigError;

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = load_file("/nonexistent/fieldgate.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_apply_reports_policy_errors() {
        let config = FieldGateConfig::from_toml(
            r#"
[[policies]]
entity = "Product"
name = "Public"
[policies.roles.Default]
fields = ["Id"]
"#,
        )
        .unwrap();

        let err = config.apply(&PolicyRegistry::new()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Policy(fieldgate::PolicyError::UnknownEntity { .. })
        ));
    }
}
