//! Configuration document model.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use fieldgate::policy::DEFAULT_NESTED_DEPTH;
use fieldgate::projection::DEFAULT_MAX_DEPTH;
use fieldgate::{
    EngineOptions, EntitySchema, FilterOperation, FilterOperations, NestedDefinition,
    PolicyDefinition, Predicate, RoleDefinition,
};

use crate::{ConfigError, Result};

/// Largest projection depth a document may request.
pub const MAX_PROJECTION_DEPTH: usize = 16;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A complete configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldGateConfig {
    pub logging: LoggingConfig,
    pub projection: ProjectionConfig,
    pub entities: Vec<EntitySchema>,
    /// Entity type to globally excluded field names.
    pub exclusions: IndexMap<String, Vec<String>>,
    pub policies: Vec<PolicyConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub max_depth: usize,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub entity: String,
    pub name: String,
    #[serde(default)]
    pub roles: IndexMap<String, RoleConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleConfig {
    pub fields: Vec<String>,
    pub order_by: Vec<String>,
    pub exclude: Vec<String>,
    pub filters: Vec<FilterConfig>,
    pub nested: Vec<NestedConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub field: String,
    /// Operator or composite names (`text`, `comparison`, `equality`,
    /// `all`). Omitted means the defaults for the field's type.
    #[serde(default)]
    pub operations: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedConfig {
    pub navigation: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub condition: Option<Predicate>,
}

impl FieldGateConfig {
    /// Parse from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| ConfigError::parse(format!("TOML parse error: {e}")))
    }

    /// Serialize to a TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::parse(format!("TOML serialize error: {e}")))
    }

    /// Check values that the registry itself does not check.
    pub fn validate(&self) -> Result<()> {
        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::validation(format!(
                "logging.level '{}' is not one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        let depth = self.projection.max_depth;
        if depth == 0 || depth > MAX_PROJECTION_DEPTH {
            return Err(ConfigError::validation(format!(
                "projection.max_depth must be between 1 and {MAX_PROJECTION_DEPTH}, got {depth}"
            )));
        }

        for (entity, fields) in &self.exclusions {
            if fields.iter().any(|f| f.trim().is_empty()) {
                return Err(ConfigError::validation(format!(
                    "exclusions for '{entity}' contain an empty field name"
                )));
            }
        }

        for policy in &self.policies {
            if policy.roles.is_empty() {
                return Err(ConfigError::validation(format!(
                    "policy '{}' for '{}' declares no roles",
                    policy.name, policy.entity
                )));
            }
            for (role, config) in &policy.roles {
                for filter in &config.filters {
                    if let Some(operations) = &filter.operations {
                        parse_operations(operations).map_err(|e| {
                            ConfigError::validation(format!(
                                "policy '{}' role '{role}' filter '{}': {e}",
                                policy.name, filter.field
                            ))
                        })?;
                    }
                }
                for nested in &config.nested {
                    if nested.max_depth == Some(0) {
                        return Err(ConfigError::validation(format!(
                            "policy '{}' role '{role}' nested '{}': max_depth must be at least 1",
                            policy.name, nested.navigation
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            max_depth: self.projection.max_depth,
        }
    }

    /// Policy definitions in document order.
    pub fn policy_definitions(&self) -> Result<Vec<PolicyDefinition>> {
        self.policies.iter().map(PolicyConfig::definition).collect()
    }
}

impl PolicyConfig {
    pub fn definition(&self) -> Result<PolicyDefinition> {
        let mut definition = PolicyDefinition::new(&self.entity, &self.name);
        for (role, config) in &self.roles {
            definition = definition.role(config.definition(role)?);
        }
        Ok(definition)
    }
}

impl RoleConfig {
    pub fn definition(&self, role: &str) -> Result<RoleDefinition> {
        let mut definition = RoleDefinition::new(role)
            .fields(self.fields.iter().cloned())
            .order_by(self.order_by.iter().cloned())
            .exclude(self.exclude.iter().cloned());
        for filter in &self.filters {
            definition = match &filter.operations {
                Some(operations) => {
                    definition.filter(&filter.field, parse_operations(operations)?)
                }
                None => definition.filter_defaults(&filter.field),
            };
        }
        for nested in &self.nested {
            let mut rule = NestedDefinition::new(&nested.navigation)
                .fields(nested.fields.iter().cloned())
                .max_depth(nested.max_depth.unwrap_or(DEFAULT_NESTED_DEPTH));
            if let Some(condition) = &nested.condition {
                rule = rule.when(condition.clone());
            }
            definition = definition.nested(rule);
        }
        Ok(definition)
    }
}

/// Parse operator names and composite set names into one set.
pub fn parse_operations(names: &[String]) -> Result<FilterOperations> {
    let mut operations = FilterOperations::empty();
    for name in names {
        operations |= match name.to_ascii_lowercase().as_str() {
            "equality" => FilterOperations::EQUALITY,
            "text" => FilterOperations::TEXT,
            "comparison" => FilterOperations::COMPARISON,
            "all" => FilterOperations::all(),
            other => FilterOperation::parse(other)
                .map(FilterOperation::flag)
                .ok_or_else(|| ConfigError::parse(format!("unknown filter operation '{name}'")))?,
        };
    }
    Ok(operations)
}
