//! Integration tests: configuration files into a working engine.

use std::io::Write;
use std::sync::Arc;

use fieldgate::{DEFAULT_ROLE, PolicyEngine, PolicyRegistry, SortDirection};
use fieldgate_config::{ApplySummary, ConfigError, load_file};
use tempfile::NamedTempFile;

const DOCUMENT: &str = r#"
[projection]
max_depth = 1

[[entities]]
name = "Category"
fields = [
    { name = "Id", type = "integer" },
    { name = "Name", type = "string" },
    { name = "Active", type = "boolean" },
]
navigations = [{ name = "Parent", target = "Category" }]

[[entities]]
name = "Product"
fields = [
    { name = "Id", type = "integer" },
    { name = "Name", type = "string" },
    { name = "Color", type = "string" },
    { name = "Price", type = "decimal" },
    { name = "Cost", type = "decimal", excluded = true },
]
navigations = [{ name = "Category", target = "Category", cardinality = "one" }]

[exclusions]
Product = ["Color"]

[[policies]]
entity = "Product"
name = "Public"

[policies.roles.Default]
fields = ["Id", "Name", "Color", "Cost"]
order_by = ["Name", "Color"]
filters = [{ field = "Price" }]
nested = [
    { navigation = "Category", fields = ["Name", "Parent.Name"], max_depth = 2, condition = { field = "Active", op = "equals", value = true } },
]
"#;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_config_file_into_registry() {
    let file = write_config(DOCUMENT);
    let config = load_file(file.path()).unwrap();

    let registry = Arc::new(PolicyRegistry::new());
    let summary = config.apply(&registry).unwrap();
    assert_eq!(
        summary,
        ApplySummary {
            entities: 2,
            exclusions: 1,
            policies: 1,
        }
    );
    registry.seal();

    let engine = PolicyEngine::with_options(registry, config.engine_options());
    assert_eq!(
        engine.allowed_fields("Product", "Public", DEFAULT_ROLE),
        vec!["Id", "Name", "Category.Name", "Category.Parent.Name"]
    );

    let resolved = engine.resolve("Product", "Public", DEFAULT_ROLE).unwrap();
    assert_eq!(resolved.order_by.to_vec(), vec!["Name"]);
    assert!(resolved.filter("price").is_some());

    // The engine-wide depth bound of 1 cuts the Parent hop.
    let projection = engine.projection("Product", "Public", DEFAULT_ROLE).unwrap();
    assert_eq!(projection.paths(), vec!["Id", "Name", "Category.Name"]);

    let err = engine
        .apply_ordering("Product", "Public", DEFAULT_ROLE, "Color", SortDirection::Ascending)
        .unwrap_err();
    assert!(err.is_access_denied());
}

#[test]
fn test_invalid_file_is_rejected_before_registration() {
    let file = write_config("[projection]\nmax_depth = 99\n");
    let err = load_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));

    let file = write_config("[[policies]\n");
    let err = load_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_unknown_policy_member_is_a_policy_error() {
    let file = write_config(
        r#"
[[entities]]
name = "Product"
fields = [{ name = "Id", type = "integer" }]

[[policies]]
entity = "Product"
name = "Public"
[policies.roles.Default]
fields = ["Id", "Price"]
"#,
    );
    let config = load_file(file.path()).unwrap();
    let registry = PolicyRegistry::new();

    let err = config.apply(&registry).unwrap_err();
    assert!(matches!(err, ConfigError::Policy(_)));
    assert!(err.to_string().contains("Price"));
    assert!(registry.snapshot().policy("Product", "Public").is_none());
}
