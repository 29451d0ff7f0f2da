use anyhow::Result;
use colored::Colorize;
use fieldgate::{DebugSnapshot, PolicySummary};
use serde::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

fn joined(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

pub fn policies_table(policies: &[PolicySummary]) -> String {
    if policies.is_empty() {
        return "No policies registered.".to_string();
    }
    let mut builder = Builder::default();
    builder.push_record(["Entity", "Policy", "Roles"]);
    for summary in policies {
        builder.push_record([
            summary.entity_type.clone(),
            summary.policy.clone(),
            joined(&summary.roles),
        ]);
    }
    builder.build().with(Style::rounded()).to_string()
}

pub fn policies_text(policies: &[PolicySummary]) -> String {
    if policies.is_empty() {
        return "No policies registered.".to_string();
    }
    policies
        .iter()
        .map(|summary| {
            format!(
                "{}/{}: {}",
                summary.entity_type,
                summary.policy,
                joined(&summary.roles)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn snapshot_table(snapshot: &DebugSnapshot) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Section", "Entries"]);
    builder.push_record(["Allowed fields".to_string(), joined(&snapshot.allowed_fields)]);
    for nested in &snapshot.nested_fields {
        let label = if nested.has_condition {
            format!("Nested {} (conditional)", nested.navigation)
        } else {
            format!("Nested {}", nested.navigation)
        };
        builder.push_record([label, joined(&nested.fields)]);
    }
    builder.push_record(["Order by".to_string(), joined(&snapshot.order_by_fields)]);
    for filter in &snapshot.filters {
        builder.push_record([
            format!("Filter {} ({})", filter.field, filter.field_type),
            joined(&filter.operations),
        ]);
    }
    builder.push_record([
        "Global exclusions".to_string(),
        joined(&snapshot.global_exclusions),
    ]);
    builder.push_record([
        "Role exclusions".to_string(),
        joined(&snapshot.role_exclusions),
    ]);
    builder.build().with(Style::rounded()).to_string()
}
