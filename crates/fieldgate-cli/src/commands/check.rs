use anyhow::{Result, anyhow};
use fieldgate::{FilterOperation, FilterRequest, OrderRequest, SortDirection};
use serde_json::{Value, json};

use crate::cli::{CheckFilterArgs, CheckOrderArgs, OutputFormat};
use crate::commands::Session;
use crate::output::{print_json, print_success};

pub fn check_order(session: &Session, args: &CheckOrderArgs, format: OutputFormat) -> Result<()> {
    let direction = if args.desc {
        SortDirection::Descending
    } else {
        SortDirection::Ascending
    };
    let key = session.engine.validate_order(
        &args.entity,
        &args.policy,
        &args.role,
        &OrderRequest::new(&args.field, direction),
    )?;
    match format {
        OutputFormat::Json => print_json(&key)?,
        OutputFormat::Text | OutputFormat::Table => {
            print_success(&format!("Ordering by {key} is allowed for role {}", args.role))
        }
    }
    Ok(())
}

pub fn check_filter(session: &Session, args: &CheckFilterArgs, format: OutputFormat) -> Result<()> {
    let operation = parse_operation(&args.operation)?;
    let value = args.value.as_deref().map(parse_value).unwrap_or(Value::Null);
    let filter = session.engine.validate_filter(
        &args.entity,
        &args.policy,
        &args.role,
        &FilterRequest::new(&args.field, operation, value),
    )?;
    match format {
        OutputFormat::Json => print_json(&json!({
            "field": filter.field,
            "field_type": filter.field_type.as_str(),
            "operation": filter.operation.as_str(),
            "predicate": filter.to_predicate(),
        }))?,
        OutputFormat::Text | OutputFormat::Table => print_success(&format!(
            "Filter {} {} is allowed for role {}",
            filter.field,
            filter.operation.as_str(),
            args.role
        )),
    }
    Ok(())
}

fn parse_operation(name: &str) -> Result<FilterOperation> {
    FilterOperation::parse(name).ok_or_else(|| {
        let known: Vec<&str> = FilterOperation::ALL.iter().map(|op| op.as_str()).collect();
        anyhow!("unknown filter operation '{name}'. Valid operations: {}", known.join(", "))
    })
}

/// JSON when it parses, a plain string otherwise.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures;
    use fieldgate::DEFAULT_ROLE;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("10"), json!(10));
        assert_eq!(parse_value("[1, 2]"), json!([1, 2]));
        assert_eq!(parse_value("red"), json!("red"));
    }

    #[test]
    fn test_parse_operation() {
        assert_eq!(parse_operation("gt").unwrap(), FilterOperation::GreaterThan);
        let err = parse_operation("like").unwrap_err();
        assert!(err.to_string().contains("starts_with"));
    }

    fn order_args(field: &str) -> CheckOrderArgs {
        CheckOrderArgs {
            entity: "Product".to_string(),
            policy: "Public".to_string(),
            field: field.to_string(),
            role: DEFAULT_ROLE.to_string(),
            desc: false,
        }
    }

    #[test]
    fn test_check_order() {
        let session = fixtures::session();
        check_order(&session, &order_args("price"), OutputFormat::Text).unwrap();

        let err = check_order(&session, &order_args("Name"), OutputFormat::Text).unwrap_err();
        assert!(err.downcast_ref::<fieldgate::PolicyError>().is_some_and(|e| e.is_access_denied()));
    }

    #[test]
    fn test_check_filter() {
        let session = fixtures::session();
        let args = CheckFilterArgs {
            entity: "Product".to_string(),
            policy: "Public".to_string(),
            field: "Name".to_string(),
            operation: "contains".to_string(),
            value: Some("wid".to_string()),
            role: DEFAULT_ROLE.to_string(),
        };
        check_filter(&session, &args, OutputFormat::Json).unwrap();

        let args = CheckFilterArgs {
            operation: "gt".to_string(),
            ..args
        };
        assert!(check_filter(&session, &args, OutputFormat::Text).is_err());
    }
}
