use anyhow::Result;
use colored::Colorize;

use crate::cli::{InspectArgs, OutputFormat};
use crate::commands::Session;
use crate::output::{
    policies_table, policies_text, print_json, print_success, snapshot_table,
};

pub fn validate(session: &Session, format: OutputFormat) -> Result<()> {
    let summary = session.summary;
    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Text | OutputFormat::Table => print_success(&format!(
            "Configuration valid: {} entities, {} exclusions, {} policies",
            summary.entities, summary.exclusions, summary.policies
        )),
    }
    Ok(())
}

pub fn policies(session: &Session, format: OutputFormat) -> Result<()> {
    let policies = session.engine.inspector().policies();
    match format {
        OutputFormat::Json => print_json(&policies)?,
        OutputFormat::Table => println!("{}", policies_table(&policies)),
        OutputFormat::Text => println!("{}", policies_text(&policies)),
    }
    Ok(())
}

pub fn inspect(session: &Session, args: &InspectArgs, format: OutputFormat) -> Result<()> {
    let snapshot = session
        .engine
        .inspector()
        .snapshot(&args.entity, &args.policy, &args.role);
    match format {
        OutputFormat::Json => print_json(&snapshot)?,
        OutputFormat::Table => {
            println!(
                "{} {}/{} ({} {})",
                "Policy:".cyan(),
                snapshot.entity_type.cyan(),
                snapshot.policy.cyan(),
                "role".cyan(),
                snapshot.role.cyan()
            );
            println!("{}", snapshot_table(&snapshot));
        }
        OutputFormat::Text => println!("{snapshot}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::commands::fixtures;

    #[test]
    fn test_inspector_excludes_marked_fields() {
        let session = fixtures::session();
        let snapshot = session
            .engine
            .inspector()
            .snapshot("Product", "Public", fieldgate::DEFAULT_ROLE);
        assert_eq!(
            snapshot.allowed_fields,
            vec!["Id", "Name", "Category.Name"]
        );
        assert_eq!(snapshot.global_exclusions, vec!["Cost"]);
    }
}
