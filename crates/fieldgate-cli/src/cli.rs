use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use fieldgate::DEFAULT_ROLE;

#[derive(Parser)]
#[command(name = "fieldgate")]
#[command(about = "Inspect and check fieldgate access policies")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Policy configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "FIELDGATE_CONFIG",
        default_value = "fieldgate.toml"
    )]
    pub config: PathBuf,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Log level filter (overrides the configuration file; RUST_LOG wins over both)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load the configuration and report what it registers
    Validate,
    /// List registered policies and their roles
    Policies,
    /// Show everything one role may do with a policy
    Inspect(InspectArgs),
    /// Check whether a role may order by a field
    CheckOrder(CheckOrderArgs),
    /// Check whether a role may filter a field with an operator
    CheckFilter(CheckFilterArgs),
}

#[derive(clap::Args)]
pub struct InspectArgs {
    /// Entity type (e.g. Product)
    pub entity: String,
    /// Policy name (e.g. Public)
    pub policy: String,
    /// Role to resolve
    #[arg(short, long, default_value = DEFAULT_ROLE)]
    pub role: String,
}

#[derive(clap::Args)]
pub struct CheckOrderArgs {
    /// Entity type (e.g. Product)
    pub entity: String,
    /// Policy name (e.g. Public)
    pub policy: String,
    /// Field to order by
    pub field: String,
    /// Role to resolve
    #[arg(short, long, default_value = DEFAULT_ROLE)]
    pub role: String,
    /// Order descending
    #[arg(long)]
    pub desc: bool,
}

#[derive(clap::Args)]
pub struct CheckFilterArgs {
    /// Entity type (e.g. Product)
    pub entity: String,
    /// Policy name (e.g. Public)
    pub policy: String,
    /// Field to filter on
    pub field: String,
    /// Operator (e.g. equals, contains, gt)
    pub operation: String,
    /// Comparison value, parsed as JSON when possible
    #[arg(long)]
    pub value: Option<String>,
    /// Role to resolve
    #[arg(short, long, default_value = DEFAULT_ROLE)]
    pub role: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_check_order() {
        let cli = Cli::try_parse_from([
            "fieldgate",
            "--config",
            "policies.toml",
            "check-order",
            "Product",
            "Public",
            "Price",
            "--desc",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("policies.toml"));
        match cli.command {
            Commands::CheckOrder(args) => {
                assert_eq!(args.field, "Price");
                assert_eq!(args.role, DEFAULT_ROLE);
                assert!(args.desc);
            }
            _ => panic!("expected check-order"),
        }
    }

    #[test]
    fn test_parse_format_after_subcommand() {
        let cli = Cli::try_parse_from(["fieldgate", "policies", "--format", "table"]).unwrap();
        assert_eq!(cli.format, Some(OutputFormat::Table));
    }
}
