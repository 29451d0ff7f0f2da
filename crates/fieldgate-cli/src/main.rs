mod cli;
mod commands;
mod observability;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use commands::Session;
use output::print_error;

fn main() {
    if let Err(e) = run() {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();

    observability::init_tracing_with_level(cli.log_level.as_deref().unwrap_or("warn"));
    let config = commands::load_config(&cli.config)?;
    if cli.log_level.is_none() {
        observability::apply_logging_level(&config.logging.level);
    }
    let session = Session::from_config(&config)?;

    match &cli.command {
        Commands::Validate => commands::inspect::validate(&session, format)?,
        Commands::Policies => commands::inspect::policies(&session, format)?,
        Commands::Inspect(args) => commands::inspect::inspect(&session, args, format)?,
        Commands::CheckOrder(args) => commands::check::check_order(&session, args, format)?,
        Commands::CheckFilter(args) => commands::check::check_filter(&session, args, format)?,
    }

    Ok(())
}
