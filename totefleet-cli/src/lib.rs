//! Command-line interface for the totefleet route planner.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};

mod error;
mod plan;

pub use error::CliError;
use plan::{PlanArgs, run_plan};

pub(crate) const ARG_PLAN_RUN_CONFIG: &str = "run-config";
pub(crate) const ARG_PLAN_LOCATIONS: &str = "locations";
pub(crate) const ARG_PLAN_OUTPUT_DIR: &str = "output-dir";
pub(crate) const ARG_PLAN_SOLVER: &str = "solver";
pub(crate) const ARG_PLAN_PROVIDER: &str = "provider";
pub(crate) const ARG_PLAN_OSRM_BASE_URL: &str = "osrm-base-url";
pub(crate) const ARG_PLAN_TIME_LIMIT: &str = "time-limit-secs";
pub(crate) const ARG_PLAN_SEED: &str = "seed";
pub(crate) const ARG_PLAN_MAX_GENERATIONS: &str = "max-generations";
pub(crate) const ENV_PLAN_RUN_CONFIG: &str = "TOTEFLEET_CMDS_PLAN_RUN_CONFIG";

/// Run the totefleet CLI with the current process arguments and environment.
///
/// # Errors
///
/// Returns a [`CliError`] when arguments, configuration, inputs or the
/// planning run fail.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Plan(args) => run_plan(args),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "totefleet",
    about = "Capacity-aware tote collection and delivery route planning",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Plan truck and bike routes for a location table.
    Plan(PlanArgs),
}

#[cfg(test)]
mod tests;
