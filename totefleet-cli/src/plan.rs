//! Plan command implementation for the totefleet CLI.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use totefleet_core::{
    Conversion, CostProvider, FeasibilityRecord, FeasibilityStore, MatrixBuilder,
    MemoryFeasibilityStore, Pipeline, Route, RouteSolverAdapter, RunConfig, RunReport,
    SolverBackend, SolverKind, SolverSettings, VehicleKind,
};
use totefleet_data::GreatCircleCostProvider;
use totefleet_data::routing::{OsrmConfig, OsrmCostProvider};

use crate::{
    ARG_PLAN_LOCATIONS, ARG_PLAN_MAX_GENERATIONS, ARG_PLAN_OSRM_BASE_URL, ARG_PLAN_OUTPUT_DIR,
    ARG_PLAN_PROVIDER, ARG_PLAN_RUN_CONFIG, ARG_PLAN_SEED, ARG_PLAN_SOLVER, ARG_PLAN_TIME_LIMIT,
    CliError, ENV_PLAN_RUN_CONFIG,
};

/// File name of the feasibility report inside the output directory.
pub(crate) const FEASIBILITY_DB: &str = "feasibility.db";
/// File name of the JSON plan summary inside the output directory.
pub(crate) const SUMMARY_JSON: &str = "summary.json";

/// CLI arguments for the `plan` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Plan capacity-feasible truck and bike routes. The run \
                 configuration is a JSON file naming the location table, \
                 the vehicle fleets and the solver settings; the flags below \
                 override individual settings.",
    about = "Plan routes for a location table"
)]
#[ortho_config(prefix = "TOTEFLEET")]
pub(crate) struct PlanArgs {
    /// Path to the JSON run configuration.
    #[arg(value_name = "path")]
    #[serde(default)]
    pub(crate) run_config: Option<Utf8PathBuf>,
    /// Override the location table named by the run configuration.
    #[arg(long = ARG_PLAN_LOCATIONS, value_name = "path")]
    #[serde(default)]
    pub(crate) locations: Option<Utf8PathBuf>,
    /// Override the output directory for reports and summaries.
    #[arg(long = ARG_PLAN_OUTPUT_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) output_dir: Option<Utf8PathBuf>,
    /// Solver backend: `vrp` or `savings`.
    #[arg(long = ARG_PLAN_SOLVER, value_name = "backend")]
    #[serde(default)]
    pub(crate) solver: Option<String>,
    /// Cost provider: `osrm` or `great-circle`.
    #[arg(long = ARG_PLAN_PROVIDER, value_name = "provider")]
    #[serde(default)]
    pub(crate) provider: Option<String>,
    /// Base URL for the OSRM server (e.g. "http://localhost:5000").
    #[arg(long = ARG_PLAN_OSRM_BASE_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) osrm_base_url: Option<String>,
    /// Override the per-solve time budget in seconds.
    #[arg(long = ARG_PLAN_TIME_LIMIT, value_name = "secs")]
    #[serde(default)]
    pub(crate) time_limit_secs: Option<u64>,
    /// Override the solver seed.
    #[arg(long = ARG_PLAN_SEED, value_name = "seed")]
    #[serde(default)]
    pub(crate) seed: Option<u64>,
    /// Override the iteration cap of metaheuristic backends.
    #[arg(long = ARG_PLAN_MAX_GENERATIONS, value_name = "count")]
    #[serde(default)]
    pub(crate) max_generations: Option<usize>,
}

impl PlanArgs {
    pub(crate) fn into_config(self) -> Result<PlanConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        PlanConfig::try_from(merged)
    }
}

/// Source of travel costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum ProviderKind {
    /// OSRM table service over HTTP.
    #[default]
    Osrm,
    /// Offline great-circle estimate.
    GreatCircle,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "osrm" => Ok(Self::Osrm),
            "great-circle" | "great_circle" => Ok(Self::GreatCircle),
            _ => Err(format!("unknown cost provider '{s}'")),
        }
    }
}

/// Resolved `plan` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlanConfig {
    /// Path to the JSON run configuration.
    pub(crate) run_config: Utf8PathBuf,
    /// Location table override.
    pub(crate) locations: Option<Utf8PathBuf>,
    /// Output directory override.
    pub(crate) output_dir: Option<Utf8PathBuf>,
    /// Backend override.
    pub(crate) solver: Option<SolverKind>,
    /// Cost provider.
    pub(crate) provider: ProviderKind,
    /// Base URL for the OSRM table service.
    pub(crate) osrm_base_url: String,
    /// Time budget override.
    pub(crate) time_limit_secs: Option<u64>,
    /// Seed override.
    pub(crate) seed: Option<u64>,
    /// Iteration cap override.
    pub(crate) max_generations: Option<usize>,
}

impl PlanConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_existing(&self.run_config, ARG_PLAN_RUN_CONFIG)
    }

    /// Fold the command-line overrides into `run`.
    ///
    /// Relative paths inside the file resolve against the file's directory;
    /// paths given on the command line are used as given.
    pub(crate) fn apply(&self, run: &mut RunConfig) {
        let base = self
            .run_config
            .parent()
            .unwrap_or_else(|| Utf8Path::new(""));
        run.locations_path = resolve_against(base, &run.locations_path);
        run.output_dir = run
            .output_dir
            .as_deref()
            .map(|dir| resolve_against(base, dir));

        if let Some(locations) = &self.locations {
            run.locations_path = locations.clone().into_std_path_buf();
        }
        if let Some(dir) = &self.output_dir {
            run.output_dir = Some(dir.clone().into_std_path_buf());
        }
        if let Some(backend) = self.solver {
            run.solver.backend = backend;
        }
        if let Some(secs) = self.time_limit_secs {
            run.solver.time_limit_secs = secs;
        }
        if let Some(seed) = self.seed {
            run.solver.seed = seed;
        }
        if let Some(generations) = self.max_generations {
            run.solver.max_generations = Some(generations);
        }
    }
}

impl TryFrom<PlanArgs> for PlanConfig {
    type Error = CliError;

    fn try_from(args: PlanArgs) -> Result<Self, Self::Error> {
        let run_config = args.run_config.ok_or(CliError::MissingArgument {
            field: ARG_PLAN_RUN_CONFIG,
            env: ENV_PLAN_RUN_CONFIG,
        })?;
        let solver = args
            .solver
            .map(|value| {
                SolverKind::from_str(&value).map_err(|message| CliError::InvalidOption {
                    field: ARG_PLAN_SOLVER,
                    value,
                    message,
                })
            })
            .transpose()?;
        let provider = args
            .provider
            .map(|value| {
                ProviderKind::from_str(&value).map_err(|message| CliError::InvalidOption {
                    field: ARG_PLAN_PROVIDER,
                    value,
                    message,
                })
            })
            .transpose()?
            .unwrap_or_default();
        let osrm_base_url = args
            .osrm_base_url
            .unwrap_or_else(|| OsrmConfig::default().base_url);

        Ok(Self {
            run_config,
            locations: args.locations,
            output_dir: args.output_dir,
            solver,
            provider,
            osrm_base_url,
            time_limit_secs: args.time_limit_secs,
            seed: args.seed,
            max_generations: args.max_generations,
        })
    }
}

fn resolve_against(base: &Utf8Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.as_std_path().join(path)
    } else {
        path.to_path_buf()
    }
}

fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
    match totefleet_fs::file_is_file(path) {
        Ok(true) => Ok(()),
        Ok(false) => Err(CliError::SourcePathNotFile {
            field,
            path: path.to_path_buf(),
        }),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            Err(CliError::MissingSourceFile {
                field,
                path: path.to_path_buf(),
            })
        }
        Err(source) => Err(CliError::InspectSourcePath {
            field,
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn utf8_path(path: PathBuf) -> Result<Utf8PathBuf, CliError> {
    Utf8PathBuf::from_path_buf(path).map_err(|path| CliError::NonUtf8Path { path })
}

/// Builds the cost provider and solver backend for one invocation.
pub(super) trait PlanCollaborators {
    fn cost_provider(&self, config: &PlanConfig) -> Result<Box<dyn CostProvider>, CliError>;

    fn solver_backend(
        &self,
        settings: &SolverSettings,
    ) -> Result<Box<dyn SolverBackend>, CliError>;
}

pub(super) struct DefaultPlanCollaborators;

impl PlanCollaborators for DefaultPlanCollaborators {
    fn cost_provider(&self, config: &PlanConfig) -> Result<Box<dyn CostProvider>, CliError> {
        match config.provider {
            ProviderKind::Osrm => {
                let provider =
                    OsrmCostProvider::new(config.osrm_base_url.clone()).map_err(|source| {
                        CliError::BuildCostProvider {
                            base_url: config.osrm_base_url.clone(),
                            source,
                        }
                    })?;
                Ok(Box::new(provider))
            }
            ProviderKind::GreatCircle => Ok(Box::new(GreatCircleCostProvider::default())),
        }
    }

    fn solver_backend(
        &self,
        settings: &SolverSettings,
    ) -> Result<Box<dyn SolverBackend>, CliError> {
        match settings.backend {
            SolverKind::Vrp => vrp_backend(settings),
            SolverKind::Savings => savings_backend(),
        }
    }
}

#[cfg(feature = "solver-vrp")]
fn vrp_backend(settings: &SolverSettings) -> Result<Box<dyn SolverBackend>, CliError> {
    use totefleet_solver_vrp::{VrpSolver, VrpSolverConfig};

    let mut config = VrpSolverConfig::default();
    if let Some(generations) = settings.max_generations {
        config.max_generations = generations;
    }
    Ok(Box::new(VrpSolver::with_config(config)))
}

#[cfg(not(feature = "solver-vrp"))]
fn vrp_backend(_settings: &SolverSettings) -> Result<Box<dyn SolverBackend>, CliError> {
    Err(CliError::MissingFeature {
        feature: "solver-vrp",
        action: "the vrp backend",
    })
}

#[cfg(feature = "solver-savings")]
fn savings_backend() -> Result<Box<dyn SolverBackend>, CliError> {
    Ok(Box::new(totefleet_solver_savings::SavingsSolver::new()))
}

#[cfg(not(feature = "solver-savings"))]
fn savings_backend() -> Result<Box<dyn SolverBackend>, CliError> {
    Err(CliError::MissingFeature {
        feature: "solver-savings",
        action: "the savings backend",
    })
}

#[cfg(feature = "store-sqlite")]
fn open_store(output_dir: Option<&Utf8Path>) -> Result<Box<dyn FeasibilityStore>, CliError> {
    let Some(dir) = output_dir else {
        return Ok(Box::new(MemoryFeasibilityStore::default()));
    };
    let path = dir.join(FEASIBILITY_DB);
    let store = totefleet_core::SqliteFeasibilityStore::open(path.as_std_path())
        .map_err(|source| CliError::OpenStore { path, source })?;
    Ok(Box::new(store))
}

#[cfg(not(feature = "store-sqlite"))]
fn open_store(_output_dir: Option<&Utf8Path>) -> Result<Box<dyn FeasibilityStore>, CliError> {
    Ok(Box::new(MemoryFeasibilityStore::default()))
}

/// JSON summary of a `plan` invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PlanSummary {
    /// Backend that produced the routes.
    pub(crate) solver: String,
    /// Provider that produced the travel costs.
    pub(crate) provider: String,
    /// One entry per run, in sweep order.
    pub(crate) runs: Vec<RunSummary>,
    /// Matrix cache counters after the last run.
    pub(crate) matrix_cache: MatrixCacheSummary,
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RunSummary {
    pub(crate) label: String,
    /// Whether every fleet served every location.
    pub(crate) complete: bool,
    pub(crate) conversions: Vec<Conversion>,
    pub(crate) fleets: Vec<FleetSummary>,
}

/// Outcome of one vehicle type within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct FleetSummary {
    pub(crate) vehicle: VehicleKind,
    pub(crate) record: FeasibilityRecord,
    /// Combined routes that made the final set. Excluded loops appear only
    /// in the record.
    pub(crate) routes: Vec<Route>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct MatrixCacheSummary {
    pub(crate) hits: u64,
    pub(crate) misses: u64,
}

impl RunSummary {
    fn from_report(report: RunReport) -> Self {
        let complete = report.is_complete();
        Self {
            label: report.label,
            complete,
            conversions: report.conversions,
            fleets: report
                .runs
                .into_iter()
                .map(|run| FleetSummary {
                    vehicle: run.kind,
                    record: run.record,
                    routes: run.routes,
                })
                .collect(),
        }
    }
}

pub(super) fn run_plan(args: PlanArgs) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    run_plan_with(args, &DefaultPlanCollaborators, &mut stdout)
}

pub(super) fn run_plan_with(
    args: PlanArgs,
    collaborators: &dyn PlanCollaborators,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let summary = execute_plan(args, collaborators)?;
    let payload = serde_json::to_string_pretty(&summary).map_err(CliError::SerialiseSummary)?;
    writer
        .write_all(payload.as_bytes())
        .map_err(CliError::WritePlanOutput)?;
    writer.write_all(b"\n").map_err(CliError::WritePlanOutput)?;
    Ok(())
}

fn execute_plan(
    args: PlanArgs,
    collaborators: &dyn PlanCollaborators,
) -> Result<PlanSummary, CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    let mut run_config = load_run_config(&config.run_config)?;
    config.apply(&mut run_config);
    run_config
        .validate()
        .map_err(|source| CliError::InvalidRunConfig {
            path: config.run_config.clone(),
            source,
        })?;

    let locations = utf8_path(run_config.locations_path.clone())?;
    require_existing(&locations, ARG_PLAN_LOCATIONS)?;
    let sites = totefleet_data::load_sites(&locations)?;
    let output_dir = run_config.output_dir.clone().map(utf8_path).transpose()?;
    if let Some(dir) = &output_dir {
        totefleet_fs::ensure_dir(dir).map_err(|source| CliError::CreateOutputDir {
            path: dir.clone(),
            source,
        })?;
    }

    let provider = collaborators.cost_provider(&config)?;
    let backend = collaborators.solver_backend(&run_config.solver)?;
    let provider_name = provider.name().to_owned();
    let solver_name = backend.name().to_owned();
    let matrices = MatrixBuilder::new(provider);
    let adapter = RouteSolverAdapter::new(backend);
    let store = open_store(output_dir.as_deref())?;
    let pipeline = Pipeline::from_config(&matrices, &adapter, store.as_ref(), &run_config, sites)?;

    let base = run_config.run_parameters();
    let reports = match &run_config.sweep {
        Some(sweep) => pipeline.sweep(sweep, &base)?,
        None => vec![pipeline.run(&base)?],
    };
    let stats = matrices.stats();
    let summary = PlanSummary {
        solver: solver_name,
        provider: provider_name,
        runs: reports.into_iter().map(RunSummary::from_report).collect(),
        matrix_cache: MatrixCacheSummary {
            hits: stats.hits,
            misses: stats.misses,
        },
    };

    if let Some(dir) = &output_dir {
        write_summary_file(&dir.join(SUMMARY_JSON), &summary)?;
    }
    Ok(summary)
}

/// Loads a JSON-encoded [`RunConfig`] from disk.
pub(super) fn load_run_config(path: &Utf8Path) -> Result<RunConfig, CliError> {
    let text = totefleet_fs::read_utf8(path).map_err(|source| CliError::ReadRunConfig {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::ParseRunConfig {
        path: path.to_path_buf(),
        source,
    })
}

fn write_summary_file(path: &Utf8Path, summary: &PlanSummary) -> Result<(), CliError> {
    let payload = serde_json::to_string_pretty(summary).map_err(CliError::SerialiseSummary)?;
    totefleet_fs::write_utf8(path, &payload).map_err(|source| CliError::WriteSummaryFile {
        path: path.to_path_buf(),
        source,
    })?;
    info!("wrote plan summary to {path}");
    Ok(())
}
