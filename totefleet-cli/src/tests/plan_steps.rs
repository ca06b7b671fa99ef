//! Behaviour-driven step definitions driving the plan CLI scenarios.

use super::helpers::{PlanWorkspace, truck_config};
use super::*;
use crate::plan::{PlanCollaborators, PlanConfig, PlanSummary, run_plan_with};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::RefCell;
use totefleet_core::test_support::{NearestNeighbourBackend, StubCostProvider};
use totefleet_core::{CostProvider, RunOutcome, SolverBackend, SolverKind, SolverSettings};

#[derive(Debug)]
struct PlanWorld {
    workspace: PlanWorkspace,
    include_run_config: RefCell<bool>,
    cli_args: RefCell<Vec<String>>,
    stdout: RefCell<Vec<u8>>,
    seen_backend: RefCell<Option<SolverKind>>,
    result: RefCell<Option<Result<(), CliError>>>,
}

impl PlanWorld {
    fn new() -> Self {
        Self {
            workspace: PlanWorkspace::new(),
            include_run_config: RefCell::new(true),
            cli_args: RefCell::new(Vec::new()),
            stdout: RefCell::new(Vec::new()),
            seen_backend: RefCell::new(None),
            result: RefCell::new(None),
        }
    }

    fn build_command_line(&self) -> Vec<String> {
        let mut argv = vec!["totefleet".to_owned(), "plan".to_owned()];
        if *self.include_run_config.borrow() {
            argv.push(self.workspace.run_config_path().into_string());
        }
        argv.extend(self.cli_args.borrow().iter().cloned());
        argv
    }

    fn error(&self) -> std::cell::Ref<'_, CliError> {
        std::cell::Ref::map(self.result.borrow(), |result| {
            result
                .as_ref()
                .expect("result recorded")
                .as_ref()
                .expect_err("expected error")
        })
    }

    fn summary(&self) -> PlanSummary {
        let borrowed = self.result.borrow();
        let result = borrowed.as_ref().expect("result recorded");
        if let Err(err) = result {
            panic!("expected success, found {err}");
        }
        let stdout = String::from_utf8(self.stdout.borrow().clone()).expect("stdout utf-8");
        serde_json::from_str(&stdout).expect("output should be a JSON plan summary")
    }
}

#[fixture]
fn world() -> PlanWorld {
    PlanWorld::new()
}

/// Offline collaborators that remember which backend was requested.
#[derive(Default)]
struct RecordingCollaborators {
    backend: RefCell<Option<SolverKind>>,
}

impl PlanCollaborators for RecordingCollaborators {
    fn cost_provider(&self, _config: &PlanConfig) -> Result<Box<dyn CostProvider>, CliError> {
        Ok(Box::new(StubCostProvider::planar()))
    }

    fn solver_backend(
        &self,
        settings: &SolverSettings,
    ) -> Result<Box<dyn SolverBackend>, CliError> {
        self.backend.replace(Some(settings.backend));
        Ok(Box::new(NearestNeighbourBackend))
    }
}

#[given("a run configuration with {count} trucks of capacity {capacity}")]
fn run_configuration(#[from(world)] world: &PlanWorld, count: usize, capacity: u32) {
    world
        .workspace
        .write_run_config(&truck_config(count, capacity));
}

#[given("the {flag} option is {value}")]
fn option_is(#[from(world)] world: &PlanWorld, flag: String, value: String) {
    world
        .cli_args
        .borrow_mut()
        .extend([format!("--{flag}"), value]);
}

#[given("I omit the run configuration path")]
fn omit_run_config(#[from(world)] world: &PlanWorld) {
    *world.include_run_config.borrow_mut() = false;
}

#[when("I run the plan command")]
fn run_plan_command(#[from(world)] world: &PlanWorld) {
    let invocation = world.build_command_line();
    let collaborators = RecordingCollaborators::default();
    let parsed = Cli::try_parse_from(invocation).map_err(CliError::from);
    let outcome = parsed.and_then(|cli| match cli.command {
        Command::Plan(args) => {
            let mut buffer = world.stdout.borrow_mut();
            run_plan_with(args, &collaborators, &mut *buffer)
        }
    });
    world.seen_backend.replace(collaborators.backend.take());
    world.result.replace(Some(outcome));
}

#[then("the command succeeds and prints a complete plan")]
fn succeeds_with_complete_plan(#[from(world)] world: &PlanWorld) {
    let summary = world.summary();
    assert_eq!(summary.runs.len(), 1);
    assert!(summary.runs.iter().all(|run| run.complete));
    assert!(summary.matrix_cache.misses >= 1);
}

#[then("the command succeeds and reports the trucks infeasible")]
fn succeeds_with_infeasible_trucks(#[from(world)] world: &PlanWorld) {
    let summary = world.summary();
    let run = summary.runs.first().expect("one run");
    assert!(!run.complete);
    let outcomes: Vec<RunOutcome> = run.fleets.iter().map(|f| f.record.outcome).collect();
    assert_eq!(outcomes, vec![RunOutcome::Infeasible]);
}

#[then("the collaborators saw the vrp backend")]
fn collaborators_saw_vrp(#[from(world)] world: &PlanWorld) {
    assert_eq!(*world.seen_backend.borrow(), Some(SolverKind::Vrp));
    let _ = world.summary();
}

#[then("the command fails with an invalid provider value")]
fn fails_with_invalid_provider(#[from(world)] world: &PlanWorld) {
    match &*world.error() {
        CliError::InvalidOption { field, value, .. } => {
            assert_eq!(*field, ARG_PLAN_PROVIDER);
            assert_eq!(value, "carrier-pigeon");
        }
        other => panic!("expected InvalidOption, found {other:?}"),
    }
}

#[then("the command fails because the run configuration path is missing")]
fn fails_without_run_config(#[from(world)] world: &PlanWorld) {
    match &*world.error() {
        CliError::MissingArgument { field, .. } => assert_eq!(*field, ARG_PLAN_RUN_CONFIG),
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

macro_rules! register_plan_scenario {
    ($fn_name:ident, $scenario_title:literal) => {
        #[scenario(path = "tests/features/plan_command.feature", name = $scenario_title)]
        fn $fn_name(#[from(world)] world: PlanWorld) {
            let _ = world;
        }
    };
}

register_plan_scenario!(plan_happy_path, "planning routes from a run configuration");
register_plan_scenario!(plan_short_fleet, "reporting a fleet too small for its sites");
register_plan_scenario!(plan_backend_override, "overriding the backend from the command line");
register_plan_scenario!(plan_unknown_provider, "rejecting an unknown cost provider");
register_plan_scenario!(plan_missing_run_config, "rejecting missing run configuration paths");
