//! Test helpers for composing plan inputs on disk.

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Value, json};
use tempfile::TempDir;
use totefleet_core::test_support::{NearestNeighbourBackend, StubCostProvider};
use totefleet_core::{CostProvider, SolverBackend, SolverSettings};

use crate::CliError;
use crate::plan::{PlanCollaborators, PlanConfig};

/// Depot plus four collection sites a few hundred metres apart.
pub(super) const SITES: &str = r#"[
    {"id": 100, "location": {"x": 0.0, "y": 0.0}, "is_depot": true},
    {"id": 1, "location": {"x": 0.001, "y": 0.0}, "daily_pickup_volume": 2.0},
    {"id": 2, "location": {"x": 0.002, "y": 0.0}, "daily_pickup_volume": 3.0},
    {"id": 3, "location": {"x": 0.0, "y": 0.001}, "daily_pickup_volume": 1.0},
    {"id": 4, "location": {"x": 0.0, "y": 0.002}, "daily_pickup_volume": 2.0}
]"#;

/// Temporary directory holding a location table and a run configuration.
#[derive(Debug)]
pub(super) struct PlanWorkspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl PlanWorkspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        write_utf8(&root.join("sites.json"), SITES);
        Self { _dir: dir, root }
    }

    pub(super) fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub(super) fn run_config_path(&self) -> Utf8PathBuf {
        self.root.join("run.json")
    }

    pub(super) fn output_dir(&self) -> Utf8PathBuf {
        self.root.join("out")
    }

    /// Write `config` as the run configuration.
    pub(super) fn write_run_config(&self, config: &Value) {
        let payload = serde_json::to_string_pretty(config).expect("serialise run config");
        write_utf8(&self.run_config_path(), &payload);
    }
}

/// Truck-only configuration with room for every site on one vehicle.
pub(super) fn truck_config(count: usize, capacity: u32) -> Value {
    json!({
        "locations_path": "sites.json",
        "vehicles": [{"kind": "truck", "capacity": capacity, "count": count}],
        "solver": {"backend": "savings", "time_limit_secs": 1, "seed": 7}
    })
}

pub(super) fn write_utf8(path: &Utf8Path, contents: &str) {
    totefleet_fs::write_utf8(path, contents).expect("write file");
}

/// Collaborators that never touch the network.
#[derive(Debug, Default)]
pub(super) struct StubCollaborators;

impl PlanCollaborators for StubCollaborators {
    fn cost_provider(&self, _config: &PlanConfig) -> Result<Box<dyn CostProvider>, CliError> {
        Ok(Box::new(StubCostProvider::planar()))
    }

    fn solver_backend(
        &self,
        _settings: &SolverSettings,
    ) -> Result<Box<dyn SolverBackend>, CliError> {
        Ok(Box::new(NearestNeighbourBackend))
    }
}
