//! Staged planning runs over one site table.
//!
//! A run walks the stages in order and never revisits one: cost matrices
//! for every travel mode in use, demand extraction, vehicle-type
//! segmentation, then per fleet a pickup-only solve followed by per-loop
//! combination with dropoffs. Each fleet appends exactly one
//! [`FeasibilityRecord`] to the shared store. Infeasible fleets and loops
//! over capacity are recorded outcomes, not errors; [`PipelineError`] is
//! reserved for failures that leave nothing meaningful to record.

use std::time::Duration;

use log::{debug, info};
use rayon::prelude::*;
use thiserror::Error;

use crate::config::{ConfigError, DepotSettings, validate_profiles};
use crate::{
    AlignmentError, BikeConversion, CombineMode, CombineRequest, Conversion, CostProvider,
    DistanceMatrix, Exclusion, FeasibilityAggregator, FeasibilityRecord, FeasibilityStore,
    Infeasibility, Location, MatrixBuilder, MatrixError, Objective, ParameterSweep,
    ReportError, Route, RouteSolverAdapter, RoutingProblem, RunConfig, RunContext,
    SegmentError, ServiceKind, SiteRecord, SolveError, SolverBackend, StopLoad, TravelMode,
    VehicleKind, VehicleProfile, VehicleSubset, combine_loops, extract_demand,
    segment_by_vehicle_type, segment_loops,
};

/// Parameters that vary between runs over the same sites.
#[derive(Debug, Clone, PartialEq)]
pub struct RunParameters {
    /// Label filed with each record, e.g. the sweep point.
    pub label: String,
    /// One profile per vehicle type.
    pub profiles: Vec<VehicleProfile>,
    /// Budget per solve.
    pub time_limit: Duration,
    /// Search seed.
    pub seed: u64,
}

/// Fatal run failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The parameters are unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The site table is empty.
    #[error("no sites to plan")]
    NoSites,
    /// The site table needs exactly one depot.
    #[error("expected exactly one depot among the sites but found {found}")]
    DepotCount {
        /// Depots found.
        found: usize,
    },
    /// A cost matrix could not be built.
    #[error("failed to build {mode} cost matrix: {source}")]
    Matrix {
        /// Travel mode of the failed matrix.
        mode: TravelMode,
        /// Underlying failure.
        #[source]
        source: MatrixError,
    },
    /// Sites and matrix rows disagree.
    #[error(transparent)]
    Alignment(#[from] AlignmentError),
    /// Segmentation failed.
    #[error(transparent)]
    Segment(#[from] SegmentError),
    /// Sites were assigned to a vehicle type with no profile.
    #[error("{count} sites need {kind} service but no {kind} profile is configured")]
    Unserved {
        /// Vehicle type without a profile.
        kind: VehicleKind,
        /// Sites left unserved.
        count: usize,
    },
    /// A solve failed for a reason other than infeasibility.
    #[error("{kind} routing failed: {source}")]
    Solve {
        /// Fleet being solved.
        kind: VehicleKind,
        /// Underlying failure.
        #[source]
        source: SolveError,
    },
    /// The feasibility store rejected a record.
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// The outcome of one fleet within a run.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleRun {
    /// Vehicle type.
    pub kind: VehicleKind,
    /// Pickup-only routes.
    pub pickup_routes: Vec<Route>,
    /// Final combined routes.
    pub routes: Vec<Route>,
    /// Loops dropped for exceeding the combined capacity.
    pub exclusions: Vec<Exclusion>,
    /// Why the pickup stage produced no routes, if it failed.
    pub infeasibility: Option<Infeasibility>,
    /// The record appended for this fleet.
    pub record: FeasibilityRecord,
}

/// Everything one run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Run label.
    pub label: String,
    /// Sites moved from truck to bike service.
    pub conversions: Vec<Conversion>,
    /// One entry per configured profile, in profile order.
    pub runs: Vec<VehicleRun>,
}

impl RunReport {
    /// The entry for `kind`, if that fleet was configured.
    #[must_use]
    pub fn vehicle(&self, kind: VehicleKind) -> Option<&VehicleRun> {
        self.runs.iter().find(|run| run.kind == kind)
    }

    /// Whether every fleet served all of its sites.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.runs
            .iter()
            .all(|run| run.infeasibility.is_none() && run.exclusions.is_empty())
    }
}

/// Runs the planning stages against shared collaborators.
///
/// The matrix builder, adapter and store are borrowed so several pipelines,
/// or the parallel runs of a sweep, share one cache and one report.
pub struct Pipeline<'a, P, B> {
    matrices: &'a MatrixBuilder<P>,
    adapter: &'a RouteSolverAdapter<B>,
    store: &'a dyn FeasibilityStore,
    sites: Vec<SiteRecord>,
    bike_conversion: BikeConversion,
    combine: CombineMode,
    objective: Objective,
}

impl<P, B> std::fmt::Debug for Pipeline<'_, P, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("sites", &self.sites.len())
            .field("bike_conversion", &self.bike_conversion)
            .field("combine", &self.combine)
            .field("objective", &self.objective)
            .finish_non_exhaustive()
    }
}

impl<'a, P: CostProvider, B: SolverBackend> Pipeline<'a, P, B> {
    /// Plan over `sites`, which must contain exactly one depot.
    ///
    /// The depot is moved to the front; other sites keep their order.
    /// Conversion is disabled, combination is additive and distance is
    /// minimised until changed with the `with_*` methods.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoSites`] for an empty table and
    /// [`PipelineError::DepotCount`] unless exactly one depot is present.
    pub fn new(
        matrices: &'a MatrixBuilder<P>,
        adapter: &'a RouteSolverAdapter<B>,
        store: &'a dyn FeasibilityStore,
        sites: Vec<SiteRecord>,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            matrices,
            adapter,
            store,
            sites: prepare_sites(sites, None)?,
            bike_conversion: BikeConversion::disabled(),
            combine: CombineMode::default(),
            objective: Objective::default(),
        })
    }

    /// Plan over `sites` with the settings of a validated `config`.
    ///
    /// When the table has no depot, the configured one is added in front.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when `config` is invalid, and the
    /// errors of [`Pipeline::new`].
    pub fn from_config(
        matrices: &'a MatrixBuilder<P>,
        adapter: &'a RouteSolverAdapter<B>,
        store: &'a dyn FeasibilityStore,
        config: &RunConfig,
        sites: Vec<SiteRecord>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            matrices,
            adapter,
            store,
            sites: prepare_sites(sites, config.depot)?,
            bike_conversion: config.bike_conversion,
            combine: config.combine,
            objective: config.objective,
        })
    }

    /// Set the truck-to-bike conversion rule.
    #[must_use]
    pub const fn with_bike_conversion(mut self, conversion: BikeConversion) -> Self {
        self.bike_conversion = conversion;
        self
    }

    /// Set the load model for combined loops.
    #[must_use]
    pub const fn with_combine_mode(mut self, mode: CombineMode) -> Self {
        self.combine = mode;
        self
    }

    /// Set the leg component to minimise.
    #[must_use]
    pub const fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    /// Sites in planning order, depot first.
    #[must_use]
    pub fn sites(&self) -> &[SiteRecord] {
        &self.sites
    }

    /// Execute one run and append its records.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] for invalid parameters, provider or
    /// alignment failures, sites left without a fleet, backend faults and
    /// store failures. Records already appended by earlier fleets of the
    /// same run stay in the store.
    pub fn run(&self, params: &RunParameters) -> Result<RunReport, PipelineError> {
        validate_profiles(&params.profiles)?;
        if params.time_limit.is_zero() {
            return Err(ConfigError::ZeroTimeLimit.into());
        }
        info!("run '{}': planning {} sites", params.label, self.sites.len().saturating_sub(1));

        let matrices = self.build_matrices(&params.profiles)?;
        let has_bike = params.profiles.iter().any(|p| p.kind == VehicleKind::Bike);
        let proximity_mode = params
            .profiles
            .iter()
            .find(|p| p.kind == VehicleKind::Bike)
            .or_else(|| params.profiles.first())
            .map_or(TravelMode::Driving, VehicleProfile::travel_mode);
        let proximity = matrix_for(&matrices, proximity_mode)?;

        let locations = extract_demand(&self.sites, proximity)?;
        let conversion = if has_bike {
            self.bike_conversion
        } else {
            if self.bike_conversion.enabled {
                debug!("no bike profile: truck-to-bike conversion skipped");
            }
            BikeConversion::disabled()
        };
        let segmentation = segment_by_vehicle_type(&locations, proximity, &conversion)?;
        for kind in [VehicleKind::Truck, VehicleKind::Bike] {
            let count = segmentation.indices(kind).len().saturating_sub(1);
            if count > 0 && !params.profiles.iter().any(|p| p.kind == kind) {
                return Err(PipelineError::Unserved { kind, count });
            }
        }

        let mut runs = Vec::with_capacity(params.profiles.len());
        for profile in &params.profiles {
            let matrix = matrix_for(&matrices, profile.travel_mode())?;
            let subset = segmentation.subset(profile.kind, matrix)?;
            runs.push(self.run_fleet(params, profile, &subset)?);
        }
        info!("run '{}' finished", params.label);
        Ok(RunReport {
            label: params.label.clone(),
            conversions: segmentation.conversions().to_vec(),
            runs,
        })
    }

    /// Run every point of `sweep` over `base`.
    ///
    /// Points run on the rayon pool when `sweep.parallel` is set. Reports
    /// come back in grid order either way.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when the grid is invalid and the
    /// first failure of any run otherwise.
    pub fn sweep(
        &self,
        sweep: &ParameterSweep,
        base: &RunParameters,
    ) -> Result<Vec<RunReport>, PipelineError> {
        let points = sweep.expand(base)?;
        info!(
            "sweeping {} parameter combinations{}",
            points.len(),
            if sweep.parallel { " in parallel" } else { "" }
        );
        if sweep.parallel {
            points.par_iter().map(|point| self.run(point)).collect()
        } else {
            points.iter().map(|point| self.run(point)).collect()
        }
    }

    fn build_matrices(
        &self,
        profiles: &[VehicleProfile],
    ) -> Result<Vec<(TravelMode, DistanceMatrix)>, PipelineError> {
        let mut modes: Vec<TravelMode> = profiles.iter().map(VehicleProfile::travel_mode).collect();
        modes.sort_unstable();
        modes.dedup();
        modes
            .into_iter()
            .map(|mode| {
                self.matrices
                    .build(&self.sites, mode)
                    .map(|matrix| (mode, matrix))
                    .map_err(|source| PipelineError::Matrix { mode, source })
            })
            .collect()
    }

    fn run_fleet(
        &self,
        params: &RunParameters,
        profile: &VehicleProfile,
        subset: &VehicleSubset,
    ) -> Result<VehicleRun, PipelineError> {
        let kind = profile.kind;
        let loads = pickup_loads(&subset.locations);
        let problem = RoutingProblem {
            matrix: &subset.matrix,
            loads: &loads,
            depot: 0,
            vehicle: kind,
            service: ServiceKind::Pickup,
            capacity: profile.capacity,
            vehicle_count: profile.count,
            cost_per_unit: profile.cost_per_unit,
            objective: self.objective,
            time_limit: params.time_limit,
            seed: params.seed,
        };
        info!(
            "solving {kind} pickups for {} sites with {} vehicles of capacity {}",
            subset.site_count(),
            profile.count,
            profile.capacity
        );
        let aggregator = FeasibilityAggregator::new(self.store);
        let context = self.context(params, profile);

        let pickup_routes = match self.adapter.solve(&problem) {
            Ok(routes) => routes,
            Err(SolveError::NoFeasibleSolution(why)) => {
                info!("{kind} pickups infeasible: {why}");
                let record = aggregator.record_infeasible(context, &why)?;
                return Ok(VehicleRun {
                    kind,
                    pickup_routes: Vec::new(),
                    routes: Vec::new(),
                    exclusions: Vec::new(),
                    infeasibility: Some(why),
                    record,
                });
            }
            Err(source) => return Err(PipelineError::Solve { kind, source }),
        };

        let loops = segment_loops(&pickup_routes);
        let request = CombineRequest {
            locations: &subset.locations,
            matrix: &subset.matrix,
            profile,
            mode: self.combine,
            objective: self.objective,
            time_limit: params.time_limit,
            seed: params.seed,
        };
        let outcome = combine_loops(self.adapter, &loops, &request)
            .map_err(|source| PipelineError::Solve { kind, source })?;
        let record = aggregator.record(context, &outcome.routes, &outcome.exclusions)?;
        Ok(VehicleRun {
            kind,
            pickup_routes,
            routes: outcome.routes,
            exclusions: outcome.exclusions,
            infeasibility: None,
            record,
        })
    }

    fn context(&self, params: &RunParameters, profile: &VehicleProfile) -> RunContext {
        RunContext {
            label: params.label.clone(),
            vehicle: profile.kind,
            service: ServiceKind::Combined,
            solver: self.adapter.backend().name().to_owned(),
            provider: self.matrices.provider().name().to_owned(),
            vehicle_count: profile.count,
            capacity: profile.capacity,
            combined_capacity: profile.combined_capacity(),
            time_limit_secs: params.time_limit.as_secs(),
        }
    }
}

fn pickup_loads(locations: &[Location]) -> Vec<StopLoad> {
    locations
        .iter()
        .map(|l| {
            if l.is_depot {
                StopLoad::default()
            } else {
                StopLoad::pickup(l.pickup_demand)
            }
        })
        .collect()
}

fn matrix_for(
    matrices: &[(TravelMode, DistanceMatrix)],
    mode: TravelMode,
) -> Result<&DistanceMatrix, PipelineError> {
    matrices
        .iter()
        .find(|(m, _)| *m == mode)
        .map(|(_, matrix)| matrix)
        .ok_or(PipelineError::Matrix {
            mode,
            source: MatrixError::Provider(crate::CostError::EmptyInput),
        })
}

fn prepare_sites(
    mut sites: Vec<SiteRecord>,
    depot: Option<DepotSettings>,
) -> Result<Vec<SiteRecord>, PipelineError> {
    let depots: Vec<usize> = sites
        .iter()
        .enumerate()
        .filter(|(_, site)| site.is_depot)
        .map(|(index, _)| index)
        .collect();
    match (depots.as_slice(), depot) {
        ([], None) if sites.is_empty() => Err(PipelineError::NoSites),
        ([], None) => Err(PipelineError::DepotCount { found: 0 }),
        ([], Some(settings)) => {
            debug!("adding configured depot {}", settings.id);
            sites.insert(0, SiteRecord::new(settings.id, settings.location).depot());
            Ok(sites)
        }
        ([index], _) => {
            let site = sites.remove(*index);
            sites.insert(0, site);
            Ok(sites)
        }
        (many, _) => Err(PipelineError::DepotCount { found: many.len() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        FailingBackend, NearestNeighbourBackend, StubCostProvider, sites_on_line,
    };
    use crate::{MemoryFeasibilityStore, Range, RunOutcome};
    use geo::Coord;
    use rstest::rstest;

    fn params(profiles: Vec<VehicleProfile>) -> RunParameters {
        RunParameters {
            label: "test".into(),
            profiles,
            time_limit: Duration::from_secs(1),
            seed: 7,
        }
    }

    fn trucks(capacity: u32, count: usize) -> VehicleProfile {
        VehicleProfile::new(VehicleKind::Truck, capacity, count)
    }

    #[rstest]
    fn complete_run_serves_every_site() {
        let matrices = MatrixBuilder::new(StubCostProvider::planar());
        let adapter = RouteSolverAdapter::new(NearestNeighbourBackend);
        let store = MemoryFeasibilityStore::default();
        let sites = sites_on_line(&[(3.0, 1.0), (4.0, 0.0), (2.0, 1.0), (5.0, 0.0)]);
        let pipeline = Pipeline::new(&matrices, &adapter, &store, sites).expect("one depot");

        let report = pipeline
            .run(&params(vec![trucks(8, 2).with_combined_capacity(10)]))
            .expect("run succeeds");

        let run = report.vehicle(VehicleKind::Truck).expect("truck run");
        assert!(report.is_complete());
        assert_eq!(run.record.outcome, RunOutcome::Complete);
        let served: u64 = run.routes.iter().map(|r| r.pickup).sum();
        assert_eq!(served, 14);
        assert!(run.routes.iter().all(|r| r.peak_load() <= 10));
        assert_eq!(run.record.context.provider, "stub");
        assert_eq!(run.record.context.solver, "nearest-neighbour");
        assert_eq!(store.records().expect("records").len(), 1);
    }

    #[rstest]
    fn infeasible_fleets_are_recorded() {
        let matrices = MatrixBuilder::new(StubCostProvider::planar());
        let adapter = RouteSolverAdapter::new(NearestNeighbourBackend);
        let store = MemoryFeasibilityStore::default();
        let sites = sites_on_line(&[(25.0, 0.0), (25.0, 0.0)]);
        let pipeline = Pipeline::new(&matrices, &adapter, &store, sites).expect("one depot");

        let report = pipeline.run(&params(vec![trucks(10, 2)])).expect("recorded");

        let run = report.vehicle(VehicleKind::Truck).expect("truck run");
        assert!(matches!(
            run.infeasibility,
            Some(Infeasibility::ProvenInfeasible { .. })
        ));
        assert_eq!(run.record.outcome, RunOutcome::Infeasible);
        assert!(run.routes.is_empty());
    }

    #[rstest]
    fn backend_faults_abort_the_run() {
        let matrices = MatrixBuilder::new(StubCostProvider::planar());
        let adapter = RouteSolverAdapter::new(FailingBackend(SolveError::Backend {
            message: "boom".into(),
        }));
        let store = MemoryFeasibilityStore::default();
        let pipeline = Pipeline::new(&matrices, &adapter, &store, sites_on_line(&[(1.0, 0.0)]))
            .expect("one depot");

        let err = pipeline.run(&params(vec![trucks(10, 1)])).expect_err("fatal");
        assert!(matches!(err, PipelineError::Solve { kind: VehicleKind::Truck, .. }));
        assert!(store.records().expect("records").is_empty());
    }

    #[rstest]
    fn bike_only_sites_need_a_bike_profile() {
        let matrices = MatrixBuilder::new(StubCostProvider::planar());
        let adapter = RouteSolverAdapter::new(NearestNeighbourBackend);
        let store = MemoryFeasibilityStore::default();
        let mut sites = sites_on_line(&[(1.0, 0.0), (2.0, 0.0)]);
        if let Some(site) = sites.get_mut(2) {
            site.eligibility = crate::Eligibility::Bike;
        }
        let pipeline = Pipeline::new(&matrices, &adapter, &store, sites).expect("one depot");

        let err = pipeline.run(&params(vec![trucks(10, 1)])).expect_err("unserved");
        assert!(matches!(
            err,
            PipelineError::Unserved {
                kind: VehicleKind::Bike,
                count: 1
            }
        ));
    }

    #[rstest]
    fn configured_depot_is_added_in_front() {
        let matrices = MatrixBuilder::new(StubCostProvider::planar());
        let adapter = RouteSolverAdapter::new(NearestNeighbourBackend);
        let store = MemoryFeasibilityStore::default();
        let sites = vec![
            SiteRecord::new(5, Coord { x: 1.0, y: 0.0 }).with_volumes(1.0, 0.0),
            SiteRecord::new(6, Coord { x: 2.0, y: 0.0 }).with_volumes(1.0, 0.0),
        ];
        let prepared = prepare_sites(
            sites,
            Some(DepotSettings {
                id: 99,
                location: Coord { x: 0.0, y: 0.0 },
            }),
        )
        .expect("depot added");
        let ids: Vec<_> = prepared.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![99, 5, 6]);
        let pipeline = Pipeline::new(&matrices, &adapter, &store, prepared).expect("one depot");
        assert!(pipeline.sites().first().is_some_and(|s| s.is_depot));
    }

    #[rstest]
    #[case(Vec::new(), PipelineError::NoSites)]
    #[case(vec![SiteRecord::new(1, Coord { x: 0.0, y: 0.0 })], PipelineError::DepotCount { found: 0 })]
    fn sites_need_one_depot(#[case] sites: Vec<SiteRecord>, #[case] expected: PipelineError) {
        let err = prepare_sites(sites, None).expect_err("no depot");
        assert_eq!(err.to_string(), expected.to_string());
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn sweeps_append_one_record_per_point(#[case] parallel: bool) {
        let matrices = MatrixBuilder::new(StubCostProvider::planar());
        let adapter = RouteSolverAdapter::new(NearestNeighbourBackend);
        let store = MemoryFeasibilityStore::default();
        let sites = sites_on_line(&[(3.0, 0.0), (4.0, 0.0), (2.0, 0.0)]);
        let pipeline = Pipeline::new(&matrices, &adapter, &store, sites).expect("one depot");
        let sweep = ParameterSweep {
            vehicle: VehicleKind::Truck,
            vehicle_count: Some(Range::new(1, 2, 1)),
            capacity: Some(Range::new(5, 9, 4)),
            combined_capacity: None,
            time_limit_secs: None,
            parallel,
        };

        let reports = pipeline
            .sweep(&sweep, &params(vec![trucks(10, 1)]))
            .expect("sweep runs");

        assert_eq!(reports.len(), 4);
        assert_eq!(store.records().expect("records").len(), 4);
        let labels: Vec<&str> = reports.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "truck count=1 capacity=5 time_limit=1s",
                "truck count=1 capacity=9 time_limit=1s",
                "truck count=2 capacity=5 time_limit=1s",
                "truck count=2 capacity=9 time_limit=1s",
            ]
        );
        assert_eq!(matrices.provider().calls(), 1);
    }
}
