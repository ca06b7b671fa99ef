//! SQLite-backed feasibility report.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log::debug;
use rusqlite::{Connection, Row, params};
use serde::de::DeserializeOwned;

use super::{FeasibilityRecord, FeasibilityStore, ReportError, RunContext, RunOutcome};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS feasibility_records (
    run_id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL,
    vehicle TEXT NOT NULL,
    service TEXT NOT NULL,
    solver TEXT NOT NULL,
    provider TEXT NOT NULL,
    vehicle_count INTEGER NOT NULL,
    capacity INTEGER NOT NULL,
    combined_capacity INTEGER NOT NULL,
    time_limit_secs INTEGER NOT NULL,
    outcome TEXT NOT NULL,
    description TEXT NOT NULL,
    route_count INTEGER NOT NULL,
    total_distance REAL NOT NULL,
    total_duration REAL NOT NULL,
    total_cost REAL NOT NULL,
    total_pickup INTEGER NOT NULL,
    total_dropoff INTEGER NOT NULL,
    time_per_vehicle TEXT NOT NULL,
    cost_per_vehicle TEXT NOT NULL,
    load_per_vehicle TEXT NOT NULL,
    pickup_per_vehicle TEXT NOT NULL,
    dropoff_per_vehicle TEXT NOT NULL,
    distance_per_vehicle TEXT NOT NULL,
    locations_per_vehicle TEXT NOT NULL,
    excluded_loops TEXT NOT NULL
)";

const INSERT: &str = "
INSERT INTO feasibility_records (
    label, vehicle, service, solver, provider, vehicle_count, capacity,
    combined_capacity, time_limit_secs, outcome, description, route_count,
    total_distance, total_duration, total_cost, total_pickup, total_dropoff,
    time_per_vehicle, cost_per_vehicle, load_per_vehicle, pickup_per_vehicle,
    dropoff_per_vehicle, distance_per_vehicle, locations_per_vehicle, excluded_loops
) VALUES (
    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
    ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25
)";

const SELECT: &str = "
SELECT run_id, label, vehicle, service, solver, provider, vehicle_count, capacity,
       combined_capacity, time_limit_secs, outcome, description, route_count,
       total_distance, total_duration, total_cost, total_pickup, total_dropoff,
       time_per_vehicle, cost_per_vehicle, load_per_vehicle, pickup_per_vehicle,
       dropoff_per_vehicle, distance_per_vehicle, locations_per_vehicle, excluded_loops
FROM feasibility_records ORDER BY run_id";

/// Appends feasibility records to a `feasibility_records` table.
///
/// Per-vehicle lists are stored as JSON text. The connection sits behind a
/// mutex, so one store can be shared by parallel runs.
pub struct SqliteFeasibilityStore {
    path: Option<PathBuf>,
    connection: Mutex<Connection>,
}

impl fmt::Debug for SqliteFeasibilityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteFeasibilityStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteFeasibilityStore {
    /// Open or create the report database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Database`] when the file cannot be opened or
    /// the schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let path = path.as_ref();
        let connection = Connection::open(path)?;
        Self::with_connection(connection, Some(path.to_path_buf()))
    }

    /// Open a private in-memory report.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Database`] when SQLite cannot initialise.
    pub fn open_in_memory() -> Result<Self, ReportError> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(connection: Connection, path: Option<PathBuf>) -> Result<Self, ReportError> {
        connection.execute_batch(SCHEMA)?;
        Ok(Self {
            path,
            connection: Mutex::new(connection),
        })
    }
}

impl FeasibilityStore for SqliteFeasibilityStore {
    fn append(&self, record: FeasibilityRecord) -> Result<u64, ReportError> {
        let context = &record.context;
        let connection = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        connection.execute(
            INSERT,
            params![
                context.label,
                context.vehicle.as_str(),
                context.service.as_str(),
                context.solver,
                context.provider,
                context.vehicle_count,
                context.capacity,
                context.combined_capacity,
                context.time_limit_secs,
                record.outcome.as_str(),
                record.description,
                record.route_count,
                record.total_distance,
                record.total_duration,
                record.total_cost,
                record.total_pickup,
                record.total_dropoff,
                serde_json::to_string(&record.time_per_vehicle)?,
                serde_json::to_string(&record.cost_per_vehicle)?,
                serde_json::to_string(&record.load_per_vehicle)?,
                serde_json::to_string(&record.pickup_per_vehicle)?,
                serde_json::to_string(&record.dropoff_per_vehicle)?,
                serde_json::to_string(&record.distance_per_vehicle)?,
                serde_json::to_string(&record.locations_per_vehicle)?,
                serde_json::to_string(&record.excluded_loops)?,
            ],
        )?;
        let run_id = u64::try_from(connection.last_insert_rowid()).map_err(|err| {
            ReportError::Corrupt {
                run_id: 0,
                message: err.to_string(),
            }
        })?;
        debug!("appended feasibility record {run_id}");
        Ok(run_id)
    }

    fn records(&self) -> Result<Vec<FeasibilityRecord>, ReportError> {
        let connection = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut statement = connection.prepare(SELECT)?;
        let mut rows = statement.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(read_record(row)?);
        }
        Ok(records)
    }
}

fn read_record(row: &Row<'_>) -> Result<FeasibilityRecord, ReportError> {
    let run_id: u64 = row.get(0)?;
    let vehicle: String = row.get(2)?;
    let service: String = row.get(3)?;
    let outcome: String = row.get(10)?;
    Ok(FeasibilityRecord {
        run_id: Some(run_id),
        context: RunContext {
            label: row.get(1)?,
            vehicle: parse_enum(run_id, vehicle)?,
            service: parse_enum(run_id, service)?,
            solver: row.get(4)?,
            provider: row.get(5)?,
            vehicle_count: row.get(6)?,
            capacity: row.get(7)?,
            combined_capacity: row.get(8)?,
            time_limit_secs: row.get(9)?,
        },
        outcome: outcome
            .parse::<RunOutcome>()
            .map_err(|message| ReportError::Corrupt { run_id, message })?,
        description: row.get(11)?,
        route_count: row.get(12)?,
        total_distance: row.get(13)?,
        total_duration: row.get(14)?,
        total_cost: row.get(15)?,
        total_pickup: row.get(16)?,
        total_dropoff: row.get(17)?,
        time_per_vehicle: parse_list(row, 18)?,
        cost_per_vehicle: parse_list(row, 19)?,
        load_per_vehicle: parse_list(row, 20)?,
        pickup_per_vehicle: parse_list(row, 21)?,
        dropoff_per_vehicle: parse_list(row, 22)?,
        distance_per_vehicle: parse_list(row, 23)?,
        locations_per_vehicle: parse_list(row, 24)?,
        excluded_loops: parse_list(row, 25)?,
    })
}

fn parse_list<T: DeserializeOwned>(row: &Row<'_>, column: usize) -> Result<Vec<T>, ReportError> {
    let text: String = row.get(column)?;
    Ok(serde_json::from_str(&text)?)
}

fn parse_enum<T: DeserializeOwned>(run_id: u64, name: String) -> Result<T, ReportError> {
    serde_json::from_value(serde_json::Value::String(name)).map_err(|err| ReportError::Corrupt {
        run_id,
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ServiceKind, VehicleKind};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn record() -> FeasibilityRecord {
        FeasibilityRecord {
            run_id: None,
            context: RunContext {
                label: "bikes=4".into(),
                vehicle: VehicleKind::Bike,
                service: ServiceKind::Combined,
                solver: "vrp".into(),
                provider: "osrm".into(),
                vehicle_count: 4,
                capacity: 6,
                combined_capacity: 8,
                time_limit_secs: 30,
            },
            outcome: RunOutcome::Partial,
            description: "loop 2 excluded".into(),
            route_count: 2,
            total_distance: 1500.5,
            total_duration: 400.0,
            total_cost: 3001.0,
            total_pickup: 11,
            total_dropoff: 3,
            time_per_vehicle: vec![150.0, 250.0],
            cost_per_vehicle: vec![1000.0, 2001.0],
            load_per_vehicle: vec![5, 6],
            pickup_per_vehicle: vec![5, 6],
            dropoff_per_vehicle: vec![1, 2],
            distance_per_vehicle: vec![500.0, 1000.5],
            locations_per_vehicle: vec![3, 4],
            excluded_loops: vec![2],
        }
    }

    #[rstest]
    fn records_survive_reopening(record: FeasibilityRecord) {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("report.sqlite");
        {
            let store = SqliteFeasibilityStore::open(&path).expect("open store");
            assert_eq!(store.append(record.clone()).expect("first"), 1);
            assert_eq!(store.append(record.clone()).expect("second"), 2);
        }
        let store = SqliteFeasibilityStore::open(&path).expect("reopen store");
        let stored = store.records().expect("read back");
        assert_eq!(stored.len(), 2);
        let first = stored.first().expect("first record");
        assert_eq!(first.run_id, Some(1));
        assert_eq!(first.context, record.context);
        assert_eq!(first.load_per_vehicle, record.load_per_vehicle);
        assert_eq!(first.pickup_per_vehicle, record.pickup_per_vehicle);
        assert_eq!(first.dropoff_per_vehicle, record.dropoff_per_vehicle);
        assert_eq!(first.excluded_loops, record.excluded_loops);
        assert_eq!(first.outcome, RunOutcome::Partial);
        assert_eq!(stored.get(1), Some(&FeasibilityRecord { run_id: Some(2), ..record }));
    }

    #[rstest]
    fn in_memory_store_starts_empty() {
        let store = SqliteFeasibilityStore::open_in_memory().expect("open store");
        assert!(store.records().expect("read").is_empty());
    }
}
