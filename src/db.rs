// 🗄️ Record Store Access - read-only queries over execution reports
//
// The aggregation engine never writes. Everything it needs comes through the
// RecordStore trait: five point queries plus two batch queries that the
// SQLite store answers with set-oriented window functions.

use crate::error::StoreError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// MODEL
// ============================================================================

/// Catalog entry for a data-producing system (reference data, never owned here)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemDefinition {
    /// Stable identifier, e.g. "S1" or "S3_graves"
    pub code: String,

    /// Display label from the catalog
    pub name: String,
}

impl SystemDefinition {
    pub fn new(code: &str, name: &str) -> Self {
        SystemDefinition {
            code: code.to_string(),
            name: name.to_string(),
        }
    }
}

/// One execution report row: (entity, system, run)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Reporting organization (ente)
    pub entity: String,

    /// References SystemDefinition::code
    pub system_code: String,

    pub execution_date: NaiveDate,
    pub execution_time: NaiveTime,

    /// Free-text health description
    pub status: String,

    /// Count stored as text, may carry grouping separators ("1,000")
    pub total_records: String,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_timestamp: Option<NaiveDateTime>,
}

impl ExecutionRecord {
    pub fn new(
        entity: &str,
        system_code: &str,
        execution_date: NaiveDate,
        execution_time: NaiveTime,
        status: &str,
        total_records: &str,
    ) -> Self {
        ExecutionRecord {
            entity: entity.to_string(),
            system_code: system_code.to_string(),
            execution_date,
            execution_time,
            status: status.to_string(),
            total_records: total_records.to_string(),
            import_timestamp: None,
        }
    }

    /// Key used to decide which record is "latest"
    pub fn ordering_key(&self) -> (NaiveDate, NaiveTime) {
        (self.execution_date, self.execution_time)
    }
}

// ============================================================================
// STORE CONTRACT
// ============================================================================

/// Read-only access to the execution-record and system-catalog collections
///
/// Implementations must answer every call of one aggregation run from the same
/// logical state; [`crate::snapshot::Snapshot::capture_sqlite`] does this with a
/// read transaction.
pub trait RecordStore {
    fn list_systems(&self) -> StoreResult<Vec<SystemDefinition>>;

    /// Distinct (entity, system_code) pairs, sorted
    fn list_distinct_pairs(&self) -> StoreResult<Vec<(String, String)>>;

    fn latest_record(&self, entity: &str, system_code: &str)
        -> StoreResult<Option<ExecutionRecord>>;

    fn latest_record_at_or_before(
        &self,
        entity: &str,
        system_code: &str,
        cutoff: NaiveDate,
    ) -> StoreResult<Option<ExecutionRecord>>;

    /// Records of one entity with execution_date >= start
    fn records_since(&self, entity: &str, start: NaiveDate) -> StoreResult<Vec<ExecutionRecord>>;

    /// Latest record of every pair, optionally restricted to execution_date <= cutoff
    ///
    /// Default goes pair by pair; stores that can do better should override.
    fn latest_per_pair(&self, cutoff: Option<NaiveDate>) -> StoreResult<Vec<ExecutionRecord>> {
        let mut latest = Vec::new();
        for (entity, system_code) in self.list_distinct_pairs()? {
            let record = match cutoff {
                Some(cutoff) => self.latest_record_at_or_before(&entity, &system_code, cutoff)?,
                None => self.latest_record(&entity, &system_code)?,
            };
            latest.extend(record);
        }
        Ok(latest)
    }

    /// Records of every entity with execution_date >= start
    fn all_records_since(&self, start: NaiveDate) -> StoreResult<Vec<ExecutionRecord>> {
        let entities: BTreeSet<String> = self
            .list_distinct_pairs()?
            .into_iter()
            .map(|(entity, _)| entity)
            .collect();

        let mut records = Vec::new();
        for entity in entities {
            records.extend(self.records_since(&entity, start)?);
        }
        Ok(records)
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Vector-backed store; insertion order breaks exact (date, time) ties
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    systems: Vec<SystemDefinition>,
    records: Vec<ExecutionRecord>,
}

impl MemoryStore {
    pub fn new(systems: Vec<SystemDefinition>, records: Vec<ExecutionRecord>) -> Self {
        MemoryStore { systems, records }
    }

    pub fn push_record(&mut self, record: ExecutionRecord) {
        self.records.push(record);
    }

    fn pair_records<'a>(
        &'a self,
        entity: &'a str,
        system_code: &'a str,
    ) -> impl Iterator<Item = &'a ExecutionRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| r.entity == entity && r.system_code == system_code)
    }
}

impl RecordStore for MemoryStore {
    fn list_systems(&self) -> StoreResult<Vec<SystemDefinition>> {
        Ok(self.systems.clone())
    }

    fn list_distinct_pairs(&self) -> StoreResult<Vec<(String, String)>> {
        let pairs: BTreeSet<(String, String)> = self
            .records
            .iter()
            .map(|r| (r.entity.clone(), r.system_code.clone()))
            .collect();
        Ok(pairs.into_iter().collect())
    }

    fn latest_record(
        &self,
        entity: &str,
        system_code: &str,
    ) -> StoreResult<Option<ExecutionRecord>> {
        // max_by_key keeps the last maximum, i.e. the most recently pushed on ties
        Ok(self
            .pair_records(entity, system_code)
            .max_by_key(|r| r.ordering_key())
            .cloned())
    }

    fn latest_record_at_or_before(
        &self,
        entity: &str,
        system_code: &str,
        cutoff: NaiveDate,
    ) -> StoreResult<Option<ExecutionRecord>> {
        Ok(self
            .pair_records(entity, system_code)
            .filter(|r| r.execution_date <= cutoff)
            .max_by_key(|r| r.ordering_key())
            .cloned())
    }

    fn records_since(&self, entity: &str, start: NaiveDate) -> StoreResult<Vec<ExecutionRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.entity == entity && r.execution_date >= start)
            .cloned()
            .collect())
    }
}

// ============================================================================
// SQLITE STORE
// ============================================================================

const RECORD_COLUMNS: &str =
    "entity, system_code, execution_date, execution_time, status, total_records, import_timestamp";

/// Store over a borrowed SQLite connection (or an open transaction, via deref)
pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        SqliteStore { conn }
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    Ok(ExecutionRecord {
        entity: row.get(0)?,
        system_code: row.get(1)?,
        execution_date: row.get(2)?,
        execution_time: row.get(3)?,
        status: row.get(4)?,
        total_records: row.get(5)?,
        import_timestamp: row.get(6)?,
    })
}

fn date_param(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl RecordStore for SqliteStore<'_> {
    fn list_systems(&self) -> StoreResult<Vec<SystemDefinition>> {
        let mut stmt = self
            .conn
            .prepare("SELECT code, name FROM system_catalog ORDER BY code")?;

        let systems = stmt
            .query_map([], |row| {
                Ok(SystemDefinition {
                    code: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(systems)
    }

    fn list_distinct_pairs(&self) -> StoreResult<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT entity, system_code
             FROM execution_records
             ORDER BY entity, system_code",
        )?;

        let pairs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(pairs)
    }

    fn latest_record(
        &self,
        entity: &str,
        system_code: &str,
    ) -> StoreResult<Option<ExecutionRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS}
             FROM execution_records
             WHERE entity = ?1 AND system_code = ?2
             ORDER BY execution_date DESC, execution_time DESC, id DESC
             LIMIT 1"
        );

        let record = self
            .conn
            .query_row(&sql, params![entity, system_code], record_from_row)
            .optional()?;

        Ok(record)
    }

    fn latest_record_at_or_before(
        &self,
        entity: &str,
        system_code: &str,
        cutoff: NaiveDate,
    ) -> StoreResult<Option<ExecutionRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS}
             FROM execution_records
             WHERE entity = ?1 AND system_code = ?2 AND execution_date <= ?3
             ORDER BY execution_date DESC, execution_time DESC, id DESC
             LIMIT 1"
        );

        let record = self
            .conn
            .query_row(
                &sql,
                params![entity, system_code, date_param(cutoff)],
                record_from_row,
            )
            .optional()?;

        Ok(record)
    }

    fn records_since(&self, entity: &str, start: NaiveDate) -> StoreResult<Vec<ExecutionRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS}
             FROM execution_records
             WHERE entity = ?1 AND execution_date >= ?2
             ORDER BY execution_date, execution_time, id"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![entity, date_param(start)], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn latest_per_pair(&self, cutoff: Option<NaiveDate>) -> StoreResult<Vec<ExecutionRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS}
             FROM (
                 SELECT *, ROW_NUMBER() OVER (
                     PARTITION BY entity, system_code
                     ORDER BY execution_date DESC, execution_time DESC, id DESC
                 ) AS rn
                 FROM execution_records
                 WHERE ?1 IS NULL OR execution_date <= ?1
             )
             WHERE rn = 1
             ORDER BY entity, system_code"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![cutoff.map(date_param)], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn all_records_since(&self, start: NaiveDate) -> StoreResult<Vec<ExecutionRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS}
             FROM execution_records
             WHERE execution_date >= ?1
             ORDER BY entity, execution_date, execution_time, id"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![date_param(start)], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

// ============================================================================
// CONNECTION & REFERENCE SCHEMA
// ============================================================================

/// Open an existing database for reading only
pub fn open_read_only(path: &Path, busy_timeout: Duration) -> StoreResult<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(busy_timeout)?;
    Ok(conn)
}

/// Create the tables the SQLite store reads from
///
/// Schema ownership belongs to the ingestion side; this is the layout the
/// queries above expect, used to stand up local and test databases.
pub fn setup_database(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS system_catalog (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS execution_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            execution_date TEXT NOT NULL,
            execution_time TEXT NOT NULL,
            entity TEXT NOT NULL,
            total_records TEXT NOT NULL,
            status TEXT NOT NULL,
            system_code TEXT NOT NULL,
            import_timestamp TEXT DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_date ON execution_records(execution_date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_entity ON execution_records(entity)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_system ON execution_records(system_code)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_pair_latest
         ON execution_records(entity, system_code, execution_date, execution_time)",
        [],
    )?;

    Ok(())
}

pub fn insert_system(conn: &Connection, system: &SystemDefinition) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO system_catalog (code, name) VALUES (?1, ?2)",
        params![system.code, system.name],
    )?;
    Ok(())
}

/// Append one record, returning its row id
pub fn insert_record(conn: &Connection, record: &ExecutionRecord) -> StoreResult<i64> {
    conn.execute(
        "INSERT INTO execution_records (
            execution_date, execution_time, entity, total_records, status, system_code,
            import_timestamp
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, COALESCE(?7, CURRENT_TIMESTAMP))",
        params![
            date_param(record.execution_date),
            record.execution_time.format("%H:%M:%S").to_string(),
            record.entity,
            record.total_records,
            record.status,
            record.system_code,
            record
                .import_timestamp
                .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string()),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn fixture_records() -> Vec<ExecutionRecord> {
        vec![
            ExecutionRecord::new("ENTE_A", "S1", date(2024, 1, 1), time(8, 0), "Disponible", "1,000"),
            ExecutionRecord::new("ENTE_A", "S1", date(2023, 12, 1), time(8, 0), "Disponible", "800"),
            ExecutionRecord::new("ENTE_A", "S1", date(2024, 1, 1), time(7, 0), "Parcial", "900"),
            ExecutionRecord::new("ENTE_A", "S2", date(2023, 11, 15), time(9, 30), "Error", "0"),
            ExecutionRecord::new("ENTE_B", "S1", date(2024, 1, 2), time(6, 45), "Exitoso", "50"),
        ]
    }

    fn sqlite_fixture() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        insert_system(&conn, &SystemDefinition::new("S1", "Sistema 1 - Declaraciones")).unwrap();
        insert_system(&conn, &SystemDefinition::new("S2", "Sistema 2 - Servidores")).unwrap();
        for record in fixture_records() {
            insert_record(&conn, &record).unwrap();
        }
        conn
    }

    fn memory_fixture() -> MemoryStore {
        MemoryStore::new(
            vec![
                SystemDefinition::new("S1", "Sistema 1 - Declaraciones"),
                SystemDefinition::new("S2", "Sistema 2 - Servidores"),
            ],
            fixture_records(),
        )
    }

    #[test]
    fn test_setup_database_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();
    }

    #[test]
    fn test_list_systems_sorted_by_code() {
        let conn = sqlite_fixture();
        let store = SqliteStore::new(&conn);

        let systems = store.list_systems().unwrap();
        let codes: Vec<&str> = systems.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["S1", "S2"]);
    }

    #[test]
    fn test_distinct_pairs() {
        let conn = sqlite_fixture();
        let store = SqliteStore::new(&conn);

        let pairs = store.list_distinct_pairs().unwrap();
        assert_eq!(
            pairs,
            vec![
                ("ENTE_A".to_string(), "S1".to_string()),
                ("ENTE_A".to_string(), "S2".to_string()),
                ("ENTE_B".to_string(), "S1".to_string()),
            ]
        );
        assert_eq!(pairs, memory_fixture().list_distinct_pairs().unwrap());
    }

    #[test]
    fn test_latest_record_orders_by_date_then_time() {
        let conn = sqlite_fixture();
        let store = SqliteStore::new(&conn);

        let latest = store.latest_record("ENTE_A", "S1").unwrap().unwrap();
        assert_eq!(latest.execution_time, time(8, 0));
        assert_eq!(latest.total_records, "1,000");
        assert!(latest.import_timestamp.is_some());

        assert!(store.latest_record("ENTE_C", "S1").unwrap().is_none());
    }

    #[test]
    fn test_latest_record_exact_tie_prefers_last_inserted() {
        let conn = sqlite_fixture();
        let late = ExecutionRecord::new("ENTE_B", "S1", date(2024, 1, 2), time(6, 45), "Error", "7");
        insert_record(&conn, &late).unwrap();

        let latest = SqliteStore::new(&conn).latest_record("ENTE_B", "S1").unwrap().unwrap();
        assert_eq!(latest.status, "Error");

        let mut memory = memory_fixture();
        memory.push_record(late);
        let latest = memory.latest_record("ENTE_B", "S1").unwrap().unwrap();
        assert_eq!(latest.status, "Error");
    }

    #[test]
    fn test_latest_record_at_or_before_cutoff_is_inclusive() {
        let conn = sqlite_fixture();
        let store = SqliteStore::new(&conn);

        let reference = store
            .latest_record_at_or_before("ENTE_A", "S1", date(2023, 12, 1))
            .unwrap()
            .unwrap();
        assert_eq!(reference.total_records, "800");

        assert!(store
            .latest_record_at_or_before("ENTE_A", "S1", date(2023, 11, 30))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_records_since_filters_entity_and_date() {
        let conn = sqlite_fixture();
        let store = SqliteStore::new(&conn);

        let recent = store.records_since("ENTE_A", date(2023, 12, 1)).unwrap();
        assert_eq!(recent.len(), 3);
        assert!(recent.iter().all(|r| r.entity == "ENTE_A"));

        let memory = memory_fixture();
        assert_eq!(memory.records_since("ENTE_A", date(2023, 12, 1)).unwrap().len(), 3);
    }

    #[test]
    fn test_batch_queries_match_default_per_pair_path() {
        let conn = sqlite_fixture();
        let sqlite = SqliteStore::new(&conn);
        let memory = memory_fixture();

        for cutoff in [None, Some(date(2023, 12, 15)), Some(date(2020, 1, 1))] {
            let mut from_sqlite = sqlite.latest_per_pair(cutoff).unwrap();
            let mut from_memory = memory.latest_per_pair(cutoff).unwrap();
            for record in from_sqlite.iter_mut().chain(from_memory.iter_mut()) {
                record.import_timestamp = None;
            }
            assert_eq!(from_sqlite, from_memory);
        }

        let since = date(2023, 12, 1);
        assert_eq!(
            sqlite.all_records_since(since).unwrap().len(),
            memory.all_records_since(since).unwrap().len()
        );
    }

    #[test]
    fn test_latest_per_pair_one_row_per_pair() {
        let conn = sqlite_fixture();
        let latest = SqliteStore::new(&conn).latest_per_pair(None).unwrap();

        assert_eq!(latest.len(), 3);
        assert_eq!(latest[0].total_records, "1,000");
        assert_eq!(latest[1].status, "Error");
        assert_eq!(latest[2].entity, "ENTE_B");
    }

    #[test]
    fn test_missing_table_surfaces_store_error() {
        let conn = Connection::open_in_memory().unwrap();
        let result = SqliteStore::new(&conn).list_distinct_pairs();
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
    }

    #[test]
    fn test_records_with_uncatalogued_system_are_stored() {
        let conn = sqlite_fixture();
        insert_record(
            &conn,
            &ExecutionRecord::new("ENTE_C", "S9_nuevo", date(2024, 1, 3), time(8, 0), "Exitoso", "5"),
        )
        .unwrap();

        let store = SqliteStore::new(&conn);
        let pairs = store.list_distinct_pairs().unwrap();
        assert!(pairs.contains(&("ENTE_C".to_string(), "S9_nuevo".to_string())));
        assert!(store.latest_record("ENTE_C", "S9_nuevo").unwrap().is_some());
    }
}
