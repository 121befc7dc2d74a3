// 📸 Snapshot - one consistent read of the record store per aggregation run
//
// Every dashboard view is computed from the same Snapshot, so counters and
// charts in one response can never disagree with each other.

use crate::db::{ExecutionRecord, RecordStore, SqliteStore, StoreResult, SystemDefinition};
use chrono::{Days, NaiveDate};
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Reference record is the latest one at least this many days old
pub const REFERENCE_WINDOW_DAYS: u64 = 30;

/// Trailing window used for per-entity availability
pub const RECENT_WINDOW_DAYS: u64 = 7;

// ============================================================================
// PAIRS
// ============================================================================

/// (entity, system) combination - the unit of health and trend analysis
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    pub entity: String,
    pub system_code: String,
}

impl PairKey {
    pub fn new(entity: &str, system_code: &str) -> Self {
        PairKey {
            entity: entity.to_string(),
            system_code: system_code.to_string(),
        }
    }

    fn of(record: &ExecutionRecord) -> Self {
        PairKey::new(&record.entity, &record.system_code)
    }
}

/// The two records every per-pair classifier looks at
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairHistory {
    /// Latest record overall
    pub current: Option<ExecutionRecord>,

    /// Latest record dated on or before the reference cutoff
    pub reference: Option<ExecutionRecord>,
}

// ============================================================================
// SYSTEM CATALOG
// ============================================================================

/// Read-only code -> SystemDefinition table handed to the formatting steps
#[derive(Debug, Clone, Default)]
pub struct SystemCatalog {
    systems: BTreeMap<String, SystemDefinition>,
}

impl SystemCatalog {
    pub fn new(systems: Vec<SystemDefinition>) -> Self {
        SystemCatalog {
            systems: systems
                .into_iter()
                .map(|system| (system.code.clone(), system))
                .collect(),
        }
    }

    pub fn get(&self, code: &str) -> Option<&SystemDefinition> {
        self.systems.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.systems.contains_key(code)
    }

    /// Systems in code order
    pub fn iter(&self) -> impl Iterator<Item = &SystemDefinition> {
        self.systems.values()
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

#[derive(Debug, Clone)]
pub struct Snapshot {
    as_of: NaiveDate,
    catalog: SystemCatalog,
    pairs: BTreeMap<PairKey, PairHistory>,
    recent: BTreeMap<String, Vec<ExecutionRecord>>,
}

fn days_before(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}

impl Snapshot {
    /// Load everything the engine needs with set-oriented queries
    ///
    /// Five store calls regardless of how many pairs exist (for stores that
    /// override the batch methods).
    pub fn capture<S: RecordStore + ?Sized>(store: &S, as_of: NaiveDate) -> StoreResult<Self> {
        let reference_cutoff = days_before(as_of, REFERENCE_WINDOW_DAYS);
        let recent_start = days_before(as_of, RECENT_WINDOW_DAYS);

        let catalog = SystemCatalog::new(store.list_systems()?);

        let mut pairs: BTreeMap<PairKey, PairHistory> = store
            .list_distinct_pairs()?
            .into_iter()
            .map(|(entity, system_code)| (PairKey::new(&entity, &system_code), PairHistory::default()))
            .collect();

        for record in store.latest_per_pair(None)? {
            let key = PairKey::of(&record);
            pairs.entry(key).or_default().current = Some(record);
        }

        for record in store.latest_per_pair(Some(reference_cutoff))? {
            let key = PairKey::of(&record);
            pairs.entry(key).or_default().reference = Some(record);
        }

        let mut recent: BTreeMap<String, Vec<ExecutionRecord>> = BTreeMap::new();
        for record in store.all_records_since(recent_start)? {
            recent.entry(record.entity.clone()).or_default().push(record);
        }

        let unknown: BTreeSet<&str> = pairs
            .keys()
            .map(|key| key.system_code.as_str())
            .filter(|code| !catalog.contains(code))
            .collect();
        for code in unknown {
            warn!(system_code = code, "records reference a system missing from the catalog");
        }

        debug!(
            %as_of,
            pairs = pairs.len(),
            systems = catalog.len(),
            recent_entities = recent.len(),
            "snapshot captured"
        );

        Ok(Snapshot {
            as_of,
            catalog,
            pairs,
            recent,
        })
    }

    /// Capture inside one read transaction so all queries see the same data
    pub fn capture_sqlite(conn: &Connection, as_of: NaiveDate) -> StoreResult<Self> {
        let tx = conn.unchecked_transaction()?;
        let snapshot = Snapshot::capture(&SqliteStore::new(&tx), as_of)?;
        tx.commit()?;
        Ok(snapshot)
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn reference_cutoff(&self) -> NaiveDate {
        days_before(self.as_of, REFERENCE_WINDOW_DAYS)
    }

    pub fn recent_start(&self) -> NaiveDate {
        days_before(self.as_of, RECENT_WINDOW_DAYS)
    }

    pub fn catalog(&self) -> &SystemCatalog {
        &self.catalog
    }

    /// All pairs in (entity, system_code) order
    pub fn pairs(&self) -> impl Iterator<Item = (&PairKey, &PairHistory)> {
        self.pairs.iter()
    }

    pub fn pair(&self, entity: &str, system_code: &str) -> Option<&PairHistory> {
        self.pairs.get(&PairKey::new(entity, system_code))
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Distinct entities, ascending
    pub fn entities(&self) -> Vec<&str> {
        let entities: BTreeSet<&str> = self.pairs.keys().map(|key| key.entity.as_str()).collect();
        entities.into_iter().collect()
    }

    /// Pairs grouped by entity, both levels ascending
    pub fn pairs_by_entity(&self) -> BTreeMap<&str, Vec<(&PairKey, &PairHistory)>> {
        let mut grouped: BTreeMap<&str, Vec<(&PairKey, &PairHistory)>> = BTreeMap::new();
        for (key, history) in &self.pairs {
            grouped.entry(key.entity.as_str()).or_default().push((key, history));
        }
        grouped
    }

    /// Records of one entity inside the trailing availability window
    pub fn recent_records(&self, entity: &str) -> &[ExecutionRecord] {
        self.recent.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    #[cfg(test)]
    pub(crate) fn insert_pair(&mut self, key: PairKey, history: PairHistory) {
        self.pairs.insert(key, history);
    }
}
