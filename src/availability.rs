// 🟢 Availability Classifier - status text → HIGH / MEDIUM / LOW
//
// Status strings are free text written by each reporting entity, so matching
// is a case-insensitive substring test rather than an exact vocabulary.

use crate::db::ExecutionRecord;
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};

const HIGH_MARKERS: [&str; 2] = ["exitoso", "disponible"];
const MEDIUM_MARKERS: [&str; 2] = ["parcial", "limitado"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    High,
    Medium,
    Low,
}

fn contains_any(status: &str, markers: &[&str]) -> bool {
    let status = status.to_lowercase();
    markers.iter().any(|marker| status.contains(marker))
}

/// HIGH-tier predicate on its own (also used by the ranking window)
pub fn is_high_status(status: &str) -> bool {
    contains_any(status, &HIGH_MARKERS)
}

pub fn classify(status: &str) -> Tier {
    if is_high_status(status) {
        Tier::High
    } else if contains_any(status, &MEDIUM_MARKERS) {
        Tier::Medium
    } else {
        Tier::Low
    }
}

/// Absence of a current record counts as unavailable
pub fn classify_record(record: Option<&ExecutionRecord>) -> Tier {
    record.map_or(Tier::Low, |r| classify(&r.status))
}

// ============================================================================
// AGGREGATE
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl TierCounts {
    pub fn add(&mut self, tier: Tier) {
        match tier {
            Tier::High => self.high += 1,
            Tier::Medium => self.medium += 1,
            Tier::Low => self.low += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }

    /// round(100 * high / total), 0 when there is nothing to count
    pub fn high_pct(&self) -> u32 {
        percentage(self.high, self.total())
    }
}

/// Integer percentage with half-to-even rounding; 0 for an empty denominator
pub fn percentage(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let pct = (part as f64 / total as f64 * 100.0).round_ties_even();
    pct.clamp(0.0, 100.0) as u32
}

/// Tier of every pair's current record
pub fn tier_counts(snapshot: &Snapshot) -> TierCounts {
    let mut counts = TierCounts::default();
    for (_, history) in snapshot.pairs() {
        counts.add(classify_record(history.current.as_ref()));
    }
    counts
}

pub fn high_availability_pct(snapshot: &Snapshot) -> u32 {
    tier_counts(snapshot).high_pct()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::snapshot::{PairHistory, PairKey};
    use chrono::{NaiveDate, NaiveTime};

    fn record(entity: &str, status: &str) -> ExecutionRecord {
        ExecutionRecord::new(
            entity,
            "S1",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            status,
            "10",
        )
    }

    #[test]
    fn test_classify_high_markers() {
        assert_eq!(classify("Exitoso"), Tier::High);
        assert_eq!(classify("Servicio DISPONIBLE"), Tier::High);
        assert_eq!(classify("ejecución exitosa"), Tier::Low); // "exitosa" is not "exitoso"
    }

    #[test]
    fn test_classify_medium_markers() {
        assert_eq!(classify("Carga parcial"), Tier::Medium);
        assert_eq!(classify("Acceso LIMITADO"), Tier::Medium);
    }

    #[test]
    fn test_classify_low_fallback() {
        assert_eq!(classify("Error de conexión"), Tier::Low);
        assert_eq!(classify(""), Tier::Low);
        assert_eq!(classify("timeout"), Tier::Low);
    }

    #[test]
    fn test_high_wins_over_medium() {
        assert_eq!(classify("Disponible parcial"), Tier::High);
    }

    #[test]
    fn test_no_disponible_still_matches_high_marker() {
        // substring rule: "no disponible" contains "disponible"
        assert_eq!(classify("No disponible"), Tier::High);
    }

    #[test]
    fn test_classify_is_deterministic() {
        for status in ["Exitoso", "parcial", "caído", "Limitado y disponible", "ERROR"] {
            assert_eq!(classify(status), classify(status));
        }
    }

    #[test]
    fn test_absent_record_is_low() {
        assert_eq!(classify_record(None), Tier::Low);
        assert_eq!(classify_record(Some(&record("A", "Exitoso"))), Tier::High);
    }

    #[test]
    fn test_percentage_bounds() {
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(3, 3), 100);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        // 12.5 rounds to even
        assert_eq!(percentage(1, 8), 12);
    }

    #[test]
    fn test_high_pct_zero_pairs() {
        let snapshot =
            Snapshot::capture(&MemoryStore::default(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).unwrap();
        assert_eq!(high_availability_pct(&snapshot), 0);
    }

    #[test]
    fn test_tier_counts_over_current_records() {
        let store = MemoryStore::new(
            vec![],
            vec![record("A", "Exitoso"), record("B", "Parcial"), record("C", "Error"), record("D", "Disponible")],
        );
        let mut snapshot = Snapshot::capture(&store, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()).unwrap();
        snapshot.insert_pair(PairKey::new("E", "S1"), PairHistory::default());

        let counts = tier_counts(&snapshot);
        assert_eq!(counts, TierCounts { high: 2, medium: 1, low: 2 });
        assert_eq!(counts.high_pct(), 40);
    }
}
