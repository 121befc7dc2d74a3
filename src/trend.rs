// 📈 Trend Classifier - current total vs. the total ~30 days earlier

use crate::db::ExecutionRecord;
use crate::snapshot::{PairHistory, Snapshot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Updated,
    NoChange,
    Decreased,
}

/// Parse a stored count, dropping grouping separators ("1,000" → 1000)
///
/// Parsed as i128 so any count an entity can plausibly report fits.
/// None means unparsable; callers treat that as a soft condition.
pub fn parse_total(raw: &str) -> Option<i128> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse().ok()
}

/// Both totals of a current/reference pair, if both parse
pub fn parse_totals(current: &ExecutionRecord, reference: &ExecutionRecord) -> Option<(i128, i128)> {
    Some((parse_total(&current.total_records)?, parse_total(&reference.total_records)?))
}

/// None when the pair has no current record (excluded from the distribution)
pub fn classify_trend(
    current: Option<&ExecutionRecord>,
    reference: Option<&ExecutionRecord>,
) -> Option<Trend> {
    let current = current?;
    let Some(reference) = reference else {
        return Some(Trend::NoChange);
    };

    let trend = match parse_totals(current, reference) {
        Some((now, before)) if now > before => Trend::Updated,
        Some((now, before)) if now < before => Trend::Decreased,
        // equal totals, or a value we could not read
        _ => Trend::NoChange,
    };
    Some(trend)
}

pub fn classify_pair(history: &PairHistory) -> Option<Trend> {
    classify_trend(history.current.as_ref(), history.reference.as_ref())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrendCounts {
    pub updated: usize,
    pub no_change: usize,
    pub decreased: usize,
}

impl TrendCounts {
    pub fn add(&mut self, trend: Trend) {
        match trend {
            Trend::Updated => self.updated += 1,
            Trend::NoChange => self.no_change += 1,
            Trend::Decreased => self.decreased += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.updated + self.no_change + self.decreased
    }
}

pub fn trend_counts(snapshot: &Snapshot) -> TrendCounts {
    let mut counts = TrendCounts::default();
    for trend in snapshot.pairs().filter_map(|(_, history)| classify_pair(history)) {
        counts.add(trend);
    }
    counts
}
