// 🏆 Entity Ranking Engine - who is keeping up and who is falling behind
//
// Score per entity:
//   availability_pct = share of HIGH-status records in the last 7 days
//   update_pct       = mean % change of totals vs. the reference record,
//                      over systems that have something to compare
// Ordered by availability, then update, then name.

use crate::availability::{is_high_status, percentage};
use crate::db::ExecutionRecord;
use crate::snapshot::{PairHistory, PairKey, Snapshot};
use crate::trend::parse_totals;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const DEFAULT_RANKING_LIMIT: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRanking {
    pub name: String,
    pub systems_count: usize,
    pub availability_pct: u32,
    pub update_pct: f64,
}

/// 100 * (current - reference) / reference, when that is defined
pub fn system_change_pct(history: &PairHistory) -> Option<f64> {
    let current = history.current.as_ref()?;
    let reference = history.reference.as_ref()?;
    let (now, before) = parse_totals(current, reference)?;

    if before <= 0 {
        return None;
    }
    // f64 keeps the subtraction total for extreme totals
    Some((now as f64 - before as f64) / before as f64 * 100.0)
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Recent-window availability as a rounded percentage
pub fn recent_availability_pct(recent: &[ExecutionRecord]) -> u32 {
    let high = recent.iter().filter(|r| is_high_status(&r.status)).count();
    percentage(high, recent.len())
}

/// Mean change over qualifying systems; systems without a comparison do not
/// count toward the divisor
pub fn average_update_pct(pairs: &[(&PairKey, &PairHistory)]) -> f64 {
    let changes: Vec<f64> = pairs
        .iter()
        .filter_map(|(_, history)| system_change_pct(history))
        .collect();

    if changes.is_empty() {
        return 0.0;
    }
    round_to_hundredths(changes.iter().sum::<f64>() / changes.len() as f64)
}

pub fn score_entity(
    entity: &str,
    pairs: &[(&PairKey, &PairHistory)],
    recent: &[ExecutionRecord],
) -> EntityRanking {
    EntityRanking {
        name: entity.to_string(),
        systems_count: pairs.len(),
        availability_pct: recent_availability_pct(recent),
        update_pct: average_update_pct(pairs),
    }
}

fn ranking_order(a: &EntityRanking, b: &EntityRanking) -> Ordering {
    b.availability_pct
        .cmp(&a.availability_pct)
        .then_with(|| b.update_pct.total_cmp(&a.update_pct))
        .then_with(|| a.name.cmp(&b.name))
}

/// Top `limit` entities; the caller is expected to pass a validated limit
pub fn rank_entities(snapshot: &Snapshot, limit: usize) -> Vec<EntityRanking> {
    let mut ranking: Vec<EntityRanking> = snapshot
        .pairs_by_entity()
        .into_iter()
        .map(|(entity, pairs)| score_entity(entity, &pairs, snapshot.recent_records(entity)))
        .collect();

    ranking.sort_by(ranking_order);
    ranking.truncate(limit);
    ranking
}
