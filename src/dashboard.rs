// 📊 Dashboard Aggregator - headline counters and chart-ready datasets
//
// Every view here takes the same &Snapshot. The composite payload computes
// alerts and tier counts once and derives the summary from them, so the
// numbers inside one response always agree.

use crate::alerts::{critical_count, generate_alerts, system_display_name, Alert};
use crate::availability::{tier_counts, TierCounts};
use crate::ranking::{rank_entities, EntityRanking};
use crate::snapshot::Snapshot;
use crate::trend::{trend_counts, TrendCounts};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_SYSTEM_COLOR: &str = "#64748b";

const SYSTEM_COLORS: [(&str, &str); 6] = [
    ("S1", "#3b82f6"),
    ("S2", "#8b5cf6"),
    ("S3_graves", "#ec4899"),
    ("S3_no_graves", "#f59e0b"),
    ("S3_personas_fisicas", "#84cc16"),
    ("S3_personas_morales", "#14b8a6"),
];

// ============================================================================
// PAYLOAD TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub entes_conectados: usize,
    pub apis_conectadas: usize,
    pub alta_disponibilidad_pct: u32,
    pub alertas_criticas: usize,
}

/// One bar / pie segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSlice {
    pub name: String,
    pub value: usize,
    pub color: String,
}

impl ChartSlice {
    fn new(name: &str, value: usize, color: &str) -> Self {
        ChartSlice {
            name: name.to_string(),
            value,
            color: color.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardPayload {
    #[serde(flatten)]
    pub summary: Summary,
    pub distribucion_apis: Vec<ChartSlice>,
    pub disponibilidad_apis: Vec<ChartSlice>,
    pub actualizacion_registros: Vec<ChartSlice>,
    pub ranking_entes: Vec<EntityRanking>,
    pub alertas: Vec<Alert>,
}

/// Catalog entry as exposed to the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemListing {
    pub code: String,
    pub name: String,
    pub display_name: String,
}

// ============================================================================
// VIEWS
// ============================================================================

fn summarize(snapshot: &Snapshot, tiers: &TierCounts, alerts: &[Alert]) -> Summary {
    Summary {
        entes_conectados: snapshot.entities().len(),
        apis_conectadas: snapshot.pair_count(),
        alta_disponibilidad_pct: tiers.high_pct(),
        alertas_criticas: critical_count(alerts),
    }
}

pub fn summary(snapshot: &Snapshot) -> Summary {
    summarize(snapshot, &tier_counts(snapshot), &generate_alerts(snapshot))
}

fn system_color(code: &str) -> &'static str {
    SYSTEM_COLORS
        .iter()
        .find(|(known, _)| *known == code)
        .map_or(DEFAULT_SYSTEM_COLOR, |(_, color)| *color)
}

/// Number of reporting entities per system, in code order
pub fn api_distribution(snapshot: &Snapshot) -> Vec<ChartSlice> {
    let mut per_system: BTreeMap<&str, usize> = BTreeMap::new();
    for (key, _) in snapshot.pairs() {
        *per_system.entry(key.system_code.as_str()).or_default() += 1;
    }

    per_system
        .into_iter()
        .map(|(code, count)| ChartSlice::new(&system_display_name(code), count, system_color(code)))
        .collect()
}

pub fn availability_chart(counts: &TierCounts) -> Vec<ChartSlice> {
    vec![
        ChartSlice::new("Alta disponibilidad (≥90%)", counts.high, "#22c55e"),
        ChartSlice::new("Media disponibilidad (70-89%)", counts.medium, "#f59e0b"),
        ChartSlice::new("Baja disponibilidad (<70%)", counts.low, "#ef4444"),
    ]
}

pub fn availability_distribution(snapshot: &Snapshot) -> Vec<ChartSlice> {
    availability_chart(&tier_counts(snapshot))
}

pub fn trend_chart(counts: &TrendCounts) -> Vec<ChartSlice> {
    vec![
        ChartSlice::new("Con actualización", counts.updated, "#22c55e"),
        ChartSlice::new("Sin cambios", counts.no_change, "#94a3b8"),
        ChartSlice::new("Con disminución", counts.decreased, "#ef4444"),
    ]
}

pub fn trend_distribution(snapshot: &Snapshot) -> Vec<ChartSlice> {
    trend_chart(&trend_counts(snapshot))
}

pub fn system_listing(snapshot: &Snapshot) -> Vec<SystemListing> {
    snapshot
        .catalog()
        .iter()
        .map(|system| SystemListing {
            code: system.code.clone(),
            name: system.name.clone(),
            display_name: system_display_name(&system.code),
        })
        .collect()
}

/// Every view of the dashboard from one snapshot
pub fn build_dashboard(snapshot: &Snapshot, ranking_limit: usize) -> DashboardPayload {
    let tiers = tier_counts(snapshot);
    let alerts = generate_alerts(snapshot);

    DashboardPayload {
        summary: summarize(snapshot, &tiers, &alerts),
        distribucion_apis: api_distribution(snapshot),
        disponibilidad_apis: availability_chart(&tiers),
        actualizacion_registros: trend_distribution(snapshot),
        ranking_entes: rank_entities(snapshot, ranking_limit),
        alertas: alerts,
    }
}
