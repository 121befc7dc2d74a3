// 🚨 Alert Generator - zero availability and sharp declines per pair
//
// Rules run in a fixed order and the first one that fires wins:
//   1. no current record           → nothing
//   2. status says down / error    → HIGH "Disponibilidad nula (0%)"
//   3. no reference record         → nothing
//   4. totals unparsable           → nothing
//   5. dropped to zero             → HIGH "Disminución del 100% en registros"
//   6. dropped below half          → MEDIUM "Disminución del N% en registros"

use crate::snapshot::{PairHistory, PairKey, Snapshot};
use crate::trend::parse_totals;
use serde::{Deserialize, Serialize};

const OUTAGE_MARKERS: [&str; 2] = ["no disponible", "error"];
const DECLINE_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    High,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub entity: String,

    /// Display name, not the raw code
    pub system: String,

    pub message: String,
    pub level: AlertLevel,
}

impl Alert {
    fn new(key: &PairKey, message: String, level: AlertLevel) -> Self {
        Alert {
            entity: key.entity.clone(),
            system: system_display_name(&key.system_code),
            message,
            level,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.level == AlertLevel::High
    }
}

// ============================================================================
// DISPLAY NAMES
// ============================================================================

/// "S1" → "Sistema 1", "S3_no_graves" → "Sistema 3 - No graves"
pub fn system_display_name(code: &str) -> String {
    let (prefix, suffix) = match code.split_once('_') {
        Some((prefix, suffix)) => (prefix, Some(suffix)),
        None => (code, None),
    };

    let number = prefix.strip_prefix('S').unwrap_or(prefix);
    let mut name = format!("Sistema {number}");

    if let Some(suffix) = suffix.filter(|s| !s.is_empty()) {
        name.push_str(" - ");
        name.push_str(&humanize(suffix));
    }
    name
}

/// Underscores to spaces, first letter upper, the rest lower
fn humanize(raw: &str) -> String {
    let spaced = raw.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

// ============================================================================
// RULES
// ============================================================================

fn reports_outage(status: &str) -> bool {
    let status = status.to_lowercase();
    OUTAGE_MARKERS.iter().any(|marker| status.contains(marker))
}

/// At most one alert per pair
pub fn evaluate_pair(key: &PairKey, history: &PairHistory) -> Option<Alert> {
    let current = history.current.as_ref()?;

    if reports_outage(&current.status) {
        return Some(Alert::new(
            key,
            "Disponibilidad nula (0%)".to_string(),
            AlertLevel::High,
        ));
    }

    let reference = history.reference.as_ref()?;
    let (now, before) = parse_totals(current, reference)?;

    if before <= 0 {
        return None;
    }

    if now == 0 {
        return Some(Alert::new(
            key,
            "Disminución del 100% en registros".to_string(),
            AlertLevel::High,
        ));
    }

    if (now as f64) < before as f64 * DECLINE_RATIO {
        let pct = ((1.0 - now as f64 / before as f64) * 100.0).round_ties_even() as i64;
        return Some(Alert::new(
            key,
            format!("Disminución del {pct}% en registros"),
            AlertLevel::Medium,
        ));
    }

    None
}

/// HIGH before MEDIUM, then entity ascending
pub fn generate_alerts(snapshot: &Snapshot) -> Vec<Alert> {
    let mut alerts: Vec<Alert> = snapshot
        .pairs()
        .filter_map(|(key, history)| evaluate_pair(key, history))
        .collect();

    alerts.sort_by(|a, b| {
        a.level
            .cmp(&b.level)
            .then_with(|| a.entity.cmp(&b.entity))
            .then_with(|| a.system.cmp(&b.system))
    });
    alerts
}

pub fn critical_count(alerts: &[Alert]) -> usize {
    alerts.iter().filter(|alert| alert.is_critical()).count()
}
