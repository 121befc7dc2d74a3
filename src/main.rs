use anyhow::{bail, Context, Result};
use chrono::Local;
use std::env;
use tracing::info;

use pdn_monitor::{
    build_dashboard, generate_alerts, init_tracing, open_read_only, rank_entities, summary,
    system_listing, MonitorConfig, Snapshot,
};

enum Command {
    Summary,
    Alerts,
    Ranking(Option<i64>),
    Dashboard,
    Systems,
}

fn parse_command(args: &[String]) -> Result<Command> {
    let command = match args.first().map(String::as_str) {
        None | Some("summary") => Command::Summary,
        Some("alerts") => Command::Alerts,
        Some("ranking") => {
            let limit = args
                .get(1)
                .map(|raw| raw.parse::<i64>())
                .transpose()
                .context("ranking limit must be an integer")?;
            Command::Ranking(limit)
        }
        Some("dashboard") => Command::Dashboard,
        Some("systems") => Command::Systems,
        Some(other) => bail!(
            "unknown command '{other}' (expected: summary | alerts | ranking [N] | dashboard | systems)"
        ),
    };
    Ok(command)
}

fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = parse_command(&args)?;
    let config = MonitorConfig::load()?;

    if !config.database_path.exists() {
        bail!(
            "database not found at {} (set {} or database_path in the config file)",
            config.database_path.display(),
            pdn_monitor::config::DB_ENV
        );
    }

    let conn = open_read_only(&config.database_path, config.query_timeout())?;
    let as_of = Local::now().date_naive();
    let snapshot = Snapshot::capture_sqlite(&conn, as_of)?;
    info!(%as_of, pairs = snapshot.pair_count(), "snapshot loaded");

    // JSON on stdout, logs on stderr
    let output = match command {
        Command::Summary => serde_json::to_string_pretty(&summary(&snapshot))?,
        Command::Alerts => serde_json::to_string_pretty(&generate_alerts(&snapshot))?,
        Command::Ranking(requested) => {
            let limit = config.clamp_ranking_limit(requested);
            serde_json::to_string_pretty(&rank_entities(&snapshot, limit))?
        }
        Command::Dashboard => serde_json::to_string_pretty(&build_dashboard(
            &snapshot,
            config.default_ranking_limit,
        ))?,
        Command::Systems => serde_json::to_string_pretty(&system_listing(&snapshot))?,
    };
    println!("{output}");

    Ok(())
}
