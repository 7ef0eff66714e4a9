//! Evaluate persisted predictions against final results for a season, print
//! per-model accuracy, and optionally export the xlsx report.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use scoreline::config::{EngineConfig, load_dotenv};
use scoreline::evaluate::{evaluate_season, metrics_by_model};
use scoreline::report::export_accuracy_report;
use scoreline::store::Store;

fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = EngineConfig::from_env();
    let db_path = parse_path_arg("--db").unwrap_or(cfg.db_path.clone());
    let season_id = parse_i64_arg("--season").context("--season <id> is required")?;
    let date_from = parse_string_arg("--from");
    let date_to = parse_string_arg("--to");
    let match_ids = parse_id_list_arg("--match-ids");
    let export_path = parse_path_arg("--export");

    let store = Store::open(&db_path)?;
    let counts = evaluate_season(
        &store,
        &cfg,
        season_id,
        date_from.as_deref(),
        date_to.as_deref(),
        match_ids.as_deref(),
    )?;
    println!(
        "Season {season_id}: evaluated {} poisson and {} weinston prediction(s)",
        counts.poisson, counts.weinston
    );

    let metrics = metrics_by_model(&store, season_id, date_from.as_deref(), date_to.as_deref())?;
    if has_flag("--json") {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        for m in &metrics {
            println!(
                "{:<9} 1x2 {}/{} ({}) | o/u {}/{} ({}) | btts {}/{} ({}) | rmse {}",
                m.model.as_str(),
                m.hits_1x2,
                m.decided_1x2,
                fmt_ratio(m.acc_1x2),
                m.hits_over25,
                m.decided_over25,
                fmt_ratio(m.acc_over25),
                m.hits_btts,
                m.decided_btts,
                fmt_ratio(m.acc_btts),
                fmt_ratio(m.avg_rmse_goals),
            );
        }
    }

    if let Some(path) = export_path {
        let outcomes =
            store.outcomes_for_season(season_id, date_from.as_deref(), date_to.as_deref())?;
        let summary = export_accuracy_report(&path, &metrics, &outcomes)?;
        println!(
            "Exported {} model row(s) and {} outcome row(s) to {}",
            summary.models,
            summary.outcomes,
            path.display()
        );
    }
    Ok(())
}

fn fmt_ratio(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.3}")).unwrap_or_else(|| "-".to_string())
}

fn has_flag(name: &str) -> bool {
    std::env::args().any(|arg| arg == name)
}

fn parse_i64_arg(name: &str) -> Option<i64> {
    let args: Vec<String> = std::env::args().collect();
    for (idx, arg) in args.iter().enumerate() {
        if arg == name
            && let Some(raw) = args.get(idx + 1)
        {
            return raw.parse::<i64>().ok();
        }
    }
    None
}

fn parse_string_arg(name: &str) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for (idx, arg) in args.iter().enumerate() {
        if arg == name
            && let Some(raw) = args.get(idx + 1)
        {
            return Some(raw.clone());
        }
    }
    None
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    parse_string_arg(name).map(PathBuf::from)
}

fn parse_id_list_arg(name: &str) -> Option<Vec<i64>> {
    parse_string_arg(name).map(|raw| {
        raw.split(',')
            .filter_map(|s| s.trim().parse::<i64>().ok())
            .collect()
    })
}
