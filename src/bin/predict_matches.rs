//! Run both prediction models for a season and upsert the rows. Defaults to
//! the season's unplayed fixtures; pass --match-ids to (re)predict specific
//! matches, e.g. for a nightly re-prediction sweep.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use scoreline::config::{EngineConfig, load_dotenv};
use scoreline::predict::predict_season;
use scoreline::store::Store;

fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = EngineConfig::from_env();
    let db_path = parse_path_arg("--db").unwrap_or(cfg.db_path.clone());
    let season_id = parse_i64_arg("--season").context("--season <id> is required")?;
    let match_ids = parse_id_list_arg("--match-ids");

    let store = Store::open(&db_path)?;
    let report = predict_season(&store, &cfg, season_id, match_ids.as_deref())?;

    println!(
        "Season {season_id}: {} poisson and {} weinston prediction(s) upserted",
        report.poisson, report.weinston
    );
    Ok(())
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

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    for (idx, arg) in args.iter().enumerate() {
        if arg == name
            && let Some(raw) = args.get(idx + 1)
        {
            return Some(PathBuf::from(raw));
        }
    }
    None
}

fn parse_id_list_arg(name: &str) -> Option<Vec<i64>> {
    let args: Vec<String> = std::env::args().collect();
    for (idx, arg) in args.iter().enumerate() {
        if arg == name
            && let Some(raw) = args.get(idx + 1)
        {
            let ids: Vec<i64> = raw
                .split(',')
                .filter_map(|s| s.trim().parse::<i64>().ok())
                .collect();
            return Some(ids);
        }
    }
    None
}
