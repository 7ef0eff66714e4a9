//! Recompute per-league aggregate parameters (goal averages, HFA ratio,
//! betting-line medians) for one league or all of them.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

use scoreline::config::{EngineConfig, load_dotenv};
use scoreline::league_params::compute_league_params;
use scoreline::store::Store;

fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = EngineConfig::from_env();
    let db_path = parse_path_arg("--db").unwrap_or(cfg.db_path.clone());
    let store = Store::open(&db_path)?;

    let league_ids: Vec<i64> = match parse_i64_arg("--league") {
        Some(id) => vec![id],
        None => store.all_league_ids()?,
    };
    if league_ids.is_empty() {
        return Err(anyhow!("no leagues found in {}", db_path.display()));
    }

    let mut updated = 0usize;
    let mut skipped = 0usize;
    for league_id in league_ids {
        match compute_league_params(&store, league_id)? {
            Some(params) => {
                store.upsert_league_params(&params)?;
                println!(
                    "league {league_id}: {} matches, avg {:.3}/{:.3}, hfa {:.3}",
                    params.sample_size,
                    params.avg_home_goals,
                    params.avg_away_goals,
                    params.home_field_advantage
                );
                updated += 1;
            }
            None => skipped += 1,
        }
    }

    println!("Updated {updated} league(s), skipped {skipped}");
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
