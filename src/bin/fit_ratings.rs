//! Batch Weinston fit: one season or every season in the database. A season
//! that cannot be fitted is logged and skipped; it never takes the rest of
//! the batch down with it.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scoreline::config::{EngineConfig, load_dotenv};
use scoreline::error::ModelError;
use scoreline::store::Store;
use scoreline::weinston_fit::{FitResult, baseline_loss, fit_weinston};

fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = EngineConfig::from_env();
    let db_path = parse_path_arg("--db").unwrap_or(cfg.db_path.clone());
    let mut store = Store::open(&db_path)?;

    let season_ids: Vec<i64> = match parse_i64_arg("--season") {
        Some(id) => vec![id],
        None => store.all_seasons()?.iter().map(|s| s.id).collect(),
    };
    if season_ids.is_empty() {
        return Err(anyhow!("no seasons to fit in {}", db_path.display()));
    }
    let single_season = parse_i64_arg("--season").is_some();

    // Fit each season on its own read-only snapshot; only the persistence of
    // results below runs on the writing connection.
    let fits: Vec<(i64, Result<(f64, FitResult)>)> = season_ids
        .par_iter()
        .map(|season_id| {
            let outcome = fit_one_season(&db_path, *season_id);
            (*season_id, outcome)
        })
        .collect();

    let mut fitted = 0usize;
    let mut skipped = 0usize;
    for (season_id, outcome) in fits {
        match outcome {
            Ok((baseline, fit)) => {
                store.replace_season_ratings(season_id, &fit)?;
                info!(
                    season_id,
                    teams = fit.team_ids.len(),
                    baseline,
                    loss = fit.loss,
                    "season fitted"
                );
                fitted += 1;
            }
            Err(err)
                if !single_season
                    && matches!(
                        err.downcast_ref::<ModelError>(),
                        Some(ModelError::InsufficientData { .. })
                    ) =>
            {
                warn!(season_id, %err, "skipping season");
                skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }

    println!("Fitted {fitted} season(s), skipped {skipped} (db: {})", db_path.display());
    Ok(())
}

fn fit_one_season(db_path: &PathBuf, season_id: i64) -> Result<(f64, FitResult)> {
    let store = Store::open(db_path).context("open read snapshot")?;
    let matches = store.finished_season_matches(season_id)?;
    let baseline = baseline_loss(season_id, &matches)?;
    let fit = fit_weinston(season_id, &matches)?;
    Ok((baseline, fit))
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
