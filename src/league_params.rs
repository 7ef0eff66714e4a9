//! Periodic recomputation of per-league aggregate parameters: goal averages,
//! the home-field-advantage ratio, and average/median stat totals used as
//! suggested betting lines.

use anyhow::Result;
use chrono::Utc;
use tracing::warn;

use crate::store::{LeagueParamsRow, Store, today};

/// HFA ratio fallback when a league's away-goal average is zero.
const DEFAULT_HFA_RATIO: f64 = 1.05;

/// Recompute one league's parameters from its finished pre-today matches.
/// Returns None (and warns) when the league has no history to aggregate.
pub fn compute_league_params(store: &Store, league_id: i64) -> Result<Option<LeagueParamsRow>> {
    let cutoff = today();
    let matches = store.finished_league_matches_before(league_id, &cutoff)?;
    if matches.is_empty() {
        warn!(league_id, "no finished matches, skipping league parameters");
        return Ok(None);
    }

    let mut home_sum = 0.0;
    let mut away_sum = 0.0;
    for m in &matches {
        let Some((hg, ag)) = m.result() else { continue };
        home_sum += hg as f64;
        away_sum += ag as f64;
    }
    let n = matches.len() as f64;
    let avg_home_goals = home_sum / n;
    let avg_away_goals = away_sum / n;
    let home_field_advantage = if avg_away_goals > 0.0 {
        avg_home_goals / avg_away_goals
    } else {
        DEFAULT_HFA_RATIO
    };

    let stat_rows = store.match_stats_for_league(league_id, &cutoff)?;
    let mut shots = Vec::new();
    let mut shots_on_target = Vec::new();
    let mut corners = Vec::new();
    let mut cards = Vec::new();
    let mut fouls = Vec::new();
    for s in &stat_rows {
        push_total(&mut shots, s.home_shots, s.away_shots);
        push_total(&mut shots_on_target, s.home_shots_on_target, s.away_shots_on_target);
        push_total(&mut corners, s.home_corners, s.away_corners);
        push_total(&mut cards, s.home_cards(), s.away_cards());
        push_total(&mut fouls, s.home_fouls, s.away_fouls);
    }

    Ok(Some(LeagueParamsRow {
        league_id,
        avg_home_goals,
        avg_away_goals,
        home_field_advantage,
        avg_shots: mean(&shots),
        avg_shots_on_target: mean(&shots_on_target),
        avg_corners: mean(&corners),
        avg_cards: mean(&cards),
        avg_fouls: mean(&fouls),
        betting_line_shots: median(&mut shots),
        betting_line_corners: median(&mut corners),
        betting_line_cards: median(&mut cards),
        betting_line_fouls: median(&mut fouls),
        sample_size: matches.len() as i64,
        last_calculated: Utc::now().to_rfc3339(),
    }))
}

/// Per-match total of one stat; skipped when both sides are missing.
fn push_total(out: &mut Vec<f64>, home: Option<i64>, away: Option<i64>) {
    if home.is_none() && away.is_none() {
        return;
    }
    out.push((home.unwrap_or(0) + away.unwrap_or(0)) as f64);
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LeagueRow, MatchRow, MatchStatsRow, SeasonRow};

    fn seed(store: &Store) {
        store
            .insert_league(&LeagueRow {
                id: 1,
                name: "League".to_string(),
                country: None,
            })
            .unwrap();
        store
            .insert_season(&SeasonRow {
                id: 10,
                league_id: 1,
                year_start: 2024,
                year_end: 2025,
            })
            .unwrap();
        for (id, hg, ag, shots_h, shots_a) in
            [(1i64, 2, 1, 14, 8), (2, 1, 1, 10, 12), (3, 3, 0, 18, 4)]
        {
            store
                .upsert_match(&MatchRow {
                    id,
                    season_id: 10,
                    date: "2024-10-01".to_string(),
                    home_team_id: 100 + id,
                    away_team_id: 200 + id,
                    home_goals: Some(hg),
                    away_goals: Some(ag),
                })
                .unwrap();
            store
                .upsert_match_stats(&MatchStatsRow {
                    match_id: id,
                    home_shots: Some(shots_h),
                    away_shots: Some(shots_a),
                    ..MatchStatsRow::default()
                })
                .unwrap();
        }
    }

    #[test]
    fn median_of_odd_and_even_sets() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&mut []), None);
    }

    #[test]
    fn computes_averages_and_hfa_ratio() {
        let store = Store::open_in_memory().unwrap();
        seed(&store);
        let params = compute_league_params(&store, 1).unwrap().unwrap();
        assert_eq!(params.sample_size, 3);
        assert!((params.avg_home_goals - 2.0).abs() < 1e-9);
        assert!((params.avg_away_goals - 2.0 / 3.0).abs() < 1e-9);
        assert!((params.home_field_advantage - 3.0).abs() < 1e-9);
        // Shot totals are 22 in every match.
        assert_eq!(params.betting_line_shots, Some(22.0));
        // No fouls recorded anywhere.
        assert!(params.avg_fouls.is_none());
    }

    #[test]
    fn empty_league_yields_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(compute_league_params(&store, 7).unwrap().is_none());
    }
}
