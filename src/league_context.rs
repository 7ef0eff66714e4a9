//! League-scoped statistical frame of reference. Every computation for a
//! season goes through this resolver so two leagues never share baselines,
//! whatever numeric coincidences their ids have.

use anyhow::Result;
use tracing::warn;

use crate::error::ModelError;
use crate::store::{Store, today};

/// Fallbacks for a league with no history at all.
pub const FALLBACK_AVG_HOME_GOALS: f64 = 1.4;
pub const FALLBACK_AVG_AWAY_GOALS: f64 = 1.1;
/// Default multiplicative home advantage when no fitted value exists.
pub const DEFAULT_HFA: f64 = 1.05;

/// Where the resolved averages came from, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSource {
    SeasonFit,
    LeagueParams,
    Dynamic,
}

#[derive(Debug, Clone)]
pub struct LeagueContext {
    pub league_id: i64,
    pub league_name: String,
    pub season_id: i64,
    pub season_label: String,
    pub avg_home_goals: f64,
    pub avg_away_goals: f64,
    pub home_advantage: f64,
    pub source: ContextSource,
}

impl LeagueContext {
    /// Resolution priority: season-fitted parameters, then league aggregates,
    /// then a dynamic average over the league's finished pre-today matches.
    /// An unknown season (or one without a league) is a setup error, never
    /// something to default through.
    pub fn resolve(store: &Store, season_id: i64) -> Result<Self> {
        let season = store
            .season(season_id)?
            .ok_or(ModelError::UnknownSeason(season_id))?;
        let league = store
            .league(season.league_id)?
            .ok_or(ModelError::UnknownSeason(season_id))?;

        let (avg_home_goals, avg_away_goals, home_advantage, source) =
            if let Some(fit) = store.season_params(season_id)? {
                (fit.mu_home, fit.mu_away, fit.home_adv, ContextSource::SeasonFit)
            } else if let Some(lp) = store.league_params(league.id)? {
                (
                    lp.avg_home_goals,
                    lp.avg_away_goals,
                    lp.home_field_advantage,
                    ContextSource::LeagueParams,
                )
            } else {
                let (home, away) = dynamic_league_averages(store, league.id)?;
                (home, away, DEFAULT_HFA, ContextSource::Dynamic)
            };

        Ok(Self {
            league_id: league.id,
            league_name: league.name,
            season_id,
            season_label: season.label(),
            avg_home_goals,
            avg_away_goals,
            home_advantage,
            source,
        })
    }
}

fn dynamic_league_averages(store: &Store, league_id: i64) -> Result<(f64, f64)> {
    let matches = store.finished_league_matches_before(league_id, &today())?;
    let mut home_sum = 0.0;
    let mut away_sum = 0.0;
    let mut n = 0usize;
    for m in &matches {
        let Some((hg, ag)) = m.result() else { continue };
        home_sum += hg as f64;
        away_sum += ag as f64;
        n += 1;
    }
    if n == 0 {
        warn!(
            league_id,
            "no historical matches for league, using fallback goal averages"
        );
        return Ok((FALLBACK_AVG_HOME_GOALS, FALLBACK_AVG_AWAY_GOALS));
    }
    Ok((home_sum / n as f64, away_sum / n as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LeagueRow, MatchRow, SeasonRow};

    fn seed_league(store: &Store, league_id: i64, season_id: i64) {
        store
            .insert_league(&LeagueRow {
                id: league_id,
                name: format!("League {league_id}"),
                country: None,
            })
            .unwrap();
        store
            .insert_season(&SeasonRow {
                id: season_id,
                league_id,
                year_start: 2024,
                year_end: 2025,
            })
            .unwrap();
    }

    fn seed_match(store: &Store, id: i64, season_id: i64, hg: i64, ag: i64) {
        store
            .upsert_match(&MatchRow {
                id,
                season_id,
                date: "2024-09-01".to_string(),
                home_team_id: id * 10,
                away_team_id: id * 10 + 1,
                home_goals: Some(hg),
                away_goals: Some(ag),
            })
            .unwrap();
    }

    #[test]
    fn unknown_season_is_a_hard_error() {
        let store = Store::open_in_memory().unwrap();
        let err = LeagueContext::resolve(&store, 99).unwrap_err();
        assert!(err.downcast_ref::<ModelError>().is_some());
    }

    #[test]
    fn dynamic_fallback_uses_league_history() {
        let store = Store::open_in_memory().unwrap();
        seed_league(&store, 1, 10);
        seed_match(&store, 1, 10, 2, 0);
        seed_match(&store, 2, 10, 2, 2);

        let ctx = LeagueContext::resolve(&store, 10).unwrap();
        assert_eq!(ctx.source, ContextSource::Dynamic);
        assert!((ctx.avg_home_goals - 2.0).abs() < 1e-9);
        assert!((ctx.avg_away_goals - 1.0).abs() < 1e-9);
        assert!((ctx.home_advantage - DEFAULT_HFA).abs() < 1e-9);
    }

    #[test]
    fn empty_league_uses_hardcoded_fallbacks() {
        let store = Store::open_in_memory().unwrap();
        seed_league(&store, 1, 10);
        let ctx = LeagueContext::resolve(&store, 10).unwrap();
        assert!((ctx.avg_home_goals - FALLBACK_AVG_HOME_GOALS).abs() < 1e-9);
        assert!((ctx.avg_away_goals - FALLBACK_AVG_AWAY_GOALS).abs() < 1e-9);
    }

    #[test]
    fn two_leagues_resolve_independently() {
        let store = Store::open_in_memory().unwrap();
        seed_league(&store, 1, 10);
        seed_league(&store, 2, 20);
        // League 1 is high scoring at home, league 2 is not.
        seed_match(&store, 1, 10, 4, 0);
        seed_match(&store, 2, 20, 0, 1);

        let ctx_a = LeagueContext::resolve(&store, 10).unwrap();
        let ctx_b = LeagueContext::resolve(&store, 20).unwrap();
        assert!((ctx_a.avg_home_goals - ctx_b.avg_home_goals).abs() > 0.01);
    }

    #[test]
    fn season_fit_outranks_league_params() {
        use crate::weinston_fit::FitResult;

        let mut store = Store::open_in_memory().unwrap();
        seed_league(&store, 1, 10);
        store
            .upsert_league_params(&crate::store::LeagueParamsRow {
                league_id: 1,
                avg_home_goals: 1.6,
                avg_away_goals: 1.2,
                home_field_advantage: 1.1,
                avg_shots: None,
                avg_shots_on_target: None,
                avg_corners: None,
                avg_cards: None,
                avg_fouls: None,
                betting_line_shots: None,
                betting_line_corners: None,
                betting_line_cards: None,
                betting_line_fouls: None,
                sample_size: 100,
                last_calculated: "2025-01-01T00:00:00Z".to_string(),
            })
            .unwrap();

        let ctx = LeagueContext::resolve(&store, 10).unwrap();
        assert_eq!(ctx.source, ContextSource::LeagueParams);
        assert!((ctx.avg_home_goals - 1.6).abs() < 1e-9);

        let fit = FitResult {
            team_ids: vec![],
            atk_home: vec![],
            def_home: vec![],
            atk_away: vec![],
            def_away: vec![],
            mu_home: 1.45,
            mu_away: 1.05,
            home_adv: 1.2,
            loss: 10.0,
        };
        store.replace_season_ratings(10, &fit).unwrap();

        let ctx = LeagueContext::resolve(&store, 10).unwrap();
        assert_eq!(ctx.source, ContextSource::SeasonFit);
        assert!((ctx.avg_home_goals - 1.45).abs() < 1e-9);
        assert!((ctx.home_advantage - 1.2).abs() < 1e-9);
    }
}
