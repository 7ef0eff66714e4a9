//! The two prediction paths. Both feed lambdas into the shared Poisson grid;
//! they differ only in where the lambdas come from: recent-form ratios
//! (Poisson path) versus the fitted Weinston multipliers (Weinston path).

use std::collections::HashMap;

use anyhow::Result;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::league_context::LeagueContext;
use crate::prob_grid::{OutcomeProbs, aggregate_probs};
use crate::store::{MatchRow, Store, TeamRatingRow};
use crate::team_form::{TeamForm, recent_form};
use crate::team_profiles::{StatKind, TeamProfiles, expected_stat, load_profiles};

/// Cushion applied on top of the fair odds (3%).
const ODDS_MARGIN: f64 = 0.03;
/// Floor for expected-goal rates fed into the grid.
const LAMBDA_FLOOR: f64 = 0.01;

pub const OVER_LABEL: &str = "OVER";
pub const UNDER_LABEL: &str = "UNDER";
pub const BTTS_YES_LABEL: &str = "YES";
pub const BTTS_NO_LABEL: &str = "NO";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick1x2 {
    Home,
    Draw,
    Away,
}

impl Pick1x2 {
    pub fn as_str(self) -> &'static str {
        match self {
            Pick1x2::Home => "1",
            Pick1x2::Draw => "X",
            Pick1x2::Away => "2",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "1" => Some(Pick1x2::Home),
            "X" => Some(Pick1x2::Draw),
            "2" => Some(Pick1x2::Away),
            _ => None,
        }
    }
}

/// Argmax over the three outcome probabilities. Ties resolve home before
/// draw before away; evaluation reuses this exact rule so picks and
/// ground-truth comparisons can never disagree on tie handling.
pub fn pick_1x2(p_home: f64, p_draw: f64, p_away: f64) -> Pick1x2 {
    if p_home >= p_draw && p_home >= p_away {
        Pick1x2::Home
    } else if p_draw >= p_away {
        Pick1x2::Draw
    } else {
        Pick1x2::Away
    }
}

pub fn over_label(p_over: f64, threshold: f64) -> &'static str {
    if p_over >= threshold { OVER_LABEL } else { UNDER_LABEL }
}

pub fn btts_label(p_btts: f64, threshold: f64) -> &'static str {
    if p_btts >= threshold { BTTS_YES_LABEL } else { BTTS_NO_LABEL }
}

/// Minimum acceptable decimal odds for a probability, with the margin
/// cushion. None for a probability of zero.
pub fn min_odds(p: f64) -> Option<f64> {
    if p <= 0.0 {
        return None;
    }
    Some(((1.0 / p) * (1.0 + ODDS_MARGIN) * 10_000.0).round() / 10_000.0)
}

#[derive(Debug, Clone)]
pub struct PoissonPredictionRow {
    pub match_id: i64,
    pub expected_home_goals: f64,
    pub expected_away_goals: f64,
    pub probs: OutcomeProbs,
    pub pick_1x2: Pick1x2,
    pub pick_over: String,
    pub pick_btts: String,
    pub min_odds_1: Option<f64>,
    pub min_odds_x: Option<f64>,
    pub min_odds_2: Option<f64>,
    pub min_odds_over25: Option<f64>,
    pub min_odds_under25: Option<f64>,
    pub min_odds_btts_yes: Option<f64>,
    pub min_odds_btts_no: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CornersPick {
    Home,
    Away,
    Tie,
}

impl CornersPick {
    pub fn as_str(self) -> &'static str {
        match self {
            CornersPick::Home => "HOME",
            CornersPick::Away => "AWAY",
            CornersPick::Tie => "TIE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExpectedStats {
    pub shots_home: f64,
    pub shots_away: f64,
    pub shots_target_home: f64,
    pub shots_target_away: f64,
    pub fouls_home: f64,
    pub fouls_away: f64,
    pub cards_home: f64,
    pub cards_away: f64,
    pub corners_home: f64,
    pub corners_away: f64,
    pub win_corners: CornersPick,
}

#[derive(Debug, Clone)]
pub struct WeinstonPredictionRow {
    pub match_id: i64,
    pub expected_home_goals: f64,
    pub expected_away_goals: f64,
    pub probs: OutcomeProbs,
    pub pick_1x2: Pick1x2,
    pub pick_over: String,
    pub pick_btts: String,
    pub stats: Option<ExpectedStats>,
}

/// Season globals for the Weinston lambda formula, either fitted or the
/// degraded league-average fallback.
#[derive(Debug, Clone, Copy)]
pub struct WeinstonGlobals {
    pub mu_home: f64,
    pub mu_away: f64,
    pub home_adv: f64,
}

const FALLBACK_WEINSTON_HOME_ADV: f64 = 1.2;

// --- Poisson path -----------------------------------------------------------

pub fn poisson_prediction(
    m: &MatchRow,
    forms: &HashMap<i64, TeamForm>,
    ctx: &LeagueContext,
    cfg: &EngineConfig,
) -> PoissonPredictionRow {
    let (lambda_home, lambda_away) = match (
        forms.get(&m.home_team_id),
        forms.get(&m.away_team_id),
    ) {
        (Some(home), Some(away)) => (
            ctx.avg_home_goals * home.attack_home * away.defense_away * ctx.home_advantage,
            ctx.avg_away_goals * away.attack_away * home.defense_home,
        ),
        _ => {
            // Unrated team: degrade to the plain league-average fixture.
            (
                ctx.avg_home_goals * ctx.home_advantage,
                ctx.avg_away_goals,
            )
        }
    };
    let lambda_home = lambda_home.max(LAMBDA_FLOOR);
    let lambda_away = lambda_away.max(LAMBDA_FLOOR);

    let probs = aggregate_probs(lambda_home, lambda_away, cfg.goal_cap, cfg.over_under_threshold);

    PoissonPredictionRow {
        match_id: m.id,
        expected_home_goals: lambda_home,
        expected_away_goals: lambda_away,
        probs,
        pick_1x2: pick_1x2(probs.p_home, probs.p_draw, probs.p_away),
        pick_over: over_label(probs.p_over, cfg.pick_threshold).to_string(),
        pick_btts: btts_label(probs.p_btts_yes, cfg.pick_threshold).to_string(),
        min_odds_1: min_odds(probs.p_home),
        min_odds_x: min_odds(probs.p_draw),
        min_odds_2: min_odds(probs.p_away),
        min_odds_over25: min_odds(probs.p_over),
        min_odds_under25: min_odds(probs.p_under),
        min_odds_btts_yes: min_odds(probs.p_btts_yes),
        min_odds_btts_no: min_odds(probs.p_btts_no),
    }
}

// --- Weinston path ----------------------------------------------------------

const NEUTRAL_RATING: TeamRatingRow = TeamRatingRow {
    season_id: 0,
    team_id: 0,
    atk_home: 1.0,
    def_home: 1.0,
    atk_away: 1.0,
    def_away: 1.0,
};

pub fn weinston_lambdas(
    m: &MatchRow,
    ratings: &HashMap<i64, TeamRatingRow>,
    globals: WeinstonGlobals,
) -> (f64, f64) {
    let home = ratings.get(&m.home_team_id).unwrap_or_else(|| {
        warn!(match_id = m.id, team_id = m.home_team_id, "no rating, using neutral multipliers");
        &NEUTRAL_RATING
    });
    let away = ratings.get(&m.away_team_id).unwrap_or_else(|| {
        warn!(match_id = m.id, team_id = m.away_team_id, "no rating, using neutral multipliers");
        &NEUTRAL_RATING
    });

    let lambda_home = globals.mu_home * home.atk_home * away.def_away * globals.home_adv;
    let lambda_away = globals.mu_away * away.atk_away * home.def_home;
    (lambda_home.max(LAMBDA_FLOOR), lambda_away.max(LAMBDA_FLOOR))
}

pub fn weinston_prediction(
    m: &MatchRow,
    ratings: &HashMap<i64, TeamRatingRow>,
    globals: WeinstonGlobals,
    profiles: &TeamProfiles,
    cfg: &EngineConfig,
) -> WeinstonPredictionRow {
    let (lambda_home, lambda_away) = weinston_lambdas(m, ratings, globals);
    let probs = aggregate_probs(lambda_home, lambda_away, cfg.goal_cap, cfg.over_under_threshold);

    let stats = if profiles.is_empty() {
        lambda_based_stats(lambda_home, lambda_away)
    } else {
        profile_based_stats(m, profiles)
    };

    WeinstonPredictionRow {
        match_id: m.id,
        expected_home_goals: lambda_home,
        expected_away_goals: lambda_away,
        probs,
        pick_1x2: pick_1x2(probs.p_home, probs.p_draw, probs.p_away),
        pick_over: over_label(probs.p_over, cfg.pick_threshold).to_string(),
        pick_btts: btts_label(probs.p_btts_yes, cfg.pick_threshold).to_string(),
        stats: Some(stats),
    }
}

fn profile_based_stats(m: &MatchRow, profiles: &TeamProfiles) -> ExpectedStats {
    let (shots_home, shots_away) =
        expected_stat(profiles, StatKind::Shots, m.home_team_id, m.away_team_id);
    let (shots_target_home, shots_target_away) =
        expected_stat(profiles, StatKind::ShotsOnTarget, m.home_team_id, m.away_team_id);
    let (fouls_home, fouls_away) =
        expected_stat(profiles, StatKind::Fouls, m.home_team_id, m.away_team_id);
    let (cards_home, cards_away) =
        expected_stat(profiles, StatKind::Cards, m.home_team_id, m.away_team_id);
    let (corners_home, corners_away) =
        expected_stat(profiles, StatKind::Corners, m.home_team_id, m.away_team_id);

    ExpectedStats {
        shots_home,
        shots_away,
        shots_target_home,
        shots_target_away,
        fouls_home,
        fouls_away,
        cards_home,
        cards_away,
        corners_home,
        corners_away,
        win_corners: corners_pick(corners_home, corners_away),
    }
}

/// Crude stat projections from the goal rates, used only when a league has no
/// stat history at all.
fn lambda_based_stats(lambda_home: f64, lambda_away: f64) -> ExpectedStats {
    let corners_home = round2(lambda_home * 3.5 + 2.0);
    let corners_away = round2(lambda_away * 3.5 + 2.0);
    ExpectedStats {
        shots_home: round2(lambda_home * 9.0 + 3.0),
        shots_away: round2(lambda_away * 9.0 + 3.0),
        shots_target_home: round2(lambda_home * 3.5 + 1.0),
        shots_target_away: round2(lambda_away * 3.5 + 1.0),
        fouls_home: round2(lambda_home * 5.0 + 7.0),
        fouls_away: round2(lambda_away * 5.0 + 7.0),
        cards_home: round2(lambda_home * 0.8 + 1.0),
        cards_away: round2(lambda_away * 0.8 + 1.0),
        corners_home,
        corners_away,
        win_corners: corners_pick(corners_home, corners_away),
    }
}

fn corners_pick(home: f64, away: f64) -> CornersPick {
    if home > away {
        CornersPick::Home
    } else if away > home {
        CornersPick::Away
    } else {
        CornersPick::Tie
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// --- batch orchestration ----------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct PredictionBatchReport {
    pub poisson: usize,
    pub weinston: usize,
}

/// Predict a set of matches (defaults to the season's unplayed fixtures) with
/// both models and upsert the rows. Pure computation fans out across matches;
/// writes stay on this single connection.
pub fn predict_season(
    store: &Store,
    cfg: &EngineConfig,
    season_id: i64,
    match_ids: Option<&[i64]>,
) -> Result<PredictionBatchReport> {
    let ctx = LeagueContext::resolve(store, season_id)?;
    let history = store.finished_league_matches_before(ctx.league_id, &crate::store::today())?;
    let forms = recent_form(&history, &ctx, cfg.n_recent);

    let ratings = store.season_ratings(season_id)?;
    let globals = resolve_weinston_globals(store, season_id)?;
    let stat_rows = store.finished_season_matches_with_stats(season_id)?;
    let profiles = load_profiles(&stat_rows, cfg.n_recent);

    let targets = match match_ids {
        Some(ids) => store.matches_by_ids(ids)?,
        None => store.unplayed_season_matches(season_id)?,
    };

    let rows: Vec<(PoissonPredictionRow, WeinstonPredictionRow)> = targets
        .par_iter()
        .map(|m| {
            (
                poisson_prediction(m, &forms, &ctx, cfg),
                weinston_prediction(m, &ratings, globals, &profiles, cfg),
            )
        })
        .collect();

    let mut report = PredictionBatchReport::default();
    for (poisson, weinston) in &rows {
        store.upsert_poisson_prediction(poisson)?;
        report.poisson += 1;
        store.upsert_weinston_prediction(weinston)?;
        report.weinston += 1;
    }

    info!(
        season_id,
        matches = targets.len(),
        league = %ctx.league_name,
        "prediction batch complete"
    );
    Ok(report)
}

/// Fitted season globals, or the league-average fallback when the season was
/// never fitted (prediction degrades rather than blocks).
pub fn resolve_weinston_globals(store: &Store, season_id: i64) -> Result<WeinstonGlobals> {
    if let Some(params) = store.season_params(season_id)? {
        return Ok(WeinstonGlobals {
            mu_home: params.mu_home,
            mu_away: params.mu_away,
            home_adv: params.home_adv,
        });
    }
    warn!(season_id, "no fitted parameters, falling back to season goal averages");
    let matches = store.finished_season_matches(season_id)?;
    let mut home_sum = 0.0;
    let mut away_sum = 0.0;
    let mut n = 0usize;
    for m in &matches {
        let Some((hg, ag)) = m.result() else { continue };
        home_sum += hg as f64;
        away_sum += ag as f64;
        n += 1;
    }
    let (mu_home, mu_away) = if n > 0 {
        (home_sum / n as f64, away_sum / n as f64)
    } else {
        (1.3, 1.1)
    };
    Ok(WeinstonGlobals {
        mu_home,
        mu_away,
        home_adv: FALLBACK_WEINSTON_HOME_ADV,
    })
}

// --- sqlite row decoding ----------------------------------------------------

fn decode_pick(idx: usize, label: String) -> rusqlite::Result<Pick1x2> {
    Pick1x2::from_label(&label).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown 1x2 pick {label:?}").into(),
        )
    })
}

impl PoissonPredictionRow {
    pub(crate) fn from_sql_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            match_id: row.get(0)?,
            expected_home_goals: row.get(1)?,
            expected_away_goals: row.get(2)?,
            probs: OutcomeProbs {
                p_home: row.get(3)?,
                p_draw: row.get(4)?,
                p_away: row.get(5)?,
                p_over: row.get(6)?,
                p_under: row.get(7)?,
                p_btts_yes: row.get(8)?,
                p_btts_no: row.get(9)?,
            },
            pick_1x2: decode_pick(10, row.get(10)?)?,
            pick_over: row.get(11)?,
            pick_btts: row.get(12)?,
            min_odds_1: row.get(13)?,
            min_odds_x: row.get(14)?,
            min_odds_2: row.get(15)?,
            min_odds_over25: row.get(16)?,
            min_odds_under25: row.get(17)?,
            min_odds_btts_yes: row.get(18)?,
            min_odds_btts_no: row.get(19)?,
        })
    }
}

impl WeinstonPredictionRow {
    pub(crate) fn from_sql_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let shots_home: Option<f64> = row.get(13)?;
        let stats = match shots_home {
            Some(shots_home) => {
                let win_corners: Option<String> = row.get(23)?;
                let win_corners = match win_corners.as_deref() {
                    Some("HOME") => CornersPick::Home,
                    Some("AWAY") => CornersPick::Away,
                    _ => CornersPick::Tie,
                };
                Some(ExpectedStats {
                    shots_home,
                    shots_away: row.get(14)?,
                    shots_target_home: row.get(15)?,
                    shots_target_away: row.get(16)?,
                    fouls_home: row.get(17)?,
                    fouls_away: row.get(18)?,
                    cards_home: row.get(19)?,
                    cards_away: row.get(20)?,
                    corners_home: row.get(21)?,
                    corners_away: row.get(22)?,
                    win_corners,
                })
            }
            None => None,
        };
        Ok(Self {
            match_id: row.get(0)?,
            expected_home_goals: row.get(1)?,
            expected_away_goals: row.get(2)?,
            probs: OutcomeProbs {
                p_home: row.get(3)?,
                p_draw: row.get(4)?,
                p_away: row.get(5)?,
                p_over: row.get(6)?,
                p_under: row.get(7)?,
                p_btts_yes: row.get(8)?,
                p_btts_no: row.get(9)?,
            },
            pick_1x2: decode_pick(10, row.get(10)?)?,
            pick_over: row.get(11)?,
            pick_btts: row.get(12)?,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::league_context::ContextSource;

    fn ctx() -> LeagueContext {
        LeagueContext {
            league_id: 1,
            league_name: "Test League".to_string(),
            season_id: 1,
            season_label: "2024/2025".to_string(),
            avg_home_goals: 1.5,
            avg_away_goals: 1.1,
            home_advantage: 1.05,
            source: ContextSource::Dynamic,
        }
    }

    fn fixture(id: i64, home: i64, away: i64) -> MatchRow {
        MatchRow {
            id,
            season_id: 1,
            date: "2025-05-01".to_string(),
            home_team_id: home,
            away_team_id: away,
            home_goals: None,
            away_goals: None,
        }
    }

    #[test]
    fn tie_break_prefers_home_then_draw() {
        assert_eq!(pick_1x2(0.4, 0.4, 0.2), Pick1x2::Home);
        assert_eq!(pick_1x2(0.3, 0.35, 0.35), Pick1x2::Draw);
        assert_eq!(pick_1x2(0.2, 0.3, 0.5), Pick1x2::Away);
    }

    #[test]
    fn min_odds_carries_the_margin() {
        assert_eq!(min_odds(0.5), Some(2.06));
        assert_eq!(min_odds(0.0), None);
    }

    #[test]
    fn unrated_teams_degrade_to_league_average() {
        let cfg = EngineConfig::default();
        let row = poisson_prediction(&fixture(1, 900, 901), &HashMap::new(), &ctx(), &cfg);
        assert!((row.expected_home_goals - 1.5 * 1.05).abs() < 1e-9);
        assert!((row.expected_away_goals - 1.1).abs() < 1e-9);
    }

    #[test]
    fn weinston_missing_rating_is_neutral() {
        let globals = WeinstonGlobals {
            mu_home: 1.4,
            mu_away: 1.0,
            home_adv: 1.2,
        };
        let (lh, la) = weinston_lambdas(&fixture(1, 900, 901), &HashMap::new(), globals);
        assert!((lh - 1.4 * 1.2).abs() < 1e-9);
        assert!((la - 1.0).abs() < 1e-9);
    }

    #[test]
    fn weinston_prediction_is_deterministic() {
        let cfg = EngineConfig::default();
        let globals = WeinstonGlobals {
            mu_home: 1.4,
            mu_away: 1.0,
            home_adv: 1.2,
        };
        let mut ratings = HashMap::new();
        ratings.insert(
            101,
            TeamRatingRow {
                season_id: 1,
                team_id: 101,
                atk_home: 1.3,
                def_home: 0.9,
                atk_away: 1.1,
                def_away: 0.8,
            },
        );
        ratings.insert(
            102,
            TeamRatingRow {
                season_id: 1,
                team_id: 102,
                atk_home: 0.9,
                def_home: 1.2,
                atk_away: 0.8,
                def_away: 1.1,
            },
        );
        let profiles = TeamProfiles::default();
        let m = fixture(1, 101, 102);

        let first = weinston_prediction(&m, &ratings, globals, &profiles, &cfg);
        let second = weinston_prediction(&m, &ratings, globals, &profiles, &cfg);
        assert_eq!(first.expected_home_goals.to_bits(), second.expected_home_goals.to_bits());
        assert_eq!(first.probs.p_home.to_bits(), second.probs.p_home.to_bits());
        assert_eq!(first.pick_1x2, second.pick_1x2);
    }

    #[test]
    fn empty_profiles_use_lambda_heuristics() {
        let cfg = EngineConfig::default();
        let globals = WeinstonGlobals {
            mu_home: 1.4,
            mu_away: 1.0,
            home_adv: 1.2,
        };
        let row = weinston_prediction(
            &fixture(1, 101, 102),
            &HashMap::new(),
            globals,
            &TeamProfiles::default(),
            &cfg,
        );
        let stats = row.stats.unwrap();
        assert!((stats.shots_home - round2(row.expected_home_goals * 9.0 + 3.0)).abs() < 1e-9);
    }
}
