//! Post-match evaluation: compare persisted predictions against realized
//! results, upsert one outcome row per (match, model), and aggregate
//! per-model accuracy.

use std::collections::HashSet;

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::config::EngineConfig;
use crate::predict::{
    PoissonPredictionRow, WeinstonPredictionRow, btts_label, over_label, pick_1x2,
};
use crate::store::{MatchRow, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    Poisson,
    Weinston,
}

impl Model {
    pub fn as_str(self) -> &'static str {
        match self {
            Model::Poisson => "poisson",
            Model::Weinston => "weinston",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "poisson" => Some(Model::Poisson),
            "weinston" => Some(Model::Weinston),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutcomeRow {
    pub match_id: i64,
    pub model: Model,
    pub pick_1x2: Option<String>,
    pub hit_1x2: Option<bool>,
    pub pick_over25: Option<String>,
    pub hit_over25: Option<bool>,
    pub pick_btts: Option<String>,
    pub hit_btts: Option<bool>,
    pub abs_err_home_goals: Option<f64>,
    pub abs_err_away_goals: Option<f64>,
    pub rmse_goals: Option<f64>,
}

impl OutcomeRow {
    pub(crate) fn from_sql_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let label: String = row.get(1)?;
        let model = Model::from_label(&label).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("unknown model {label:?}").into(),
            )
        })?;
        Ok(Self {
            match_id: row.get(0)?,
            model,
            pick_1x2: row.get(2)?,
            hit_1x2: row.get(3)?,
            pick_over25: row.get(4)?,
            hit_over25: row.get(5)?,
            pick_btts: row.get(6)?,
            hit_btts: row.get(7)?,
            abs_err_home_goals: row.get(8)?,
            abs_err_away_goals: row.get(9)?,
            rmse_goals: row.get(10)?,
        })
    }
}

/// Realized result per market, derived once per finished match.
#[derive(Debug, Clone)]
pub struct GroundTruth {
    pub result_1x2: &'static str,
    pub over_under: &'static str,
    pub btts: &'static str,
}

pub fn ground_truth(home_goals: i64, away_goals: i64, over_under_threshold: u32) -> GroundTruth {
    let result_1x2 = if home_goals > away_goals {
        "1"
    } else if home_goals < away_goals {
        "2"
    } else {
        "X"
    };
    // Strict: exactly the threshold total is UNDER.
    let over_under = if home_goals + away_goals > over_under_threshold as i64 {
        "OVER"
    } else {
        "UNDER"
    };
    let btts = if home_goals > 0 && away_goals > 0 { "YES" } else { "NO" };
    GroundTruth {
        result_1x2,
        over_under,
        btts,
    }
}

pub fn evaluate_poisson(
    m: &MatchRow,
    pred: &PoissonPredictionRow,
    truth: &GroundTruth,
    cfg: &EngineConfig,
) -> OutcomeRow {
    // Picks are re-derived from the stored probabilities with the same rules
    // prediction uses, so threshold changes re-evaluate cleanly.
    let p = &pred.probs;
    let pick = pick_1x2(p.p_home, p.p_draw, p.p_away).as_str();
    let pick_over = over_label(p.p_over, cfg.pick_threshold);
    let pick_btts = btts_label(p.p_btts_yes, cfg.pick_threshold);

    OutcomeRow {
        match_id: m.id,
        model: Model::Poisson,
        pick_1x2: Some(pick.to_string()),
        hit_1x2: Some(pick == truth.result_1x2),
        pick_over25: Some(pick_over.to_string()),
        hit_over25: Some(pick_over == truth.over_under),
        pick_btts: Some(pick_btts.to_string()),
        hit_btts: Some(pick_btts == truth.btts),
        abs_err_home_goals: None,
        abs_err_away_goals: None,
        rmse_goals: None,
    }
}

pub fn evaluate_weinston(
    m: &MatchRow,
    pred: &WeinstonPredictionRow,
    truth: &GroundTruth,
) -> Option<OutcomeRow> {
    let (home_goals, away_goals) = m.result()?;
    let eh = pred.expected_home_goals;
    let ea = pred.expected_away_goals;
    let err_h = eh - home_goals as f64;
    let err_a = ea - away_goals as f64;

    Some(OutcomeRow {
        match_id: m.id,
        model: Model::Weinston,
        pick_1x2: Some(pred.pick_1x2.as_str().to_string()),
        hit_1x2: Some(pred.pick_1x2.as_str() == truth.result_1x2),
        pick_over25: Some(pred.pick_over.clone()),
        hit_over25: Some(pred.pick_over == truth.over_under),
        pick_btts: Some(pred.pick_btts.clone()),
        hit_btts: Some(pred.pick_btts == truth.btts),
        abs_err_home_goals: Some(err_h.abs()),
        abs_err_away_goals: Some(err_a.abs()),
        rmse_goals: Some(((err_h * err_h + err_a * err_a) / 2.0).sqrt()),
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EvalCounts {
    pub poisson: usize,
    pub weinston: usize,
}

/// Evaluate every finished match of a season (optionally windowed by date or
/// restricted to specific matches) for each model that predicted it. A model
/// that never predicted a match simply contributes no row.
pub fn evaluate_season(
    store: &Store,
    cfg: &EngineConfig,
    season_id: i64,
    date_from: Option<&str>,
    date_to: Option<&str>,
    match_ids: Option<&[i64]>,
) -> Result<EvalCounts> {
    let matches = store.finished_season_matches(season_id)?;
    let poisson_preds = store.poisson_predictions_for_season(season_id)?;
    let weinston_preds = store.weinston_predictions_for_season(season_id)?;
    let id_filter: Option<HashSet<i64>> =
        match_ids.map(|ids| ids.iter().copied().collect());

    let mut counts = EvalCounts::default();
    for m in &matches {
        if let Some(from) = date_from
            && m.date.as_str() < from
        {
            continue;
        }
        if let Some(to) = date_to
            && m.date.as_str() > to
        {
            continue;
        }
        if let Some(filter) = &id_filter
            && !filter.contains(&m.id)
        {
            continue;
        }
        let Some((hg, ag)) = m.result() else { continue };
        let truth = ground_truth(hg, ag, cfg.over_under_threshold);

        if let Some(pred) = poisson_preds.get(&m.id) {
            store.upsert_outcome(&evaluate_poisson(m, pred, &truth, cfg))?;
            counts.poisson += 1;
        }
        if let Some(pred) = weinston_preds.get(&m.id)
            && let Some(outcome) = evaluate_weinston(m, pred, &truth)
        {
            store.upsert_outcome(&outcome)?;
            counts.weinston += 1;
        }
    }

    info!(
        season_id,
        poisson = counts.poisson,
        weinston = counts.weinston,
        "evaluation complete"
    );
    Ok(counts)
}

// --- accuracy aggregation ---------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelMetrics {
    pub model: Model,
    pub decided_1x2: usize,
    pub hits_1x2: usize,
    pub acc_1x2: Option<f64>,
    pub decided_over25: usize,
    pub hits_over25: usize,
    pub acc_over25: Option<f64>,
    pub decided_btts: usize,
    pub hits_btts: usize,
    pub acc_btts: Option<f64>,
    pub avg_rmse_goals: Option<f64>,
}

/// Accuracy by model for a season/date window, from persisted outcome rows.
pub fn metrics_by_model(
    store: &Store,
    season_id: i64,
    date_from: Option<&str>,
    date_to: Option<&str>,
) -> Result<Vec<ModelMetrics>> {
    let outcomes = store.outcomes_for_season(season_id, date_from, date_to)?;

    let mut out = Vec::new();
    for model in [Model::Poisson, Model::Weinston] {
        let rows: Vec<&OutcomeRow> = outcomes.iter().filter(|o| o.model == model).collect();
        if rows.is_empty() {
            continue;
        }
        let (decided_1x2, hits_1x2) = tally(&rows, |o| o.hit_1x2);
        let (decided_over25, hits_over25) = tally(&rows, |o| o.hit_over25);
        let (decided_btts, hits_btts) = tally(&rows, |o| o.hit_btts);
        let rmse_values: Vec<f64> = rows.iter().filter_map(|o| o.rmse_goals).collect();
        out.push(ModelMetrics {
            model,
            decided_1x2,
            hits_1x2,
            acc_1x2: accuracy(decided_1x2, hits_1x2),
            decided_over25,
            hits_over25,
            acc_over25: accuracy(decided_over25, hits_over25),
            decided_btts,
            hits_btts,
            acc_btts: accuracy(decided_btts, hits_btts),
            avg_rmse_goals: if rmse_values.is_empty() {
                None
            } else {
                Some(rmse_values.iter().sum::<f64>() / rmse_values.len() as f64)
            },
        });
    }
    Ok(out)
}

fn tally(rows: &[&OutcomeRow], hit: impl Fn(&OutcomeRow) -> Option<bool>) -> (usize, usize) {
    let mut decided = 0usize;
    let mut hits = 0usize;
    for row in rows {
        if let Some(was_hit) = hit(row) {
            decided += 1;
            if was_hit {
                hits += 1;
            }
        }
    }
    (decided, hits)
}

fn accuracy(decided: usize, hits: usize) -> Option<f64> {
    if decided == 0 {
        return None;
    }
    Some(hits as f64 / decided as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::Pick1x2;
    use crate::prob_grid::OutcomeProbs;

    fn finished_match(id: i64, hg: i64, ag: i64) -> MatchRow {
        MatchRow {
            id,
            season_id: 1,
            date: "2025-03-01".to_string(),
            home_team_id: 101,
            away_team_id: 102,
            home_goals: Some(hg),
            away_goals: Some(ag),
        }
    }

    fn probs(p_home: f64, p_draw: f64, p_away: f64) -> OutcomeProbs {
        OutcomeProbs {
            p_home,
            p_draw,
            p_away,
            p_over: 0.7,
            p_under: 0.3,
            p_btts_yes: 0.6,
            p_btts_no: 0.4,
        }
    }

    #[test]
    fn ground_truth_over_is_strict() {
        assert_eq!(ground_truth(1, 1, 2).over_under, "UNDER");
        assert_eq!(ground_truth(2, 1, 2).over_under, "OVER");
    }

    #[test]
    fn poisson_evaluation_scenario() {
        // 3-1 home win against a 0.60/0.25/0.15 prediction.
        let cfg = EngineConfig::default();
        let m = finished_match(1, 3, 1);
        let truth = ground_truth(3, 1, cfg.over_under_threshold);
        assert_eq!(truth.over_under, "OVER");
        assert_eq!(truth.btts, "YES");

        let pred = PoissonPredictionRow {
            match_id: 1,
            expected_home_goals: 2.1,
            expected_away_goals: 1.0,
            probs: probs(0.60, 0.25, 0.15),
            pick_1x2: Pick1x2::Home,
            pick_over: "OVER".to_string(),
            pick_btts: "YES".to_string(),
            min_odds_1: None,
            min_odds_x: None,
            min_odds_2: None,
            min_odds_over25: None,
            min_odds_under25: None,
            min_odds_btts_yes: None,
            min_odds_btts_no: None,
        };
        let outcome = evaluate_poisson(&m, &pred, &truth, &cfg);
        assert_eq!(outcome.pick_1x2.as_deref(), Some("1"));
        assert_eq!(outcome.hit_1x2, Some(true));
        // The model's own BTTS pick comes from its probability (0.6 >= 0.5).
        assert_eq!(outcome.pick_btts.as_deref(), Some("YES"));
        assert_eq!(outcome.hit_btts, Some(true));
        assert!(outcome.rmse_goals.is_none());
    }

    #[test]
    fn weinston_evaluation_computes_goal_errors() {
        let m = finished_match(1, 2, 0);
        let truth = ground_truth(2, 0, 2);
        let pred = WeinstonPredictionRow {
            match_id: 1,
            expected_home_goals: 1.5,
            expected_away_goals: 1.0,
            probs: probs(0.5, 0.3, 0.2),
            pick_1x2: Pick1x2::Home,
            pick_over: "UNDER".to_string(),
            pick_btts: "NO".to_string(),
            stats: None,
        };
        let outcome = evaluate_weinston(&m, &pred, &truth).unwrap();
        assert_eq!(outcome.hit_1x2, Some(true));
        assert_eq!(outcome.hit_over25, Some(true));
        assert!((outcome.abs_err_home_goals.unwrap() - 0.5).abs() < 1e-9);
        assert!((outcome.abs_err_away_goals.unwrap() - 1.0).abs() < 1e-9);
        let expected_rmse = ((0.25 + 1.0) / 2.0_f64).sqrt();
        assert!((outcome.rmse_goals.unwrap() - expected_rmse).abs() < 1e-9);
    }

    #[test]
    fn metrics_tally_ignores_undecided_markets() {
        let rows = vec![
            OutcomeRow {
                match_id: 1,
                model: Model::Weinston,
                pick_1x2: Some("1".to_string()),
                hit_1x2: Some(true),
                pick_over25: None,
                hit_over25: None,
                pick_btts: Some("YES".to_string()),
                hit_btts: Some(false),
                abs_err_home_goals: Some(0.5),
                abs_err_away_goals: Some(0.5),
                rmse_goals: Some(0.5),
            },
            OutcomeRow {
                match_id: 2,
                model: Model::Weinston,
                pick_1x2: Some("X".to_string()),
                hit_1x2: Some(false),
                pick_over25: Some("OVER".to_string()),
                hit_over25: Some(true),
                pick_btts: None,
                hit_btts: None,
                abs_err_home_goals: None,
                abs_err_away_goals: None,
                rmse_goals: None,
            },
        ];
        let refs: Vec<&OutcomeRow> = rows.iter().collect();
        assert_eq!(tally(&refs, |o| o.hit_1x2), (2, 1));
        assert_eq!(tally(&refs, |o| o.hit_over25), (1, 1));
        assert_eq!(tally(&refs, |o| o.hit_btts), (1, 0));
    }
}
