//! Weinston attack/defense rating fit: constrained maximum-likelihood
//! estimation of per-team multipliers for one season.
//!
//! Each team carries four multipliers (attack/defense, home/away) plus three
//! season globals (mu_home, mu_away, home advantage). Expected goals for a
//! fixture are `mu_home * atk_home(h) * def_away(a) * home_adv` and
//! `mu_away * atk_away(a) * def_home(h)`; the fit minimizes the Poisson
//! negative log-likelihood of the observed scores with a light L2 pull toward
//! 1.0, subject to each multiplier family averaging exactly 1.0. That
//! constraint is what makes "attack 1.3" read as 30% above the season's
//! league average.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::ModelError;
use crate::store::MatchRow;

const REG_WEIGHT: f64 = 1e-3;
const MULT_MIN: f64 = 0.1;
const MULT_MAX: f64 = 10.0;
const MU_MIN: f64 = 0.1;
const MU_MAX: f64 = 5.0;
const HADV_MIN: f64 = 0.5;
const HADV_MAX: f64 = 4.0;
const LAMBDA_MIN: f64 = 1e-6;
const LAMBDA_MAX: f64 = 50.0;

const MAX_ITERS: usize = 500;
const REL_TOL: f64 = 1e-6;
const INITIAL_STEP: f64 = 0.05;
const MAX_STEP: f64 = 0.5;
const MAX_BACKTRACKS: usize = 30;

const FALLBACK_MU_HOME: f64 = 1.3;
const FALLBACK_MU_AWAY: f64 = 1.1;
const INITIAL_HOME_ADV: f64 = 1.2;

#[derive(Debug, Clone)]
pub struct FitResult {
    pub team_ids: Vec<i64>,
    pub atk_home: Vec<f64>,
    pub def_home: Vec<f64>,
    pub atk_away: Vec<f64>,
    pub def_away: Vec<f64>,
    pub mu_home: f64,
    pub mu_away: f64,
    pub home_adv: f64,
    pub loss: f64,
}

/// One finished fixture in team-index space.
struct Obs {
    home: usize,
    away: usize,
    home_goals: f64,
    away_goals: f64,
}

#[derive(Clone)]
struct Params {
    atk_home: Vec<f64>,
    def_home: Vec<f64>,
    atk_away: Vec<f64>,
    def_away: Vec<f64>,
    mu_home: f64,
    mu_away: f64,
    home_adv: f64,
}

impl Params {
    fn neutral(n: usize, mu_home: f64, mu_away: f64) -> Self {
        Self {
            atk_home: vec![1.0; n],
            def_home: vec![1.0; n],
            atk_away: vec![1.0; n],
            def_away: vec![1.0; n],
            mu_home,
            mu_away,
            home_adv: INITIAL_HOME_ADV,
        }
    }

    fn lambdas(&self, o: &Obs) -> (f64, f64) {
        let lam_h =
            self.mu_home * self.atk_home[o.home] * self.def_away[o.away] * self.home_adv;
        let lam_a = self.mu_away * self.atk_away[o.away] * self.def_home[o.home];
        (
            lam_h.clamp(LAMBDA_MIN, LAMBDA_MAX),
            lam_a.clamp(LAMBDA_MIN, LAMBDA_MAX),
        )
    }

    /// Restore feasibility after a raw gradient step: box-clamp everything,
    /// then rescale each multiplier family to mean exactly 1.0. The removed
    /// family scales are folded into mu_home/mu_away, which leaves every
    /// expected-goal rate (and so the likelihood) unchanged by the
    /// projection.
    fn project(&mut self) {
        for family in [
            &mut self.atk_home,
            &mut self.def_home,
            &mut self.atk_away,
            &mut self.def_away,
        ] {
            for v in family.iter_mut() {
                *v = v.clamp(MULT_MIN, MULT_MAX);
            }
        }
        let scale_ah = normalize_family(&mut self.atk_home);
        let scale_dh = normalize_family(&mut self.def_home);
        let scale_aa = normalize_family(&mut self.atk_away);
        let scale_da = normalize_family(&mut self.def_away);

        self.mu_home = (self.mu_home * scale_ah * scale_da).clamp(MU_MIN, MU_MAX);
        self.mu_away = (self.mu_away * scale_aa * scale_dh).clamp(MU_MIN, MU_MAX);
        self.home_adv = self.home_adv.clamp(HADV_MIN, HADV_MAX);
    }

    fn stepped(&self, grad: &Gradient, step: f64) -> Self {
        let mut out = self.clone();
        let scale = step / grad.inf_norm().max(1e-12);
        for i in 0..out.atk_home.len() {
            out.atk_home[i] -= scale * grad.atk_home[i];
            out.def_home[i] -= scale * grad.def_home[i];
            out.atk_away[i] -= scale * grad.atk_away[i];
            out.def_away[i] -= scale * grad.def_away[i];
        }
        out.mu_home -= scale * grad.mu_home;
        out.mu_away -= scale * grad.mu_away;
        out.home_adv -= scale * grad.home_adv;
        out
    }
}

fn normalize_family(family: &mut [f64]) -> f64 {
    if family.is_empty() {
        return 1.0;
    }
    let mean = family.iter().sum::<f64>() / family.len() as f64;
    for v in family.iter_mut() {
        *v /= mean;
    }
    mean
}

struct Gradient {
    atk_home: Vec<f64>,
    def_home: Vec<f64>,
    atk_away: Vec<f64>,
    def_away: Vec<f64>,
    mu_home: f64,
    mu_away: f64,
    home_adv: f64,
}

impl Gradient {
    fn inf_norm(&self) -> f64 {
        let mut norm: f64 = self
            .mu_home
            .abs()
            .max(self.mu_away.abs())
            .max(self.home_adv.abs());
        for family in [&self.atk_home, &self.def_home, &self.atk_away, &self.def_away] {
            for v in family.iter() {
                norm = norm.max(v.abs());
            }
        }
        norm
    }
}

fn objective(p: &Params, obs: &[Obs]) -> f64 {
    let mut nll = 0.0;
    for o in obs {
        let (lam_h, lam_a) = p.lambdas(o);
        nll += lam_h - o.home_goals * lam_h.ln();
        nll += lam_a - o.away_goals * lam_a.ln();
    }
    let mut reg = 0.0;
    for family in [&p.atk_home, &p.def_home, &p.atk_away, &p.def_away] {
        for v in family.iter() {
            reg += (v - 1.0) * (v - 1.0);
        }
    }
    nll + REG_WEIGHT * reg
}

fn gradient(p: &Params, obs: &[Obs]) -> Gradient {
    let n = p.atk_home.len();
    let mut g = Gradient {
        atk_home: vec![0.0; n],
        def_home: vec![0.0; n],
        atk_away: vec![0.0; n],
        def_away: vec![0.0; n],
        mu_home: 0.0,
        mu_away: 0.0,
        home_adv: 0.0,
    };

    for o in obs {
        let (lam_h, lam_a) = p.lambdas(o);
        // d(lam - g*ln lam)/d lam = 1 - g/lam, and d lam/d factor = lam/factor,
        // so each factor's partial collapses to (lam - goals)/factor. The
        // derivative vanishes where the rate clamp is active.
        let raw_h = raw_lambda_home(p, o);
        if raw_h > LAMBDA_MIN && raw_h < LAMBDA_MAX {
            let r = lam_h - o.home_goals;
            g.atk_home[o.home] += r / p.atk_home[o.home];
            g.def_away[o.away] += r / p.def_away[o.away];
            g.mu_home += r / p.mu_home;
            g.home_adv += r / p.home_adv;
        }
        let raw_a = raw_lambda_away(p, o);
        if raw_a > LAMBDA_MIN && raw_a < LAMBDA_MAX {
            let r = lam_a - o.away_goals;
            g.atk_away[o.away] += r / p.atk_away[o.away];
            g.def_home[o.home] += r / p.def_home[o.home];
            g.mu_away += r / p.mu_away;
        }
    }

    for i in 0..n {
        g.atk_home[i] += 2.0 * REG_WEIGHT * (p.atk_home[i] - 1.0);
        g.def_home[i] += 2.0 * REG_WEIGHT * (p.def_home[i] - 1.0);
        g.atk_away[i] += 2.0 * REG_WEIGHT * (p.atk_away[i] - 1.0);
        g.def_away[i] += 2.0 * REG_WEIGHT * (p.def_away[i] - 1.0);
    }

    g
}

fn raw_lambda_home(p: &Params, o: &Obs) -> f64 {
    p.mu_home * p.atk_home[o.home] * p.def_away[o.away] * p.home_adv
}

fn raw_lambda_away(p: &Params, o: &Obs) -> f64 {
    p.mu_away * p.atk_away[o.away] * p.def_home[o.home]
}

fn build_dataset(
    season_id: i64,
    matches: &[MatchRow],
) -> Result<(Vec<i64>, Vec<Obs>, f64, f64), ModelError> {
    // Teams come from the season's own finished matches, never from a wider
    // catalogue; reused team ids in other competitions stay out of this fit.
    let mut index: BTreeMap<i64, usize> = BTreeMap::new();
    let mut obs = Vec::new();
    let mut goal_home_sum = 0.0;
    let mut goal_away_sum = 0.0;

    for m in matches {
        if m.season_id != season_id {
            continue;
        }
        let Some((hg, ag)) = m.result() else { continue };
        let next = index.len();
        let home = *index.entry(m.home_team_id).or_insert(next);
        let next = index.len();
        let away = *index.entry(m.away_team_id).or_insert(next);
        obs.push(Obs {
            home,
            away,
            home_goals: hg as f64,
            away_goals: ag as f64,
        });
        goal_home_sum += hg as f64;
        goal_away_sum += ag as f64;
    }

    if index.len() < 2 {
        return Err(ModelError::InsufficientData {
            season_id,
            detail: format!("{} distinct teams, need at least 2", index.len()),
        });
    }

    let mut team_ids = vec![0i64; index.len()];
    for (team_id, idx) in &index {
        team_ids[*idx] = *team_id;
    }

    let (mu_home, mu_away) = if obs.is_empty() {
        (FALLBACK_MU_HOME, FALLBACK_MU_AWAY)
    } else {
        let n = obs.len() as f64;
        (goal_home_sum / n, goal_away_sum / n)
    };

    Ok((team_ids, obs, mu_home, mu_away))
}

/// Objective value at the neutral starting point (all multipliers 1.0, league
/// mean rates, default home advantage). The optimizer must beat this.
pub fn baseline_loss(season_id: i64, matches: &[MatchRow]) -> Result<f64, ModelError> {
    let (team_ids, obs, mu_home, mu_away) = build_dataset(season_id, matches)?;
    let mut p = Params::neutral(team_ids.len(), mu_home, mu_away);
    p.project();
    Ok(objective(&p, &obs))
}

/// Fit one season. Pure computation over the given matches; persisting the
/// result is the caller's separate step.
pub fn fit_weinston(season_id: i64, matches: &[MatchRow]) -> Result<FitResult, ModelError> {
    let (team_ids, obs, mu_home, mu_away) = build_dataset(season_id, matches)?;

    let mut p = Params::neutral(
        team_ids.len(),
        mu_home.clamp(MU_MIN, MU_MAX),
        mu_away.clamp(MU_MIN, MU_MAX),
    );
    p.project();
    let mut loss = objective(&p, &obs);
    let mut step = INITIAL_STEP;

    for iter in 0..MAX_ITERS {
        let grad = gradient(&p, &obs);
        if grad.inf_norm() < 1e-12 {
            break;
        }

        let mut accepted = false;
        let mut trial = step;
        for _ in 0..MAX_BACKTRACKS {
            let mut candidate = p.stepped(&grad, trial);
            candidate.project();
            let candidate_loss = objective(&candidate, &obs);
            if candidate_loss < loss {
                let gain = loss - candidate_loss;
                p = candidate;
                loss = candidate_loss;
                step = (trial * 1.5).min(MAX_STEP);
                accepted = true;
                if gain < REL_TOL * (1.0 + loss.abs()) {
                    debug!(season_id, iter, loss, "fit converged");
                    return Ok(finish(team_ids, p, loss));
                }
                break;
            }
            trial *= 0.5;
        }
        if !accepted {
            debug!(season_id, iter, loss, "no improving step, stopping");
            break;
        }
    }

    Ok(finish(team_ids, p, loss))
}

fn finish(team_ids: Vec<i64>, p: Params, loss: f64) -> FitResult {
    FitResult {
        team_ids,
        atk_home: p.atk_home,
        def_home: p.def_home,
        atk_away: p.atk_away,
        def_away: p.def_away,
        mu_home: p.mu_home,
        mu_away: p.mu_away,
        home_adv: p.home_adv,
        loss,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(id: i64, home: i64, away: i64, hg: i64, ag: i64) -> MatchRow {
        MatchRow {
            id,
            season_id: 1,
            date: format!("2024-09-{:02}", (id % 27) + 1),
            home_team_id: home,
            away_team_id: away,
            home_goals: Some(hg),
            away_goals: Some(ag),
        }
    }

    fn synthetic_season() -> Vec<MatchRow> {
        // Four teams; 101 consistently outscores everyone, 104 concedes a lot.
        vec![
            finished(1, 101, 102, 3, 0),
            finished(2, 103, 104, 2, 1),
            finished(3, 101, 103, 2, 0),
            finished(4, 102, 104, 2, 2),
            finished(5, 104, 101, 0, 4),
            finished(6, 102, 103, 1, 1),
        ]
    }

    fn mean(values: &[f64]) -> f64 {
        values.iter().sum::<f64>() / values.len() as f64
    }

    #[test]
    fn too_few_teams_is_insufficient_data() {
        let err = fit_weinston(1, &[]).unwrap_err();
        assert!(matches!(err, ModelError::InsufficientData { .. }));
    }

    #[test]
    fn fit_improves_on_neutral_baseline() {
        let matches = synthetic_season();
        let baseline = baseline_loss(1, &matches).unwrap();
        let fit = fit_weinston(1, &matches).unwrap();
        assert!(
            fit.loss < baseline,
            "fit loss {} should beat baseline {}",
            fit.loss,
            baseline
        );
    }

    #[test]
    fn multiplier_families_average_to_one() {
        let fit = fit_weinston(1, &synthetic_season()).unwrap();
        for family in [&fit.atk_home, &fit.def_home, &fit.atk_away, &fit.def_away] {
            assert!(
                (mean(family) - 1.0).abs() < 1e-3,
                "family mean {} drifted from 1.0",
                mean(family)
            );
        }
    }

    #[test]
    fn strong_attack_is_rated_above_average() {
        let fit = fit_weinston(1, &synthetic_season()).unwrap();
        let idx_101 = fit.team_ids.iter().position(|t| *t == 101).unwrap();
        let idx_104 = fit.team_ids.iter().position(|t| *t == 104).unwrap();
        assert!(fit.atk_home[idx_101] > 1.0);
        // 104 concedes heavily away, so its away concession multiplier is high.
        assert!(fit.def_away[idx_104] > fit.def_away[idx_101]);
    }

    #[test]
    fn fit_only_uses_the_target_season() {
        let mut matches = synthetic_season();
        // A foreign-season blowout must not leak into the fit.
        matches.push(MatchRow {
            id: 99,
            season_id: 2,
            date: "2024-10-01".to_string(),
            home_team_id: 101,
            away_team_id: 102,
            home_goals: Some(9),
            away_goals: Some(0),
        });
        let scoped = fit_weinston(1, &synthetic_season()).unwrap();
        let mixed = fit_weinston(1, &matches).unwrap();
        assert_eq!(scoped.team_ids, mixed.team_ids);
        assert!((scoped.loss - mixed.loss).abs() < 1e-12);
    }

    #[test]
    fn bounds_hold_after_fit() {
        let fit = fit_weinston(1, &synthetic_season()).unwrap();
        for family in [&fit.atk_home, &fit.def_home, &fit.atk_away, &fit.def_away] {
            // Projection renormalizes after clamping, so allow the mean-1
            // rescale a little slack around the raw box.
            assert!(family.iter().all(|v| *v > 0.0 && *v < MULT_MAX * 2.0));
        }
        assert!(fit.mu_home >= MU_MIN && fit.mu_home <= MU_MAX);
        assert!(fit.mu_away >= MU_MIN && fit.mu_away <= MU_MAX);
        assert!(fit.home_adv >= HADV_MIN && fit.home_adv <= HADV_MAX);
    }
}
