//! Simple recent-form attack/defense indices, the Poisson path's stand-in
//! for the fitted Weinston multipliers. No optimization: per-venue goal
//! averages over each team's last N matches, shrunk toward the league mean
//! and expressed as ratios against it.

use std::collections::HashMap;

use crate::league_context::LeagueContext;
use crate::store::MatchRow;

/// Shrinkage strength: a team with no history collapses exactly to the league
/// mean, a team with many matches is barely moved.
pub const SHRINKAGE_K: f64 = 5.0;

#[derive(Debug, Clone, Copy)]
pub struct TeamForm {
    pub attack_home: f64,
    pub defense_home: f64,
    pub attack_away: f64,
    pub defense_away: f64,
}

/// Blend a small-sample average toward a prior. `None` (no observations at
/// all) collapses to the prior outright.
pub fn shrink(value: Option<f64>, prior: f64, n: usize) -> f64 {
    let v = value.unwrap_or(prior);
    (n as f64 * v + SHRINKAGE_K * prior) / (n as f64 + SHRINKAGE_K)
}

#[derive(Default)]
struct VenueGoals {
    goals_for: Vec<f64>,
    goals_against: Vec<f64>,
}

impl VenueGoals {
    fn push(&mut self, gf: i64, ga: i64) {
        self.goals_for.push(gf as f64);
        self.goals_against.push(ga as f64);
    }

    fn averages(&self) -> (Option<f64>, Option<f64>, usize) {
        (
            avg(&self.goals_for),
            avg(&self.goals_against),
            self.goals_for.len(),
        )
    }
}

fn avg(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Compute per-team form from finished matches of one league/season scope.
/// `matches` must already be the league-scoped history (the resolver owns
/// that boundary); newest-first ordering is established here.
pub fn recent_form(
    matches: &[MatchRow],
    ctx: &LeagueContext,
    n_recent: usize,
) -> HashMap<i64, TeamForm> {
    let mut ordered: Vec<&MatchRow> = matches.iter().filter(|m| m.is_finished()).collect();
    ordered.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));

    let mut home_goals: HashMap<i64, VenueGoals> = HashMap::new();
    let mut away_goals: HashMap<i64, VenueGoals> = HashMap::new();

    for m in ordered {
        let Some((hg, ag)) = m.result() else { continue };
        let home = home_goals.entry(m.home_team_id).or_default();
        if home.goals_for.len() < n_recent {
            home.push(hg, ag);
        }
        let away = away_goals.entry(m.away_team_id).or_default();
        if away.goals_for.len() < n_recent {
            away.push(ag, hg);
        }
    }

    let lg_home = ctx.avg_home_goals;
    let lg_away = ctx.avg_away_goals;

    let mut out = HashMap::new();
    let team_ids: Vec<i64> = home_goals.keys().chain(away_goals.keys()).copied().collect();
    for team_id in team_ids {
        if out.contains_key(&team_id) {
            continue;
        }
        let (home_for, home_against, n_home) = home_goals
            .get(&team_id)
            .map(|v| v.averages())
            .unwrap_or((None, None, 0));
        let (away_for, away_against, n_away) = away_goals
            .get(&team_id)
            .map(|v| v.averages())
            .unwrap_or((None, None, 0));

        let home_for = shrink(home_for, lg_home, n_home);
        let home_against = shrink(home_against, lg_away, n_home);
        let away_for = shrink(away_for, lg_away, n_away);
        let away_against = shrink(away_against, lg_home, n_away);

        out.insert(
            team_id,
            TeamForm {
                attack_home: ratio(home_for, lg_home),
                defense_home: ratio(home_against, lg_away),
                attack_away: ratio(away_for, lg_away),
                defense_away: ratio(away_against, lg_home),
            },
        );
    }
    out
}

fn ratio(value: f64, baseline: f64) -> f64 {
    if baseline > 0.0 { value / baseline } else { 1.0 }
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
            avg_away_goals: 1.0,
            home_advantage: 1.05,
            source: ContextSource::Dynamic,
        }
    }

    fn m(id: i64, home: i64, away: i64, hg: i64, ag: i64) -> MatchRow {
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

    #[test]
    fn shrink_with_no_samples_is_exactly_the_prior() {
        assert_eq!(shrink(None, 1.4, 0), 1.4);
        assert_eq!(shrink(Some(3.0), 1.4, 0), 1.4);
    }

    #[test]
    fn shrink_approaches_raw_average_with_large_n() {
        let shrunk = shrink(Some(3.0), 1.4, 100_000);
        assert!((shrunk - 3.0).abs() < 1e-3);
    }

    #[test]
    fn team_with_no_matches_is_absent() {
        let forms = recent_form(&[m(1, 101, 102, 2, 0)], &ctx(), 20);
        assert!(forms.contains_key(&101));
        assert!(!forms.contains_key(&999));
    }

    #[test]
    fn prolific_home_team_gets_attack_index_above_one() {
        let matches = vec![
            m(1, 101, 102, 3, 0),
            m(2, 101, 103, 4, 1),
            m(3, 101, 104, 3, 1),
        ];
        let forms = recent_form(&matches, &ctx(), 20);
        let t = forms.get(&101).unwrap();
        assert!(t.attack_home > 1.0, "attack_home = {}", t.attack_home);
    }

    #[test]
    fn only_last_n_matches_count() {
        // Old thrashings outside the window must not affect the index.
        let mut matches = vec![m(30, 101, 102, 0, 0)];
        for id in 1..=5 {
            matches.push(MatchRow {
                id,
                season_id: 1,
                date: "2024-01-01".to_string(),
                home_team_id: 101,
                away_team_id: 102,
                home_goals: Some(9),
                away_goals: Some(0),
            });
        }
        let forms = recent_form(&matches, &ctx(), 1);
        let t = forms.get(&101).unwrap();
        // One scoreless recent match shrunk toward the mean: below average.
        assert!(t.attack_home < 1.0);
    }
}
