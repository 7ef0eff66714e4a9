//! Recent-form profiles for the secondary match statistics (shots, shots on
//! target, fouls, cards, corners), split by venue and shrunk toward the
//! league mean. These feed the Weinston path's expected-stat projections.

use std::collections::HashMap;

use crate::store::{MatchStatsRow, MatchWithStats};
use crate::team_form::shrink;

/// The five tracked statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKind {
    Shots,
    ShotsOnTarget,
    Fouls,
    Cards,
    Corners,
}

pub const TRACKED_STATS: [StatKind; 5] = [
    StatKind::Shots,
    StatKind::ShotsOnTarget,
    StatKind::Fouls,
    StatKind::Cards,
    StatKind::Corners,
];

impl StatKind {
    /// Hardcoded league-mean fallbacks for a league with no stat rows at all.
    pub fn default_mean(self) -> f64 {
        match self {
            StatKind::Shots => 12.0,
            StatKind::ShotsOnTarget => 4.0,
            StatKind::Fouls => 11.0,
            StatKind::Cards => 2.0,
            StatKind::Corners => 5.0,
        }
    }

    fn split(self, s: &MatchStatsRow) -> (Option<i64>, Option<i64>) {
        match self {
            StatKind::Shots => (s.home_shots, s.away_shots),
            StatKind::ShotsOnTarget => (s.home_shots_on_target, s.away_shots_on_target),
            StatKind::Fouls => (s.home_fouls, s.away_fouls),
            StatKind::Cards => (s.home_cards(), s.away_cards()),
            StatKind::Corners => (s.home_corners, s.away_corners),
        }
    }
}

/// Shrunk averages for one stat at one venue.
#[derive(Debug, Clone, Copy)]
pub struct VenueStat {
    pub for_avg: f64,
    pub against_avg: f64,
    pub samples: usize,
}

/// Per-stat venue split; a venue with zero samples stays `None` rather than
/// becoming a fabricated zero — callers fall back to the league mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatProfile {
    pub home: Option<VenueStat>,
    pub away: Option<VenueStat>,
}

#[derive(Debug, Clone, Default)]
pub struct TeamProfiles {
    pub by_team: HashMap<i64, HashMap<StatKind, StatProfile>>,
    pub league_means: HashMap<StatKind, f64>,
}

impl TeamProfiles {
    pub fn league_mean(&self, stat: StatKind) -> f64 {
        self.league_means
            .get(&stat)
            .copied()
            .unwrap_or_else(|| stat.default_mean())
    }

    pub fn stat(&self, team_id: i64, stat: StatKind) -> Option<&StatProfile> {
        self.by_team.get(&team_id)?.get(&stat)
    }

    pub fn is_empty(&self) -> bool {
        self.by_team.is_empty()
    }
}

#[derive(Default)]
struct Samples {
    for_values: Vec<f64>,
    against_values: Vec<f64>,
}

#[derive(Default)]
struct VenueSamples {
    home: Samples,
    away: Samples,
}

impl Samples {
    fn push(&mut self, for_value: Option<i64>, against_value: Option<i64>, cap: usize) {
        if let Some(v) = for_value
            && self.for_values.len() < cap
        {
            self.for_values.push(v as f64);
        }
        if let Some(v) = against_value
            && self.against_values.len() < cap
        {
            self.against_values.push(v as f64);
        }
    }

    fn venue_stat(&self, league_mean: f64) -> Option<VenueStat> {
        let n = self.for_values.len() + self.against_values.len();
        if n == 0 {
            return None;
        }
        Some(VenueStat {
            for_avg: shrink(avg(&self.for_values), league_mean, n),
            against_avg: shrink(avg(&self.against_values), league_mean, n),
            samples: n,
        })
    }
}

fn avg(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Build profiles from finished matches with stat lines, expected newest
/// first (the store query orders them that way); only each team's most recent
/// `n_recent` samples per venue are used.
pub fn load_profiles(rows: &[MatchWithStats], n_recent: usize) -> TeamProfiles {
    let mut league_sums: HashMap<StatKind, (f64, usize)> = HashMap::new();
    let mut per_team: HashMap<(i64, StatKind), VenueSamples> = HashMap::new();

    for row in rows {
        for stat in TRACKED_STATS {
            let (home_value, away_value) = stat.split(&row.stats);
            let entry = league_sums.entry(stat).or_insert((0.0, 0));
            for v in [home_value, away_value].into_iter().flatten() {
                entry.0 += v as f64;
                entry.1 += 1;
            }

            per_team
                .entry((row.home_team_id, stat))
                .or_default()
                .home
                .push(home_value, away_value, n_recent);
            per_team
                .entry((row.away_team_id, stat))
                .or_default()
                .away
                .push(away_value, home_value, n_recent);
        }
    }

    let mut league_means = HashMap::new();
    for stat in TRACKED_STATS {
        let mean = league_sums
            .get(&stat)
            .filter(|(_, count)| *count > 0)
            .map(|(sum, count)| sum / *count as f64)
            .unwrap_or_else(|| stat.default_mean());
        league_means.insert(stat, mean);
    }

    let mut by_team: HashMap<i64, HashMap<StatKind, StatProfile>> = HashMap::new();
    for ((team_id, stat), samples) in per_team {
        let mean = league_means[&stat];
        let profile = StatProfile {
            home: samples.home.venue_stat(mean),
            away: samples.away.venue_stat(mean),
        };
        if profile.home.is_none() && profile.away.is_none() {
            continue;
        }
        by_team.entry(team_id).or_default().insert(stat, profile);
    }

    TeamProfiles { by_team, league_means }
}

/// Expected stat pair for a fixture: each side's value blends that team's
/// "for" tendency (60%) with the opponent's "against" tendency (40%), the
/// side performing the action carrying the heavier weight.
pub fn expected_stat(
    profiles: &TeamProfiles,
    stat: StatKind,
    home_team_id: i64,
    away_team_id: i64,
) -> (f64, f64) {
    let lg = profiles.league_mean(stat);
    let home_profile = profiles.stat(home_team_id, stat);
    let away_profile = profiles.stat(away_team_id, stat);

    let home_for = home_profile
        .and_then(|p| p.home)
        .map_or(lg, |v| v.for_avg);
    let away_against = away_profile
        .and_then(|p| p.away)
        .map_or(lg, |v| v.against_avg);
    let home_value = 0.6 * home_for + 0.4 * away_against;

    let away_for = away_profile
        .and_then(|p| p.away)
        .map_or(lg, |v| v.for_avg);
    let home_against = home_profile
        .and_then(|p| p.home)
        .map_or(lg, |v| v.against_avg);
    let away_value = 0.6 * away_for + 0.4 * home_against;

    (home_value, away_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(match_id: i64, home: i64, away: i64, home_shots: i64, away_shots: i64) -> MatchWithStats {
        MatchWithStats {
            match_id,
            date: format!("2024-09-{:02}", (match_id % 27) + 1),
            home_team_id: home,
            away_team_id: away,
            stats: MatchStatsRow {
                match_id,
                home_shots: Some(home_shots),
                away_shots: Some(away_shots),
                home_corners: Some(5),
                away_corners: Some(4),
                ..MatchStatsRow::default()
            },
        }
    }

    #[test]
    fn league_mean_covers_both_sides() {
        let rows = vec![row(1, 101, 102, 10, 20)];
        let profiles = load_profiles(&rows, 20);
        assert!((profiles.league_mean(StatKind::Shots) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn missing_stat_kind_has_no_profile_entry() {
        let rows = vec![row(1, 101, 102, 10, 8)];
        let profiles = load_profiles(&rows, 20);
        // No fouls recorded anywhere: no fabricated entries.
        assert!(profiles.stat(101, StatKind::Fouls).is_none());
        assert!((profiles.league_mean(StatKind::Fouls) - StatKind::Fouls.default_mean()).abs() < 1e-9);
    }

    #[test]
    fn away_venue_absent_when_team_never_played_away() {
        let rows = vec![row(1, 101, 102, 10, 8)];
        let profiles = load_profiles(&rows, 20);
        let p = profiles.stat(101, StatKind::Shots).unwrap();
        assert!(p.home.is_some());
        assert!(p.away.is_none());
    }

    #[test]
    fn expected_stat_falls_back_to_league_mean_for_unknown_teams() {
        let rows = vec![row(1, 101, 102, 10, 20)];
        let profiles = load_profiles(&rows, 20);
        let lg = profiles.league_mean(StatKind::Shots);
        let (h, a) = expected_stat(&profiles, StatKind::Shots, 777, 888);
        assert!((h - lg).abs() < 1e-9);
        assert!((a - lg).abs() < 1e-9);
    }

    #[test]
    fn heavy_shooters_project_above_league_mean() {
        let rows = vec![
            row(1, 101, 102, 22, 6),
            row(2, 101, 103, 20, 7),
            row(3, 101, 104, 24, 5),
        ];
        let profiles = load_profiles(&rows, 20);
        let (h, _) = expected_stat(&profiles, StatKind::Shots, 101, 102);
        assert!(h > profiles.league_mean(StatKind::Shots));
    }
}
