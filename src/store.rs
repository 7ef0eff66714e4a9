//! Sqlite-backed storage collaborator. Every entity the engines read or write
//! goes through a typed record here; the engines themselves never touch SQL.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};

use crate::evaluate::OutcomeRow;
use crate::predict::{PoissonPredictionRow, WeinstonPredictionRow};
use crate::weinston_fit::FitResult;

#[derive(Debug, Clone)]
pub struct LeagueRow {
    pub id: i64,
    pub name: String,
    pub country: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SeasonRow {
    pub id: i64,
    pub league_id: i64,
    pub year_start: i32,
    pub year_end: i32,
}

impl SeasonRow {
    pub fn label(&self) -> String {
        format!("{}/{}", self.year_start, self.year_end)
    }
}

/// One fixture. `date` is an ISO `YYYY-MM-DD` string throughout; lexicographic
/// order equals chronological order, which the recency queries rely on.
#[derive(Debug, Clone)]
pub struct MatchRow {
    pub id: i64,
    pub season_id: i64,
    pub date: String,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_goals: Option<i64>,
    pub away_goals: Option<i64>,
}

impl MatchRow {
    pub fn result(&self) -> Option<(i64, i64)> {
        match (self.home_goals, self.away_goals) {
            (Some(h), Some(a)) => Some((h, a)),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.result().is_some()
    }
}

/// Optional per-match stat enrichment. Cards are split by colour in storage;
/// consumers want yellow + red per side.
#[derive(Debug, Clone, Default)]
pub struct MatchStatsRow {
    pub match_id: i64,
    pub home_shots: Option<i64>,
    pub away_shots: Option<i64>,
    pub home_shots_on_target: Option<i64>,
    pub away_shots_on_target: Option<i64>,
    pub home_fouls: Option<i64>,
    pub away_fouls: Option<i64>,
    pub home_yellow_cards: Option<i64>,
    pub away_yellow_cards: Option<i64>,
    pub home_red_cards: Option<i64>,
    pub away_red_cards: Option<i64>,
    pub home_corners: Option<i64>,
    pub away_corners: Option<i64>,
}

impl MatchStatsRow {
    pub fn home_cards(&self) -> Option<i64> {
        sum_cards(self.home_yellow_cards, self.home_red_cards)
    }

    pub fn away_cards(&self) -> Option<i64> {
        sum_cards(self.away_yellow_cards, self.away_red_cards)
    }
}

fn sum_cards(yellow: Option<i64>, red: Option<i64>) -> Option<i64> {
    if yellow.is_none() && red.is_none() {
        return None;
    }
    Some(yellow.unwrap_or(0) + red.unwrap_or(0))
}

/// A finished match joined with its stat line, as consumed by the profile
/// loader.
#[derive(Debug, Clone)]
pub struct MatchWithStats {
    pub match_id: i64,
    pub date: String,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub stats: MatchStatsRow,
}

#[derive(Debug, Clone)]
pub struct LeagueParamsRow {
    pub league_id: i64,
    pub avg_home_goals: f64,
    pub avg_away_goals: f64,
    pub home_field_advantage: f64,
    pub avg_shots: Option<f64>,
    pub avg_shots_on_target: Option<f64>,
    pub avg_corners: Option<f64>,
    pub avg_cards: Option<f64>,
    pub avg_fouls: Option<f64>,
    pub betting_line_shots: Option<f64>,
    pub betting_line_corners: Option<f64>,
    pub betting_line_cards: Option<f64>,
    pub betting_line_fouls: Option<f64>,
    pub sample_size: i64,
    pub last_calculated: String,
}

#[derive(Debug, Clone, Copy)]
pub struct TeamRatingRow {
    pub season_id: i64,
    pub team_id: i64,
    pub atk_home: f64,
    pub def_home: f64,
    pub atk_away: f64,
    pub def_away: f64,
}

#[derive(Debug, Clone)]
pub struct SeasonParamsRow {
    pub season_id: i64,
    pub mu_home: f64,
    pub mu_away: f64,
    pub home_adv: f64,
    pub loss: f64,
    pub updated_at: String,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open sqlite db {}", path.display()))?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
                PRAGMA journal_mode = WAL;
                CREATE TABLE IF NOT EXISTS leagues (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    country TEXT NULL
                );
                CREATE TABLE IF NOT EXISTS seasons (
                    id INTEGER PRIMARY KEY,
                    league_id INTEGER NOT NULL,
                    year_start INTEGER NOT NULL,
                    year_end INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_seasons_league ON seasons(league_id);
                CREATE TABLE IF NOT EXISTS matches (
                    id INTEGER PRIMARY KEY,
                    season_id INTEGER NOT NULL,
                    date TEXT NOT NULL,
                    home_team_id INTEGER NOT NULL,
                    away_team_id INTEGER NOT NULL,
                    home_goals INTEGER NULL,
                    away_goals INTEGER NULL
                );
                CREATE INDEX IF NOT EXISTS idx_matches_season ON matches(season_id);
                CREATE INDEX IF NOT EXISTS idx_matches_date ON matches(date);
                CREATE TABLE IF NOT EXISTS match_stats (
                    match_id INTEGER PRIMARY KEY,
                    home_shots INTEGER NULL,
                    away_shots INTEGER NULL,
                    home_shots_on_target INTEGER NULL,
                    away_shots_on_target INTEGER NULL,
                    home_fouls INTEGER NULL,
                    away_fouls INTEGER NULL,
                    home_yellow_cards INTEGER NULL,
                    away_yellow_cards INTEGER NULL,
                    home_red_cards INTEGER NULL,
                    away_red_cards INTEGER NULL,
                    home_corners INTEGER NULL,
                    away_corners INTEGER NULL
                );
                CREATE TABLE IF NOT EXISTS league_parameters (
                    league_id INTEGER PRIMARY KEY,
                    avg_home_goals REAL NOT NULL,
                    avg_away_goals REAL NOT NULL,
                    home_field_advantage REAL NOT NULL,
                    avg_shots REAL NULL,
                    avg_shots_on_target REAL NULL,
                    avg_corners REAL NULL,
                    avg_cards REAL NULL,
                    avg_fouls REAL NULL,
                    betting_line_shots REAL NULL,
                    betting_line_corners REAL NULL,
                    betting_line_cards REAL NULL,
                    betting_line_fouls REAL NULL,
                    sample_size INTEGER NOT NULL,
                    last_calculated TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS weinston_ratings (
                    season_id INTEGER NOT NULL,
                    team_id INTEGER NOT NULL,
                    atk_home REAL NOT NULL,
                    def_home REAL NOT NULL,
                    atk_away REAL NOT NULL,
                    def_away REAL NOT NULL,
                    PRIMARY KEY (season_id, team_id)
                );
                CREATE TABLE IF NOT EXISTS weinston_params (
                    season_id INTEGER PRIMARY KEY,
                    mu_home REAL NOT NULL,
                    mu_away REAL NOT NULL,
                    home_adv REAL NOT NULL,
                    loss REAL NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS poisson_predictions (
                    match_id INTEGER PRIMARY KEY,
                    expected_home_goals REAL NOT NULL,
                    expected_away_goals REAL NOT NULL,
                    prob_home_win REAL NOT NULL,
                    prob_draw REAL NOT NULL,
                    prob_away_win REAL NOT NULL,
                    over_2 REAL NOT NULL,
                    under_2 REAL NOT NULL,
                    both_score REAL NOT NULL,
                    both_noscore REAL NOT NULL,
                    pick_1x2 TEXT NOT NULL,
                    pick_over TEXT NOT NULL,
                    pick_btts TEXT NOT NULL,
                    min_odds_1 REAL NULL,
                    min_odds_x REAL NULL,
                    min_odds_2 REAL NULL,
                    min_odds_over25 REAL NULL,
                    min_odds_under25 REAL NULL,
                    min_odds_btts_yes REAL NULL,
                    min_odds_btts_no REAL NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS weinston_predictions (
                    match_id INTEGER PRIMARY KEY,
                    expected_home_goals REAL NOT NULL,
                    expected_away_goals REAL NOT NULL,
                    prob_home_win REAL NOT NULL,
                    prob_draw REAL NOT NULL,
                    prob_away_win REAL NOT NULL,
                    over_2 REAL NOT NULL,
                    under_2 REAL NOT NULL,
                    both_score REAL NOT NULL,
                    both_noscore REAL NOT NULL,
                    pick_1x2 TEXT NOT NULL,
                    pick_over TEXT NOT NULL,
                    pick_btts TEXT NOT NULL,
                    shots_home REAL NULL,
                    shots_away REAL NULL,
                    shots_target_home REAL NULL,
                    shots_target_away REAL NULL,
                    fouls_home REAL NULL,
                    fouls_away REAL NULL,
                    cards_home REAL NULL,
                    cards_away REAL NULL,
                    corners_home REAL NULL,
                    corners_away REAL NULL,
                    win_corners TEXT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS prediction_outcomes (
                    match_id INTEGER NOT NULL,
                    model TEXT NOT NULL,
                    pick_1x2 TEXT NULL,
                    hit_1x2 INTEGER NULL,
                    pick_over25 TEXT NULL,
                    hit_over25 INTEGER NULL,
                    pick_btts TEXT NULL,
                    hit_btts INTEGER NULL,
                    abs_err_home_goals REAL NULL,
                    abs_err_away_goals REAL NULL,
                    rmse_goals REAL NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (match_id, model)
                );
                "#,
            )
            .context("create sqlite schema")?;
        Ok(())
    }

    // --- reference data -----------------------------------------------------

    pub fn insert_league(&self, league: &LeagueRow) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO leagues (id, name, country) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, country = excluded.country",
                params![league.id, league.name, league.country],
            )
            .context("upsert league")?;
        Ok(())
    }

    pub fn insert_season(&self, season: &SeasonRow) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO seasons (id, league_id, year_start, year_end)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    league_id = excluded.league_id,
                    year_start = excluded.year_start,
                    year_end = excluded.year_end",
                params![season.id, season.league_id, season.year_start, season.year_end],
            )
            .context("upsert season")?;
        Ok(())
    }

    pub fn upsert_match(&self, m: &MatchRow) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO matches (id, season_id, date, home_team_id, away_team_id, home_goals, away_goals)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    season_id = excluded.season_id,
                    date = excluded.date,
                    home_team_id = excluded.home_team_id,
                    away_team_id = excluded.away_team_id,
                    home_goals = excluded.home_goals,
                    away_goals = excluded.away_goals",
                params![
                    m.id,
                    m.season_id,
                    m.date,
                    m.home_team_id,
                    m.away_team_id,
                    m.home_goals,
                    m.away_goals
                ],
            )
            .context("upsert match")?;
        Ok(())
    }

    pub fn upsert_match_stats(&self, s: &MatchStatsRow) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO match_stats (
                    match_id, home_shots, away_shots,
                    home_shots_on_target, away_shots_on_target,
                    home_fouls, away_fouls,
                    home_yellow_cards, away_yellow_cards,
                    home_red_cards, away_red_cards,
                    home_corners, away_corners
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(match_id) DO UPDATE SET
                    home_shots = excluded.home_shots,
                    away_shots = excluded.away_shots,
                    home_shots_on_target = excluded.home_shots_on_target,
                    away_shots_on_target = excluded.away_shots_on_target,
                    home_fouls = excluded.home_fouls,
                    away_fouls = excluded.away_fouls,
                    home_yellow_cards = excluded.home_yellow_cards,
                    away_yellow_cards = excluded.away_yellow_cards,
                    home_red_cards = excluded.home_red_cards,
                    away_red_cards = excluded.away_red_cards,
                    home_corners = excluded.home_corners,
                    away_corners = excluded.away_corners",
                params![
                    s.match_id,
                    s.home_shots,
                    s.away_shots,
                    s.home_shots_on_target,
                    s.away_shots_on_target,
                    s.home_fouls,
                    s.away_fouls,
                    s.home_yellow_cards,
                    s.away_yellow_cards,
                    s.home_red_cards,
                    s.away_red_cards,
                    s.home_corners,
                    s.away_corners
                ],
            )
            .context("upsert match stats")?;
        Ok(())
    }

    pub fn league(&self, league_id: i64) -> Result<Option<LeagueRow>> {
        self.conn
            .query_row(
                "SELECT id, name, country FROM leagues WHERE id = ?1",
                params![league_id],
                |row| {
                    Ok(LeagueRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        country: row.get(2)?,
                    })
                },
            )
            .map(Some)
            .or_else(ignore_not_found)
            .context("query league")
    }

    pub fn season(&self, season_id: i64) -> Result<Option<SeasonRow>> {
        self.conn
            .query_row(
                "SELECT id, league_id, year_start, year_end FROM seasons WHERE id = ?1",
                params![season_id],
                |row| {
                    Ok(SeasonRow {
                        id: row.get(0)?,
                        league_id: row.get(1)?,
                        year_start: row.get(2)?,
                        year_end: row.get(3)?,
                    })
                },
            )
            .map(Some)
            .or_else(ignore_not_found)
            .context("query season")
    }

    pub fn all_seasons(&self) -> Result<Vec<SeasonRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, league_id, year_start, year_end FROM seasons
                 ORDER BY league_id, year_start, id",
            )
            .context("prepare seasons query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SeasonRow {
                    id: row.get(0)?,
                    league_id: row.get(1)?,
                    year_start: row.get(2)?,
                    year_end: row.get(3)?,
                })
            })
            .context("query seasons")?;
        collect_rows(rows)
    }

    pub fn all_league_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM leagues ORDER BY id")
            .context("prepare league ids query")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .context("query league ids")?;
        collect_rows(rows)
    }

    // --- matches ------------------------------------------------------------

    pub fn finished_season_matches(&self, season_id: i64) -> Result<Vec<MatchRow>> {
        self.load_matches(
            "SELECT id, season_id, date, home_team_id, away_team_id, home_goals, away_goals
             FROM matches
             WHERE season_id = ?1
               AND home_goals IS NOT NULL AND away_goals IS NOT NULL
             ORDER BY date ASC, id ASC",
            params![season_id],
        )
    }

    /// Finished matches of a whole league strictly before `date` (ISO string).
    /// The date bound keeps dynamic league averages free of lookahead.
    pub fn finished_league_matches_before(
        &self,
        league_id: i64,
        date: &str,
    ) -> Result<Vec<MatchRow>> {
        self.load_matches(
            "SELECT m.id, m.season_id, m.date, m.home_team_id, m.away_team_id,
                    m.home_goals, m.away_goals
             FROM matches m
             JOIN seasons s ON s.id = m.season_id
             WHERE s.league_id = ?1
               AND m.home_goals IS NOT NULL AND m.away_goals IS NOT NULL
               AND m.date < ?2
             ORDER BY m.date ASC, m.id ASC",
            params![league_id, date],
        )
    }

    pub fn unplayed_season_matches(&self, season_id: i64) -> Result<Vec<MatchRow>> {
        self.load_matches(
            "SELECT id, season_id, date, home_team_id, away_team_id, home_goals, away_goals
             FROM matches
             WHERE season_id = ?1
               AND (home_goals IS NULL OR away_goals IS NULL)
             ORDER BY date ASC, id ASC",
            params![season_id],
        )
    }

    pub fn matches_by_ids(&self, ids: &[i64]) -> Result<Vec<MatchRow>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let mut rows = self.load_matches(
                "SELECT id, season_id, date, home_team_id, away_team_id, home_goals, away_goals
                 FROM matches WHERE id = ?1",
                params![id],
            )?;
            out.append(&mut rows);
        }
        Ok(out)
    }

    fn load_matches(
        &self,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<MatchRow>> {
        let mut stmt = self.conn.prepare(sql).context("prepare matches query")?;
        let rows = stmt
            .query_map(args, |row| {
                Ok(MatchRow {
                    id: row.get(0)?,
                    season_id: row.get(1)?,
                    date: row.get(2)?,
                    home_team_id: row.get(3)?,
                    away_team_id: row.get(4)?,
                    home_goals: row.get(5)?,
                    away_goals: row.get(6)?,
                })
            })
            .context("query matches")?;
        collect_rows(rows)
    }

    /// Finished matches of a season joined with their stat lines, newest
    /// first. Matches without a stat row are omitted.
    pub fn finished_season_matches_with_stats(
        &self,
        season_id: i64,
    ) -> Result<Vec<MatchWithStats>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT m.id, m.date, m.home_team_id, m.away_team_id,
                        ms.home_shots, ms.away_shots,
                        ms.home_shots_on_target, ms.away_shots_on_target,
                        ms.home_fouls, ms.away_fouls,
                        ms.home_yellow_cards, ms.away_yellow_cards,
                        ms.home_red_cards, ms.away_red_cards,
                        ms.home_corners, ms.away_corners
                 FROM matches m
                 JOIN match_stats ms ON ms.match_id = m.id
                 WHERE m.season_id = ?1
                   AND m.home_goals IS NOT NULL AND m.away_goals IS NOT NULL
                 ORDER BY m.date DESC, m.id DESC",
            )
            .context("prepare stats join query")?;
        let rows = stmt
            .query_map(params![season_id], |row| {
                Ok(MatchWithStats {
                    match_id: row.get(0)?,
                    date: row.get(1)?,
                    home_team_id: row.get(2)?,
                    away_team_id: row.get(3)?,
                    stats: MatchStatsRow {
                        match_id: row.get(0)?,
                        home_shots: row.get(4)?,
                        away_shots: row.get(5)?,
                        home_shots_on_target: row.get(6)?,
                        away_shots_on_target: row.get(7)?,
                        home_fouls: row.get(8)?,
                        away_fouls: row.get(9)?,
                        home_yellow_cards: row.get(10)?,
                        away_yellow_cards: row.get(11)?,
                        home_red_cards: row.get(12)?,
                        away_red_cards: row.get(13)?,
                        home_corners: row.get(14)?,
                        away_corners: row.get(15)?,
                    },
                })
            })
            .context("query stats join")?;
        collect_rows(rows)
    }

    pub fn match_stats_for_league(&self, league_id: i64, before: &str) -> Result<Vec<MatchStatsRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT ms.match_id, ms.home_shots, ms.away_shots,
                        ms.home_shots_on_target, ms.away_shots_on_target,
                        ms.home_fouls, ms.away_fouls,
                        ms.home_yellow_cards, ms.away_yellow_cards,
                        ms.home_red_cards, ms.away_red_cards,
                        ms.home_corners, ms.away_corners
                 FROM match_stats ms
                 JOIN matches m ON m.id = ms.match_id
                 JOIN seasons s ON s.id = m.season_id
                 WHERE s.league_id = ?1
                   AND m.home_goals IS NOT NULL AND m.away_goals IS NOT NULL
                   AND m.date < ?2",
            )
            .context("prepare league stats query")?;
        let rows = stmt
            .query_map(params![league_id, before], |row| {
                Ok(MatchStatsRow {
                    match_id: row.get(0)?,
                    home_shots: row.get(1)?,
                    away_shots: row.get(2)?,
                    home_shots_on_target: row.get(3)?,
                    away_shots_on_target: row.get(4)?,
                    home_fouls: row.get(5)?,
                    away_fouls: row.get(6)?,
                    home_yellow_cards: row.get(7)?,
                    away_yellow_cards: row.get(8)?,
                    home_red_cards: row.get(9)?,
                    away_red_cards: row.get(10)?,
                    home_corners: row.get(11)?,
                    away_corners: row.get(12)?,
                })
            })
            .context("query league stats")?;
        collect_rows(rows)
    }

    // --- fitted parameters --------------------------------------------------

    pub fn season_params(&self, season_id: i64) -> Result<Option<SeasonParamsRow>> {
        self.conn
            .query_row(
                "SELECT season_id, mu_home, mu_away, home_adv, loss, updated_at
                 FROM weinston_params WHERE season_id = ?1",
                params![season_id],
                |row| {
                    Ok(SeasonParamsRow {
                        season_id: row.get(0)?,
                        mu_home: row.get(1)?,
                        mu_away: row.get(2)?,
                        home_adv: row.get(3)?,
                        loss: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                },
            )
            .map(Some)
            .or_else(ignore_not_found)
            .context("query season params")
    }

    pub fn league_params(&self, league_id: i64) -> Result<Option<LeagueParamsRow>> {
        self.conn
            .query_row(
                "SELECT league_id, avg_home_goals, avg_away_goals, home_field_advantage,
                        avg_shots, avg_shots_on_target, avg_corners, avg_cards, avg_fouls,
                        betting_line_shots, betting_line_corners, betting_line_cards,
                        betting_line_fouls, sample_size, last_calculated
                 FROM league_parameters WHERE league_id = ?1",
                params![league_id],
                |row| {
                    Ok(LeagueParamsRow {
                        league_id: row.get(0)?,
                        avg_home_goals: row.get(1)?,
                        avg_away_goals: row.get(2)?,
                        home_field_advantage: row.get(3)?,
                        avg_shots: row.get(4)?,
                        avg_shots_on_target: row.get(5)?,
                        avg_corners: row.get(6)?,
                        avg_cards: row.get(7)?,
                        avg_fouls: row.get(8)?,
                        betting_line_shots: row.get(9)?,
                        betting_line_corners: row.get(10)?,
                        betting_line_cards: row.get(11)?,
                        betting_line_fouls: row.get(12)?,
                        sample_size: row.get(13)?,
                        last_calculated: row.get(14)?,
                    })
                },
            )
            .map(Some)
            .or_else(ignore_not_found)
            .context("query league parameters")
    }

    pub fn upsert_league_params(&self, p: &LeagueParamsRow) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO league_parameters (
                    league_id, avg_home_goals, avg_away_goals, home_field_advantage,
                    avg_shots, avg_shots_on_target, avg_corners, avg_cards, avg_fouls,
                    betting_line_shots, betting_line_corners, betting_line_cards,
                    betting_line_fouls, sample_size, last_calculated
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                 ON CONFLICT(league_id) DO UPDATE SET
                    avg_home_goals = excluded.avg_home_goals,
                    avg_away_goals = excluded.avg_away_goals,
                    home_field_advantage = excluded.home_field_advantage,
                    avg_shots = excluded.avg_shots,
                    avg_shots_on_target = excluded.avg_shots_on_target,
                    avg_corners = excluded.avg_corners,
                    avg_cards = excluded.avg_cards,
                    avg_fouls = excluded.avg_fouls,
                    betting_line_shots = excluded.betting_line_shots,
                    betting_line_corners = excluded.betting_line_corners,
                    betting_line_cards = excluded.betting_line_cards,
                    betting_line_fouls = excluded.betting_line_fouls,
                    sample_size = excluded.sample_size,
                    last_calculated = excluded.last_calculated",
                params![
                    p.league_id,
                    p.avg_home_goals,
                    p.avg_away_goals,
                    p.home_field_advantage,
                    p.avg_shots,
                    p.avg_shots_on_target,
                    p.avg_corners,
                    p.avg_cards,
                    p.avg_fouls,
                    p.betting_line_shots,
                    p.betting_line_corners,
                    p.betting_line_cards,
                    p.betting_line_fouls,
                    p.sample_size,
                    p.last_calculated
                ],
            )
            .context("upsert league parameters")?;
        Ok(())
    }

    pub fn season_ratings(&self, season_id: i64) -> Result<HashMap<i64, TeamRatingRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT season_id, team_id, atk_home, def_home, atk_away, def_away
                 FROM weinston_ratings WHERE season_id = ?1",
            )
            .context("prepare ratings query")?;
        let rows = stmt
            .query_map(params![season_id], |row| {
                Ok(TeamRatingRow {
                    season_id: row.get(0)?,
                    team_id: row.get(1)?,
                    atk_home: row.get(2)?,
                    def_home: row.get(3)?,
                    atk_away: row.get(4)?,
                    def_away: row.get(5)?,
                })
            })
            .context("query ratings")?;
        let mut out = HashMap::new();
        for row in rows {
            let r = row.context("decode rating row")?;
            out.insert(r.team_id, r);
        }
        Ok(out)
    }

    /// Persist a fit: prior ratings for the season are fully replaced and the
    /// season parameters upserted, all in one transaction. No partial merge.
    pub fn replace_season_ratings(&mut self, season_id: i64, fit: &FitResult) -> Result<()> {
        let tx = self.conn.transaction().context("begin ratings transaction")?;
        tx.execute(
            "DELETE FROM weinston_ratings WHERE season_id = ?1",
            params![season_id],
        )
        .context("clear prior ratings")?;
        for (i, team_id) in fit.team_ids.iter().enumerate() {
            tx.execute(
                "INSERT INTO weinston_ratings
                    (season_id, team_id, atk_home, def_home, atk_away, def_away)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    season_id,
                    team_id,
                    fit.atk_home[i],
                    fit.def_home[i],
                    fit.atk_away[i],
                    fit.def_away[i]
                ],
            )
            .context("insert rating")?;
        }
        tx.execute(
            "INSERT INTO weinston_params (season_id, mu_home, mu_away, home_adv, loss, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(season_id) DO UPDATE SET
                mu_home = excluded.mu_home,
                mu_away = excluded.mu_away,
                home_adv = excluded.home_adv,
                loss = excluded.loss,
                updated_at = excluded.updated_at",
            params![
                season_id,
                fit.mu_home,
                fit.mu_away,
                fit.home_adv,
                fit.loss,
                Utc::now().to_rfc3339()
            ],
        )
        .context("upsert season params")?;
        tx.commit().context("commit ratings transaction")?;
        Ok(())
    }

    // --- predictions --------------------------------------------------------

    pub fn upsert_poisson_prediction(&self, p: &PoissonPredictionRow) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO poisson_predictions (
                    match_id, expected_home_goals, expected_away_goals,
                    prob_home_win, prob_draw, prob_away_win,
                    over_2, under_2, both_score, both_noscore,
                    pick_1x2, pick_over, pick_btts,
                    min_odds_1, min_odds_x, min_odds_2,
                    min_odds_over25, min_odds_under25, min_odds_btts_yes, min_odds_btts_no,
                    updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                           ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)
                 ON CONFLICT(match_id) DO UPDATE SET
                    expected_home_goals = excluded.expected_home_goals,
                    expected_away_goals = excluded.expected_away_goals,
                    prob_home_win = excluded.prob_home_win,
                    prob_draw = excluded.prob_draw,
                    prob_away_win = excluded.prob_away_win,
                    over_2 = excluded.over_2,
                    under_2 = excluded.under_2,
                    both_score = excluded.both_score,
                    both_noscore = excluded.both_noscore,
                    pick_1x2 = excluded.pick_1x2,
                    pick_over = excluded.pick_over,
                    pick_btts = excluded.pick_btts,
                    min_odds_1 = excluded.min_odds_1,
                    min_odds_x = excluded.min_odds_x,
                    min_odds_2 = excluded.min_odds_2,
                    min_odds_over25 = excluded.min_odds_over25,
                    min_odds_under25 = excluded.min_odds_under25,
                    min_odds_btts_yes = excluded.min_odds_btts_yes,
                    min_odds_btts_no = excluded.min_odds_btts_no,
                    updated_at = excluded.updated_at",
                params![
                    p.match_id,
                    p.expected_home_goals,
                    p.expected_away_goals,
                    p.probs.p_home,
                    p.probs.p_draw,
                    p.probs.p_away,
                    p.probs.p_over,
                    p.probs.p_under,
                    p.probs.p_btts_yes,
                    p.probs.p_btts_no,
                    p.pick_1x2.as_str(),
                    p.pick_over,
                    p.pick_btts,
                    p.min_odds_1,
                    p.min_odds_x,
                    p.min_odds_2,
                    p.min_odds_over25,
                    p.min_odds_under25,
                    p.min_odds_btts_yes,
                    p.min_odds_btts_no,
                    Utc::now().to_rfc3339()
                ],
            )
            .context("upsert poisson prediction")?;
        Ok(())
    }

    pub fn upsert_weinston_prediction(&self, p: &WeinstonPredictionRow) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO weinston_predictions (
                    match_id, expected_home_goals, expected_away_goals,
                    prob_home_win, prob_draw, prob_away_win,
                    over_2, under_2, both_score, both_noscore,
                    pick_1x2, pick_over, pick_btts,
                    shots_home, shots_away, shots_target_home, shots_target_away,
                    fouls_home, fouls_away, cards_home, cards_away,
                    corners_home, corners_away, win_corners, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                           ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)
                 ON CONFLICT(match_id) DO UPDATE SET
                    expected_home_goals = excluded.expected_home_goals,
                    expected_away_goals = excluded.expected_away_goals,
                    prob_home_win = excluded.prob_home_win,
                    prob_draw = excluded.prob_draw,
                    prob_away_win = excluded.prob_away_win,
                    over_2 = excluded.over_2,
                    under_2 = excluded.under_2,
                    both_score = excluded.both_score,
                    both_noscore = excluded.both_noscore,
                    pick_1x2 = excluded.pick_1x2,
                    pick_over = excluded.pick_over,
                    pick_btts = excluded.pick_btts,
                    shots_home = excluded.shots_home,
                    shots_away = excluded.shots_away,
                    shots_target_home = excluded.shots_target_home,
                    shots_target_away = excluded.shots_target_away,
                    fouls_home = excluded.fouls_home,
                    fouls_away = excluded.fouls_away,
                    cards_home = excluded.cards_home,
                    cards_away = excluded.cards_away,
                    corners_home = excluded.corners_home,
                    corners_away = excluded.corners_away,
                    win_corners = excluded.win_corners,
                    updated_at = excluded.updated_at",
                params![
                    p.match_id,
                    p.expected_home_goals,
                    p.expected_away_goals,
                    p.probs.p_home,
                    p.probs.p_draw,
                    p.probs.p_away,
                    p.probs.p_over,
                    p.probs.p_under,
                    p.probs.p_btts_yes,
                    p.probs.p_btts_no,
                    p.pick_1x2.as_str(),
                    p.pick_over,
                    p.pick_btts,
                    p.stats.as_ref().map(|s| s.shots_home),
                    p.stats.as_ref().map(|s| s.shots_away),
                    p.stats.as_ref().map(|s| s.shots_target_home),
                    p.stats.as_ref().map(|s| s.shots_target_away),
                    p.stats.as_ref().map(|s| s.fouls_home),
                    p.stats.as_ref().map(|s| s.fouls_away),
                    p.stats.as_ref().map(|s| s.cards_home),
                    p.stats.as_ref().map(|s| s.cards_away),
                    p.stats.as_ref().map(|s| s.corners_home),
                    p.stats.as_ref().map(|s| s.corners_away),
                    p.stats.as_ref().map(|s| s.win_corners.as_str()),
                    Utc::now().to_rfc3339()
                ],
            )
            .context("upsert weinston prediction")?;
        Ok(())
    }

    pub fn poisson_predictions_for_season(
        &self,
        season_id: i64,
    ) -> Result<HashMap<i64, PoissonPredictionRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT p.match_id, p.expected_home_goals, p.expected_away_goals,
                        p.prob_home_win, p.prob_draw, p.prob_away_win,
                        p.over_2, p.under_2, p.both_score, p.both_noscore,
                        p.pick_1x2, p.pick_over, p.pick_btts,
                        p.min_odds_1, p.min_odds_x, p.min_odds_2,
                        p.min_odds_over25, p.min_odds_under25,
                        p.min_odds_btts_yes, p.min_odds_btts_no
                 FROM poisson_predictions p
                 JOIN matches m ON m.id = p.match_id
                 WHERE m.season_id = ?1",
            )
            .context("prepare poisson predictions query")?;
        let rows = stmt
            .query_map(params![season_id], PoissonPredictionRow::from_sql_row)
            .context("query poisson predictions")?;
        let mut out = HashMap::new();
        for row in rows {
            let r = row.context("decode poisson prediction")?;
            out.insert(r.match_id, r);
        }
        Ok(out)
    }

    pub fn weinston_predictions_for_season(
        &self,
        season_id: i64,
    ) -> Result<HashMap<i64, WeinstonPredictionRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT p.match_id, p.expected_home_goals, p.expected_away_goals,
                        p.prob_home_win, p.prob_draw, p.prob_away_win,
                        p.over_2, p.under_2, p.both_score, p.both_noscore,
                        p.pick_1x2, p.pick_over, p.pick_btts,
                        p.shots_home, p.shots_away, p.shots_target_home, p.shots_target_away,
                        p.fouls_home, p.fouls_away, p.cards_home, p.cards_away,
                        p.corners_home, p.corners_away, p.win_corners
                 FROM weinston_predictions p
                 JOIN matches m ON m.id = p.match_id
                 WHERE m.season_id = ?1",
            )
            .context("prepare weinston predictions query")?;
        let rows = stmt
            .query_map(params![season_id], WeinstonPredictionRow::from_sql_row)
            .context("query weinston predictions")?;
        let mut out = HashMap::new();
        for row in rows {
            let r = row.context("decode weinston prediction")?;
            out.insert(r.match_id, r);
        }
        Ok(out)
    }

    // --- outcomes -----------------------------------------------------------

    pub fn upsert_outcome(&self, o: &OutcomeRow) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO prediction_outcomes (
                    match_id, model,
                    pick_1x2, hit_1x2, pick_over25, hit_over25, pick_btts, hit_btts,
                    abs_err_home_goals, abs_err_away_goals, rmse_goals, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(match_id, model) DO UPDATE SET
                    pick_1x2 = excluded.pick_1x2,
                    hit_1x2 = excluded.hit_1x2,
                    pick_over25 = excluded.pick_over25,
                    hit_over25 = excluded.hit_over25,
                    pick_btts = excluded.pick_btts,
                    hit_btts = excluded.hit_btts,
                    abs_err_home_goals = excluded.abs_err_home_goals,
                    abs_err_away_goals = excluded.abs_err_away_goals,
                    rmse_goals = excluded.rmse_goals,
                    updated_at = excluded.updated_at",
                params![
                    o.match_id,
                    o.model.as_str(),
                    o.pick_1x2,
                    o.hit_1x2,
                    o.pick_over25,
                    o.hit_over25,
                    o.pick_btts,
                    o.hit_btts,
                    o.abs_err_home_goals,
                    o.abs_err_away_goals,
                    o.rmse_goals,
                    Utc::now().to_rfc3339()
                ],
            )
            .context("upsert prediction outcome")?;
        Ok(())
    }

    pub fn outcomes_for_season(
        &self,
        season_id: i64,
        date_from: Option<&str>,
        date_to: Option<&str>,
    ) -> Result<Vec<OutcomeRow>> {
        let mut sql = String::from(
            "SELECT o.match_id, o.model,
                    o.pick_1x2, o.hit_1x2, o.pick_over25, o.hit_over25,
                    o.pick_btts, o.hit_btts,
                    o.abs_err_home_goals, o.abs_err_away_goals, o.rmse_goals
             FROM prediction_outcomes o
             JOIN matches m ON m.id = o.match_id
             WHERE m.season_id = ?1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(season_id)];
        if let Some(from) = date_from {
            sql.push_str(&format!(" AND m.date >= ?{}", args.len() + 1));
            args.push(Box::new(from.to_string()));
        }
        if let Some(to) = date_to {
            sql.push_str(&format!(" AND m.date <= ?{}", args.len() + 1));
            args.push(Box::new(to.to_string()));
        }
        sql.push_str(" ORDER BY m.date, o.match_id, o.model");

        let mut stmt = self.conn.prepare(&sql).context("prepare outcomes query")?;
        let rows = stmt
            .query_map(
                rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
                OutcomeRow::from_sql_row,
            )
            .context("query outcomes")?;
        collect_rows(rows)
    }
}

fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode row")?);
    }
    Ok(out)
}

fn ignore_not_found<T>(err: rusqlite::Error) -> rusqlite::Result<Option<T>> {
    match err {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other),
    }
}

/// Today's date as the ISO string used in lookahead-free queries.
pub fn today() -> String {
    Utc::now().date_naive().to_string()
}
