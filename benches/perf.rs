use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use scoreline::prob_grid::{DEFAULT_GOAL_CAP, DEFAULT_OVER_UNDER_THRESHOLD, aggregate_probs};
use scoreline::store::MatchRow;
use scoreline::weinston_fit::fit_weinston;

fn synthetic_season(teams: i64, rounds: i64) -> Vec<MatchRow> {
    let mut out = Vec::new();
    let mut id = 0i64;
    for round in 0..rounds {
        for home in 0..teams {
            for away in 0..teams {
                if home == away {
                    continue;
                }
                id += 1;
                // Deterministic pseudo-scores spread across 0..4.
                let hg = (home * 7 + away * 3 + round) % 4;
                let ag = (away * 5 + home * 2 + round) % 3;
                out.push(MatchRow {
                    id,
                    season_id: 1,
                    date: format!("2024-{:02}-{:02}", (round % 9) + 1, (id % 27) + 1),
                    home_team_id: 100 + home,
                    away_team_id: 100 + away,
                    home_goals: Some(hg),
                    away_goals: Some(ag),
                });
            }
        }
    }
    out
}

fn bench_aggregate_probs(c: &mut Criterion) {
    c.bench_function("aggregate_probs", |b| {
        b.iter(|| {
            let p = aggregate_probs(
                black_box(1.7),
                black_box(1.2),
                DEFAULT_GOAL_CAP,
                DEFAULT_OVER_UNDER_THRESHOLD,
            );
            black_box(p.p_home);
        })
    });
}

fn bench_weinston_fit(c: &mut Criterion) {
    let matches = synthetic_season(10, 2);
    c.bench_function("weinston_fit_10_teams", |b| {
        b.iter(|| {
            let fit = fit_weinston(1, black_box(&matches)).unwrap();
            black_box(fit.loss);
        })
    });
}

criterion_group!(perf, bench_aggregate_probs, bench_weinston_fit);
criterion_main!(perf);
