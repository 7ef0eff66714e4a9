use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use scoreline::prob_grid::{DEFAULT_GOAL_CAP, DEFAULT_OVER_UNDER_THRESHOLD, aggregate_probs};

#[test]
fn partitions_close_over_random_lambda_pairs() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..500 {
        let lambda_home: f64 = rng.gen_range(0.0..6.0);
        let lambda_away: f64 = rng.gen_range(0.0..6.0);
        let p = aggregate_probs(
            lambda_home,
            lambda_away,
            DEFAULT_GOAL_CAP,
            DEFAULT_OVER_UNDER_THRESHOLD,
        );

        assert!(
            (p.p_home + p.p_draw + p.p_away - 1.0).abs() < 1e-6,
            "1x2 drift at ({lambda_home}, {lambda_away})"
        );
        assert!(
            (p.p_over + p.p_under - 1.0).abs() < 1e-6,
            "over/under drift at ({lambda_home}, {lambda_away})"
        );
        assert!(
            (p.p_btts_yes + p.p_btts_no - 1.0).abs() < 1e-6,
            "btts drift at ({lambda_home}, {lambda_away})"
        );
        for prob in [p.p_home, p.p_draw, p.p_away, p.p_over, p.p_under, p.p_btts_yes, p.p_btts_no] {
            assert!((-1e-12..=1.0 + 1e-9).contains(&prob));
        }
    }
}

#[test]
fn home_win_probability_is_weakly_monotonic_in_home_lambda() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..200 {
        let lambda_home: f64 = rng.gen_range(0.0..4.0);
        let lambda_away: f64 = rng.gen_range(0.0..4.0);
        let bump: f64 = rng.gen_range(0.01..1.0);

        let base = aggregate_probs(
            lambda_home,
            lambda_away,
            DEFAULT_GOAL_CAP,
            DEFAULT_OVER_UNDER_THRESHOLD,
        );
        let bumped = aggregate_probs(
            lambda_home + bump,
            lambda_away,
            DEFAULT_GOAL_CAP,
            DEFAULT_OVER_UNDER_THRESHOLD,
        );

        assert!(
            bumped.p_home >= base.p_home - 1e-9,
            "p_home fell from {} to {} when lambda_home rose {} -> {}",
            base.p_home,
            bumped.p_home,
            lambda_home,
            lambda_home + bump
        );
    }
}
