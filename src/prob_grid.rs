//! Truncated Poisson goal grid shared by both prediction models.

pub const DEFAULT_GOAL_CAP: usize = 12;
pub const DEFAULT_OVER_UNDER_THRESHOLD: u32 = 2;

/// Outcome probabilities aggregated from one home/away lambda pair.
/// Each partition (1X2, over/under, BTTS) sums to 1 up to float drift.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutcomeProbs {
    pub p_home: f64,
    pub p_draw: f64,
    pub p_away: f64,
    pub p_over: f64,
    pub p_under: f64,
    pub p_btts_yes: f64,
    pub p_btts_no: f64,
}

/// Poisson pmf over 0..=cap with the tail mass folded into the last bucket so
/// the vector sums to exactly 1 (truncating instead would bias every market
/// toward low scores). A non-positive lambda collapses to a point mass at 0.
pub fn poisson_mass(lambda: f64, cap: usize) -> Vec<f64> {
    let lambda = lambda.max(0.0);
    let mut out = vec![0.0; cap + 1];
    out[0] = (-lambda).exp();
    for k in 1..=cap {
        out[k] = out[k - 1] * lambda / k as f64;
    }
    let sum: f64 = out.iter().sum();
    if sum < 1.0 {
        out[cap] += 1.0 - sum;
    }
    out
}

/// Sum the outer-product grid of two goal distributions into the three
/// markets. `over_under_threshold` is compared with strict `>` on total
/// goals, the same rule evaluation applies to realized results.
pub fn aggregate_probs(
    lambda_home: f64,
    lambda_away: f64,
    goal_cap: usize,
    over_under_threshold: u32,
) -> OutcomeProbs {
    let pmf_h = poisson_mass(lambda_home, goal_cap);
    let pmf_a = poisson_mass(lambda_away, goal_cap);

    let mut p_home = 0.0;
    let mut p_draw = 0.0;
    let mut p_away = 0.0;
    let mut p_over = 0.0;
    let mut p_btts = 0.0;

    for (i, ph) in pmf_h.iter().enumerate() {
        for (j, pa) in pmf_a.iter().enumerate() {
            let p = ph * pa;
            if i > j {
                p_home += p;
            } else if i == j {
                p_draw += p;
            } else {
                p_away += p;
            }
            if (i + j) as u32 > over_under_threshold {
                p_over += p;
            }
            if i >= 1 && j >= 1 {
                p_btts += p;
            }
        }
    }

    OutcomeProbs {
        p_home,
        p_draw,
        p_away,
        p_over,
        p_under: (1.0 - p_over).max(0.0),
        p_btts_yes: p_btts,
        p_btts_no: (1.0 - p_btts).max(0.0),
    }
}
