use std::path::PathBuf;

/// Everything the engines need from the environment, resolved once at startup
/// and passed down explicitly. Ranges are clamped so a stray env var cannot
/// push the grid or thresholds somewhere meaningless.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub db_path: PathBuf,
    /// Goal grid truncation point (per side).
    pub goal_cap: usize,
    /// Over/under line, compared with strict `>` on total goals.
    pub over_under_threshold: u32,
    /// Probability needed before an over/BTTS pick flips to the "yes" side.
    pub pick_threshold: f64,
    /// Recent matches per team/venue used for form and stat profiles.
    pub n_recent: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("scoreline.sqlite"),
            goal_cap: 12,
            over_under_threshold: 2,
            pick_threshold: 0.5,
            n_recent: 20,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: std::env::var("SCORELINE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            goal_cap: env_parse("SCORELINE_GOAL_CAP", defaults.goal_cap).clamp(4, 30),
            over_under_threshold: env_parse(
                "SCORELINE_OVER_UNDER_THRESHOLD",
                defaults.over_under_threshold,
            )
            .clamp(1, 8),
            pick_threshold: env_parse("SCORELINE_PICK_THRESHOLD", defaults.pick_threshold)
                .clamp(0.0, 1.0),
            n_recent: env_parse("SCORELINE_N_RECENT", defaults.n_recent).clamp(1, 200),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|val| val.parse::<T>().ok())
        .unwrap_or(fallback)
}

/// Load `.env.local` then `.env`, ignoring missing files.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.goal_cap, 12);
        assert_eq!(cfg.over_under_threshold, 2);
        assert!((cfg.pick_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(cfg.n_recent, 20);
    }
}
