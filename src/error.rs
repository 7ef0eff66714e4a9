use thiserror::Error;

/// Core model errors. Storage-level failures stay `anyhow`; these are the two
/// cases orchestration code needs to tell apart: a broken setup (fatal, no
/// retry) versus a season that simply cannot be fitted (skip and continue).
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("season {0} does not exist or has no league assigned")]
    UnknownSeason(i64),

    #[error("season {season_id}: insufficient data ({detail})")]
    InsufficientData { season_id: i64, detail: String },
}
