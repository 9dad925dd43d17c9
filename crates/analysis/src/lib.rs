pub mod factors;
pub mod insights;
pub mod reputation;
pub mod scorer;
pub mod signals;

pub use factors::{concentration_factor, top_shares, Share, OTHERS_BUCKET};
pub use insights::{InsightQuery, InsightService, PrRatio, Summary};
pub use reputation::{RefreshSummary, ReputationError, ReputationReport, ReputationService};
pub use scorer::{compute_score, CategoryScore, ScoreOutcome};
pub use signals::Signals;
