pub mod indicators;
pub mod scorer;
pub mod service;

pub use indicators::{
    compute_search_momentum, compute_timing_window, is_valid_input_key, manual_score,
    IndicatorResult, IndicatorStatus, INDICATOR_DEFS,
};
pub use scorer::{compute_coverage, compute_opportunity_score, generate_explanations, DimensionScores, ScoreBreakdown};
pub use service::{OpportunityResponse, OpportunityService};
