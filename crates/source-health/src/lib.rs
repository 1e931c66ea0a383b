pub mod confidence;
pub mod service;
pub mod status;

pub use confidence::{ConfidenceOut, ConfidenceService, KEY_INDICATORS, TOTAL_INDICATORS};
pub use service::{
    CoverageCell, CoverageMatrixRow, HealthService, SourceHealthSummary,
};
pub use status::compute_source_status;
