pub mod config;
pub mod error;
pub mod pacing;
pub mod traits;
pub mod types;

pub use config::Settings;
pub use error::SignalError;
pub use pacing::{CircuitBreaker, RateLimiter};
pub use traits::{RetryingCollector, TrendCollector};
pub use types::*;
