pub mod aggregation;
pub mod alerts;
pub mod health;
pub mod service;

pub use aggregation::{compute_aggregation, compute_signal_light, Aggregation, SignalThresholds};
pub use alerts::{compute_alerts, Alert};
pub use health::{get_collector_health, CollectorHealth};
pub use service::{CollectRunOutcome, TrendService};
