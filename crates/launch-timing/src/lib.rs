//! Launch-timing engine: scores every week inside the licence window and
//! recommends a launch week plus two backups, with operational milestones
//! worked backwards from the pick.

pub mod grid;
pub mod service;

pub use grid::{
    compute_demand_at_week, compute_event_boost, compute_operational_risk, compute_saturation,
};
pub use service::{LaunchPlanResponse, LaunchService, LaunchWeekScore, Milestone};
