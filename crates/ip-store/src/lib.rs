pub mod db;
pub mod models;

pub use db::RadarDb;
pub use models::*;

/// Fresh text id for new rows.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
