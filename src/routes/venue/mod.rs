mod handler;
pub mod model;

pub use handler::{create_venue, list_group_venues, update_venue};
