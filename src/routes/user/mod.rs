mod handler;
pub mod model;

pub use handler::{current_user, login, register};
