pub mod event;
pub mod group;
pub mod user;
pub mod venue;

#[derive(Debug, serde::Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
