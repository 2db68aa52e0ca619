mod handler;
pub mod model;

pub use handler::{
    add_event_image, create_event, delete_attendance, delete_event, get_event, list_attendees,
    list_events, list_group_events, request_attendance, update_attendance, update_event,
};
