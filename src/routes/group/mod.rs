mod handler;
pub mod model;

pub use handler::{
    add_group_image, create_group, delete_group, delete_membership, get_group, list_current_user_groups,
    list_groups, list_members, request_membership, update_group, update_membership,
};
