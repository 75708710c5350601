mod admin;
mod middleware;
mod public;

pub use admin::{AdminState, build_admin_router};
pub use public::{HEADER_PRIVILEGED, HEADER_USER, HttpState, build_router};
