mod error;
mod generation;
mod handlers;
mod router;
mod types;

pub use router::handle_request;
pub use types::{AppState, Request};
pub use handlers::core::open_workspace;
