//! Voice call sessions: live state shared with frontends and the
//! controller task that keeps it in sync with the backend.

mod controller;
mod state;

pub use controller::CallController;
pub use state::CallState;
