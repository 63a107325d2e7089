//! Kiosk "totem" Q&A: HTTP backend access, predefined question menus, and
//! the session controller that ties them to the transcript and playback.

mod api;
mod controller;
mod questions;

pub use api::{AnswerResponse, QaBackend, TotemApi};
pub use controller::{KioskConfig, KioskController, KioskState};
pub use questions::PredefinedQuestion;
