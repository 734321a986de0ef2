//! Per-user document sessions.

pub mod controller;
pub mod store;
pub mod types;

pub use controller::{
    AskOutcome, ClearOutcome, DocumentPolicy, ResetOutcome, SessionController, SessionError,
    UploadOutcome, ValidationError,
};
pub use store::{SessionSlot, SessionStore};
pub use types::{Session, Turn, TurnRole};
