pub mod core;
pub mod models;

pub use self::core::{Completion, Session, SessionBuilder, SessionState};
pub use models::Transcript;
