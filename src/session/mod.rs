pub mod controller;
pub mod player;
pub mod projector;
pub mod runtime;
pub mod simulation;

pub use projector::RenderState;
pub use runtime::{spawn_session, SessionError, SessionHandle};
