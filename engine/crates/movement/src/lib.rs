pub mod config;
pub mod error;
pub mod validator;

pub use config::MoveConfig;
pub use error::MoveReject;
pub use validator::{EndMove, MoveAccepted, MoveHost, MoveState, MovementValidator, StartMove, UpdateMove};
