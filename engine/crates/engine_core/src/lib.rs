pub mod ai;
pub mod command;
pub mod entity;
pub mod events;
pub mod scene;
pub mod sync;
pub mod tick;

pub use ai::{AiMode, AiMover, MoverConfig, PathFollower};
pub use command::SceneCommand;
pub use entity::{EntityRecord, SceneEntity};
pub use events::{EntitySnapshot, Outbound, Outbox, Recipient, ServerEvent};
pub use scene::{Scene, SceneConfig, SceneError, SceneWorld};
pub use sync::{PositionSync, PositionSyncLink};
pub use tick::{SceneActor, TickConfig};
