use handle::EntityHandle;
use serde::{Deserialize, Serialize};
use space::TilePos;
use tokio::sync::mpsc;

/// Authoritative position pushed to the player-data service after a role
/// finishes a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSync {
    pub handle: EntityHandle,
    pub scene_id: u32,
    pub pos: TilePos,
}

pub type PositionSyncTx = mpsc::UnboundedSender<PositionSync>;
pub type PositionSyncRx = mpsc::UnboundedReceiver<PositionSync>;

/// Fire-and-forget link from the tick thread. Sends never block and a
/// failed send is only logged; the local move stays applied.
#[derive(Debug, Clone, Default)]
pub struct PositionSyncLink {
    tx: Option<PositionSyncTx>,
}

impl PositionSyncLink {
    pub fn new(tx: PositionSyncTx) -> Self {
        Self { tx: Some(tx) }
    }

    /// A link with no consumer. Every send is dropped silently.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn channel() -> (Self, PositionSyncRx) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn is_connected(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Returns whether the message was handed to the consumer.
    pub fn send(&self, sync: PositionSync) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.send(sync) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    entity = %sync.handle,
                    scene = sync.scene_id,
                    error = %e,
                    "position sync dropped"
                );
                false
            }
        }
    }
}
