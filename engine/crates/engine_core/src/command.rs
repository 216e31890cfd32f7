use handle::EntityHandle;
use movement::{EndMove, StartMove, UpdateMove};
use tokio::sync::mpsc;

use crate::ai::AiMover;
use crate::events::Outbound;

/// Messages into a scene's mailbox. Applied in arrival order on the tick
/// thread.
#[derive(Debug)]
pub enum SceneCommand<E> {
    /// Entity enters the scene at its current position.
    Join(E),
    Leave(EntityHandle),
    StartMove { handle: EntityHandle, req: StartMove },
    UpdateMove { handle: EntityHandle, req: UpdateMove },
    EndMove { handle: EntityHandle, req: EndMove },
    /// Hand a server-driven mover to the scene. Dropped when its entity leaves.
    AttachMover(AiMover),
}

impl<E> SceneCommand<E> {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::Leave(_) => "leave",
            Self::StartMove { .. } => "start_move",
            Self::UpdateMove { .. } => "update_move",
            Self::EndMove { .. } => "end_move",
            Self::AttachMover(_) => "attach_mover",
        }
    }
}

/// Sender into a scene actor's mailbox.
pub type SceneTx<E> = mpsc::UnboundedSender<SceneCommand<E>>;
/// Mailbox drained by the scene actor each tick.
pub type SceneRx<E> = mpsc::UnboundedReceiver<SceneCommand<E>>;

/// Sender from the tick thread to the output router, one batch per tick.
pub type OutboundTx = mpsc::UnboundedSender<Vec<Outbound>>;
pub type OutboundRx = mpsc::UnboundedReceiver<Vec<Outbound>>;

#[cfg(test)]
mod tests {
    use handle::EntityKind;
    use space::TilePos;

    use super::*;
    use crate::entity::EntityRecord;

    #[tokio::test]
    async fn mailbox_preserves_order() {
        let (tx, mut rx) = mpsc::unbounded_channel::<SceneCommand<EntityRecord>>();
        let h = EntityHandle::new(EntityKind::Role, 0, 1);

        tx.send(SceneCommand::Join(EntityRecord::new(h, "a", TilePos::new(1, 1), 5)))
            .unwrap();
        tx.send(SceneCommand::EndMove {
            handle: h,
            req: EndMove {
                seq: 1,
                pos: TilePos::new(1, 1),
            },
        })
        .unwrap();
        tx.send(SceneCommand::Leave(h)).unwrap();

        let labels: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|c| c.label())
            .collect();
        assert_eq!(labels, vec!["join", "end_move", "leave"]);
    }
}
