use std::collections::HashMap;

use engine_core::command::OutboundRx;
use engine_core::{Outbound, Recipient, ServerEvent};
use handle::EntityHandle;
use serde_json::json;
use space::{TilePos, TileTransform};
use tokio::sync::mpsc;

/// Per-client write channel (output router -> connection task).
pub type ClientWriteTx = mpsc::UnboundedSender<String>;
pub type ClientWriteRx = mpsc::UnboundedReceiver<String>;

/// Registration message for the output router.
#[derive(Debug)]
pub struct RegisterClient {
    pub handle: EntityHandle,
    pub write_tx: ClientWriteTx,
}

pub type RegisterTx = mpsc::UnboundedSender<RegisterClient>;
pub type RegisterRx = mpsc::UnboundedReceiver<RegisterClient>;

pub type UnregisterTx = mpsc::UnboundedSender<EntityHandle>;
pub type UnregisterRx = mpsc::UnboundedReceiver<EntityHandle>;

/// JSON wire text for one event. Tile coordinates become pixel coordinates here.
pub fn encode_event(event: &ServerEvent, transform: &TileTransform) -> String {
    let to_px = |x: u32, y: u32| transform.tile_to_pixel(TilePos::new(x, y));
    let value = match event {
        ServerEvent::EntityMove {
            handle,
            x,
            y,
            speed,
            seq,
        } => {
            let (px, py) = to_px(*x, *y);
            json!({ "type": "entity_move", "handle": handle.to_u64(), "px": px, "py": py, "speed": speed, "seq": seq })
        }
        ServerEvent::EntityStopMove { handle, x, y, seq } => {
            let (px, py) = to_px(*x, *y);
            json!({ "type": "entity_stop_move", "handle": handle.to_u64(), "px": px, "py": py, "seq": seq })
        }
        ServerEvent::EntityAppear(snap) => {
            let (px, py) = to_px(snap.x, snap.y);
            json!({
                "type": "entity_appear",
                "handle": snap.handle.to_u64(),
                "kind": snap.kind.to_string(),
                "name": snap.name,
                "px": px,
                "py": py,
                "speed": snap.move_speed,
            })
        }
        ServerEvent::EntityDisappear { handle } => {
            json!({ "type": "entity_disappear", "handle": handle.to_u64() })
        }
    };
    value.to_string()
}

/// Routes per-tick outbound batches to registered client write channels.
/// Scene broadcasts go to every registered client.
pub async fn run_output_router(
    mut outbound_rx: OutboundRx,
    mut register_rx: RegisterRx,
    mut unregister_rx: UnregisterRx,
    transform: TileTransform,
) {
    let mut writers: HashMap<EntityHandle, ClientWriteTx> = HashMap::new();

    loop {
        tokio::select! {
            Some(reg) = register_rx.recv() => {
                tracing::debug!(entity = %reg.handle, "output router: client registered");
                writers.insert(reg.handle, reg.write_tx);
            }
            Some(handle) = unregister_rx.recv() => {
                tracing::debug!(entity = %handle, "output router: client unregistered");
                writers.remove(&handle);
            }
            Some(batch) = outbound_rx.recv() => {
                for outbound in batch {
                    deliver(&mut writers, &outbound, &transform);
                }
            }
            else => break,
        }
    }

    tracing::info!("output router shutting down");
}

fn deliver(writers: &mut HashMap<EntityHandle, ClientWriteTx>, outbound: &Outbound, transform: &TileTransform) {
    let text = encode_event(&outbound.event, transform);
    match outbound.recipient {
        Recipient::Scene => {
            writers.retain(|handle, tx| {
                let open = tx.send(text.clone()).is_ok();
                if !open {
                    tracing::debug!(entity = %handle, "output router: write channel closed");
                }
                open
            });
        }
        Recipient::Entity(handle) => {
            if let Some(tx) = writers.get(&handle) {
                if tx.send(text).is_err() {
                    tracing::debug!(entity = %handle, "output router: write channel closed");
                    writers.remove(&handle);
                }
            } else {
                tracing::trace!(entity = %handle, scene = outbound.scene_id, "output router: no client for recipient");
            }
        }
    }
}
