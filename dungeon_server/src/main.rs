use std::time::Duration;

use engine_core::command::{OutboundTx, SceneRx};
use engine_core::sync::PositionSyncRx;
use engine_core::{EntityRecord, PositionSyncLink, SceneActor, SceneCommand};
use handle::HandleAllocator;
use tokio::sync::mpsc;

use dungeon_server::config::{parse_cli_args, ServerConfig};
use dungeon_server::router::run_output_router;
use dungeon_server::shutdown::{self, shutdown_channel, ShutdownReason, ShutdownRx, ShutdownTx};
use dungeon_server::world;

#[tokio::main]
async fn main() {
    observability::init_logging();

    let config = parse_cli_args();
    tracing::info!("Dungeon server starting...");

    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let server_future = run_dungeon_server(config, shutdown_tx.clone(), shutdown_rx.clone());
    tokio::pin!(server_future);

    tokio::select! {
        _ = shutdown::wait_for_signal() => {
            tracing::info!("Shutdown signal received, stopping server...");
            shutdown_tx.trigger(ShutdownReason::Signal);
            // Let the tick thread finish its current tick.
            let _ = tokio::time::timeout(Duration::from_millis(500), &mut server_future).await;
        }
        _ = &mut server_future => {}
    }

    match shutdown_rx.reason() {
        Some(reason) => tracing::info!(%reason, "Server stopped."),
        None => tracing::info!("Server stopped."),
    }
}

async fn run_dungeon_server(config: ServerConfig, shutdown_tx: ShutdownTx, shutdown_rx: ShutdownRx) {
    let (scene_tx, scene_rx) = mpsc::unbounded_channel();
    let (output_tx, output_rx) = mpsc::unbounded_channel();
    // Connection tasks register here once a transport is attached.
    let (_register_tx, register_rx) = mpsc::unbounded_channel();
    let (_unregister_tx, unregister_rx) = mpsc::unbounded_channel();
    let (sync_link, sync_rx) = PositionSyncLink::channel();

    tokio::spawn(run_output_router(
        output_rx,
        register_rx,
        unregister_rx,
        config.to_tile_transform(),
    ));
    tokio::spawn(run_position_sync_consumer(sync_rx, shutdown_rx.clone()));

    let mut scene = match world::build_scene(&config, sync_link) {
        Ok(scene) => scene,
        Err(e) => {
            tracing::error!("Failed to build scene: {}", e);
            shutdown_tx.trigger(ShutdownReason::SceneFailure);
            return;
        }
    };

    let mut alloc = HandleAllocator::new();
    for mover in world::spawn_monsters(&mut scene, &mut alloc, &config) {
        let _ = scene_tx.send(SceneCommand::AttachMover(mover));
    }

    tracing::info!(
        scene = scene.id(),
        width = scene.grid().width(),
        height = scene.grid().height(),
        entities = scene.entity_count(),
        "Scene ready"
    );

    // Tick thread (blocking)
    let tick_config = config.to_tick_config();
    let tick_handle = std::thread::spawn(move || {
        run_scene_tick_thread(tick_config, scene, scene_rx, output_tx, shutdown_tx, shutdown_rx);
    });

    // Keep the mailbox open while the scene runs.
    let _scene_tx = scene_tx;
    let _ = tokio::task::spawn_blocking(move || tick_handle.join()).await;
}

fn run_scene_tick_thread(
    tick_config: engine_core::TickConfig,
    scene: engine_core::Scene<EntityRecord>,
    scene_rx: SceneRx<EntityRecord>,
    output_tx: OutboundTx,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
) {
    let mut actor = SceneActor::new(tick_config, scene, scene_rx).with_outbound(output_tx);
    tracing::info!(scene = actor.scene().id(), "Scene tick loop running (Ctrl+C to stop)");

    let ticks = actor.run(|| shutdown_rx.is_shutdown());
    tracing::info!(ticks, entities = actor.scene().entity_count(), "Scene tick loop stopped");
    // Only reached without a prior reason when max_ticks ran out.
    shutdown_tx.trigger(ShutdownReason::TickLimit);
}

/// Stand-in for the persistence side: logs every authoritative role position.
async fn run_position_sync_consumer(mut sync_rx: PositionSyncRx, mut shutdown_rx: ShutdownRx) {
    loop {
        tokio::select! {
            Some(sync) = sync_rx.recv() => {
                tracing::debug!(
                    entity = %sync.handle,
                    scene = sync.scene_id,
                    x = sync.pos.x,
                    y = sync.pos.y,
                    "position sync"
                );
            }
            _ = shutdown_rx.wait() => break,
            else => break,
        }
    }
    tracing::info!("position sync consumer stopped");
}
