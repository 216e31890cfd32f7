use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use handle::EntityHandle;

use crate::ai::AiMover;
use crate::command::{OutboundTx, SceneCommand, SceneRx};
use crate::entity::SceneEntity;
use crate::scene::Scene;

/// Tick loop configuration.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Ticks per second.
    pub tps: u32,
    /// Maximum ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tps: 30,
            max_ticks: 0,
        }
    }
}

impl TickConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tps.max(1) as f64)
    }
}

/// Single-threaded owner of one scene. All scene state is touched only from
/// [`step`](Self::step), fed by the mailbox.
pub struct SceneActor<E> {
    scene: Scene<E>,
    movers: BTreeMap<EntityHandle, AiMover>,
    mailbox: SceneRx<E>,
    outbound: Option<OutboundTx>,
    pub config: TickConfig,
    pub current_tick: u64,
}

impl<E: SceneEntity> SceneActor<E> {
    pub fn new(config: TickConfig, scene: Scene<E>, mailbox: SceneRx<E>) -> Self {
        Self {
            scene,
            movers: BTreeMap::new(),
            mailbox,
            outbound: None,
            config,
            current_tick: 0,
        }
    }

    /// Forward each tick's outbox to the output router.
    pub fn with_outbound(mut self, tx: OutboundTx) -> Self {
        self.outbound = Some(tx);
        self
    }

    pub fn scene(&self) -> &Scene<E> {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene<E> {
        &mut self.scene
    }

    pub fn mover_count(&self) -> usize {
        self.movers.len()
    }

    pub fn step(&mut self) -> observability::TickMetrics {
        self.step_at(Instant::now())
    }

    /// Execute a single tick: mailbox -> AI movers -> visibility flush -> outbox.
    pub fn step_at(&mut self, now: Instant) -> observability::TickMetrics {
        let start = Instant::now();

        // 1. Apply mailbox commands in arrival order
        let mut command_count = 0;
        while let Ok(cmd) = self.mailbox.try_recv() {
            command_count += 1;
            self.apply_command(cmd, now);
        }

        // 2. Server-driven movers
        for mover in self.movers.values_mut() {
            mover.tick(&mut self.scene, now);
        }

        // 3. Drain AOI exactly once
        let flush = self.scene.flush_visibility();

        // 4. Hand the outbox to the router
        let outbound = self.scene.drain_outbox();
        let outbound_count = outbound.len();
        if !outbound.is_empty() {
            if let Some(tx) = &self.outbound {
                if let Err(e) = tx.send(outbound) {
                    tracing::error!(scene = self.scene.id(), error = %e, "output router gone, dropping tick output");
                }
            }
        }

        self.current_tick += 1;
        let duration = start.elapsed();

        observability::TickMetrics {
            tick_number: self.current_tick,
            duration_us: duration.as_micros(),
            command_count,
            entity_count: self.scene.entity_count(),
            moves_rejected: self.scene.take_rejected_moves(),
            appear_count: flush.appear,
            disappear_count: flush.disappear,
            outbound_count,
        }
    }

    /// Run until `max_ticks` is reached or `stop` returns true.
    /// Returns the number of ticks executed.
    pub fn run(&mut self, mut stop: impl FnMut() -> bool) -> u64 {
        let tick_duration = self.config.tick_duration();
        let first_tick = self.current_tick;

        loop {
            if self.config.max_ticks > 0 && self.current_tick >= self.config.max_ticks {
                break;
            }
            if stop() {
                tracing::info!(scene = self.scene.id(), "scene tick loop: shutdown requested");
                break;
            }

            let tick_start = Instant::now();
            let metrics = self.step();
            metrics.log();

            // Sleep until next tick
            let elapsed = tick_start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            }
        }

        self.current_tick - first_tick
    }

    fn apply_command(&mut self, cmd: SceneCommand<E>, now: Instant) {
        match cmd {
            SceneCommand::Join(entity) => {
                let handle = entity.handle();
                if let Err(e) = self.scene.add_entity(entity) {
                    tracing::warn!(entity = %handle, error = %e, "join refused");
                }
            }
            SceneCommand::Leave(handle) => {
                self.movers.remove(&handle);
                if let Err(e) = self.scene.remove_entity(handle) {
                    tracing::warn!(entity = %handle, error = %e, "leave refused");
                }
            }
            // Rejections are logged and answered with a resync inside the scene.
            SceneCommand::StartMove { handle, req } => {
                let _ = self.scene.handle_start_move(handle, req, now);
            }
            SceneCommand::UpdateMove { handle, req } => {
                let _ = self.scene.handle_update_move(handle, req, now);
            }
            SceneCommand::EndMove { handle, req } => {
                let _ = self.scene.handle_end_move(handle, req, now);
            }
            SceneCommand::AttachMover(mover) => {
                let handle = mover.handle();
                if self.scene.contains(handle) {
                    self.movers.insert(handle, mover);
                } else {
                    tracing::warn!(entity = %handle, "mover attached to unknown entity, dropped");
                }
            }
        }
    }
}
