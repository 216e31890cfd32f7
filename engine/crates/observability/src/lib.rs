use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Budget for one tick at the default 30 tps.
pub const TICK_BUDGET_US: u128 = 33_000;

#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub tick_number: u64,
    pub duration_us: u128,
    pub command_count: usize,
    pub entity_count: usize,
    /// Client movement reports refused this tick.
    pub moves_rejected: u64,
    pub appear_count: usize,
    pub disappear_count: usize,
    /// Messages handed to the output router.
    pub outbound_count: usize,
}

impl TickMetrics {
    pub fn over_budget(&self) -> bool {
        self.duration_us > TICK_BUDGET_US
    }

    pub fn log(&self) {
        if self.over_budget() {
            tracing::warn!(
                tick = self.tick_number,
                duration_us = self.duration_us,
                commands = self.command_count,
                entities = self.entity_count,
                rejected = self.moves_rejected,
                "tick exceeded budget ({}us > {}us)",
                self.duration_us,
                TICK_BUDGET_US
            );
        } else {
            tracing::debug!(
                tick = self.tick_number,
                duration_us = self.duration_us,
                commands = self.command_count,
                entities = self.entity_count,
                rejected = self.moves_rejected,
                appear = self.appear_count,
                disappear = self.disappear_count,
                outbound = self.outbound_count,
                "tick completed"
            );
        }
    }
}
