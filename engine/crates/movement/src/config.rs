use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Movement validation budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveConfig {
    /// Max tiles between a start report's origin and the server position.
    pub position_tolerance: u32,
    /// Slack added to every speed budget, in tiles.
    pub distance_tolerance: u32,
    /// Floor applied to the time between update reports.
    pub min_update_interval: Duration,
    /// Time budget granted to the first leg of a movement session.
    pub start_grace: Duration,
    /// Cap used for entities whose speed attribute is 0 (tiles/second).
    pub default_speed_cap: u32,
}

impl Default for MoveConfig {
    fn default() -> Self {
        Self {
            position_tolerance: 30,
            distance_tolerance: 50,
            min_update_interval: Duration::from_millis(50),
            start_grace: Duration::from_secs(1),
            default_speed_cap: 20,
        }
    }
}

impl MoveConfig {
    /// `cap * elapsed + distance_tolerance`, computed on whole milliseconds so
    /// that boundary distances compare exactly.
    pub fn speed_budget(&self, speed_cap: u32, elapsed: Duration) -> f64 {
        let ms = elapsed.as_millis() as f64;
        speed_cap as f64 * ms / 1000.0 + self.distance_tolerance as f64
    }

    pub fn teleport_limit(&self) -> f64 {
        2.0 * self.distance_tolerance as f64
    }
}
