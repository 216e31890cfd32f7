use handle::EntityHandle;

/// Why a client movement report was refused. Always recovered locally:
/// the position is left as is and the client is sent a resync.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MoveReject {
    #[error("seq invalid: got {seq}, last accepted {last}")]
    SeqInvalid { seq: u32, last: u32 },

    #[error("speed invalid: claimed {speed}, cap {cap}")]
    SpeedInvalid { speed: u32, cap: u32 },

    #[error("position desync: client origin is {distance:.1} tiles from server position")]
    PositionDesync { distance: f64 },

    #[error("target ({x}, {y}) is not walkable")]
    TargetNotWalkable { x: u32, y: u32 },

    #[error("movement too fast: {distance:.1} tiles exceeds budget {budget:.1}")]
    TooFast { distance: f64, budget: f64 },

    #[error("not moving")]
    NotMoving,

    #[error("teleport detected: {distance:.1} tiles exceeds {limit:.1}")]
    TeleportDetected { distance: f64, limit: f64 },

    #[error("entity not found: {0}")]
    EntityNotFound(EntityHandle),
}

impl MoveReject {
    /// Short stable tag for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SeqInvalid { .. } => "seq_invalid",
            Self::SpeedInvalid { .. } => "speed_invalid",
            Self::PositionDesync { .. } => "position_desync",
            Self::TargetNotWalkable { .. } => "target_not_walkable",
            Self::TooFast { .. } => "too_fast",
            Self::NotMoving => "not_moving",
            Self::TeleportDetected { .. } => "teleport_detected",
            Self::EntityNotFound(_) => "entity_not_found",
        }
    }
}
