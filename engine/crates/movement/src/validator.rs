use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use handle::EntityHandle;
use space::TilePos;

use crate::config::MoveConfig;
use crate::error::MoveReject;

/// Scene-side collaborator the validator reads from and moves through.
pub trait MoveHost {
    /// Authoritative position, `None` if the entity is not in the scene.
    fn position(&self, handle: EntityHandle) -> Option<TilePos>;

    /// Speed attribute in tiles/second. 0 means "use the configured default".
    fn speed_attribute(&self, handle: EntityHandle) -> Option<u32>;

    fn is_walkable(&self, pos: TilePos) -> bool;

    /// The authoritative position mutation.
    fn apply_move(&mut self, handle: EntityHandle, pos: TilePos) -> Result<(), MoveReject>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartMove {
    pub seq: u32,
    pub from: TilePos,
    pub to: TilePos,
    pub speed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateMove {
    pub seq: u32,
    pub pos: TilePos,
    pub speed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndMove {
    pub seq: u32,
    pub pos: TilePos,
}

/// What was applied. `speed` is 0 for an end report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveAccepted {
    pub pos: TilePos,
    pub seq: u32,
    pub speed: u32,
}

/// One entity's movement session: Idle -> Moving -> Idle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveState {
    pub last_seq: u32,
    pub last_report: Option<Instant>,
    pub last_client_pos: TilePos,
    pub is_moving: bool,
}

impl MoveState {
    fn new(pos: TilePos) -> Self {
        Self {
            last_seq: 0,
            last_report: None,
            last_client_pos: pos,
            is_moving: false,
        }
    }
}

/// Validates client movement reports against a sequence number and a
/// speed/time/distance budget. State is only written when a report is
/// accepted.
#[derive(Debug, Clone, Default)]
pub struct MovementValidator {
    config: MoveConfig,
    states: BTreeMap<EntityHandle, MoveState>,
}

impl MovementValidator {
    pub fn new(config: MoveConfig) -> Self {
        Self {
            config,
            states: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &MoveConfig {
        &self.config
    }

    /// Start a fresh session at `pos`, discarding any previous one.
    pub fn bind(&mut self, handle: EntityHandle, pos: TilePos) {
        self.states.insert(handle, MoveState::new(pos));
    }

    pub fn unbind(&mut self, handle: EntityHandle) {
        self.states.remove(&handle);
    }

    pub fn state(&self, handle: EntityHandle) -> Option<&MoveState> {
        self.states.get(&handle)
    }

    pub fn is_moving(&self, handle: EntityHandle) -> bool {
        self.states.get(&handle).is_some_and(|s| s.is_moving)
    }

    pub fn handle_start_move<H: MoveHost>(
        &mut self,
        host: &mut H,
        handle: EntityHandle,
        req: StartMove,
        now: Instant,
    ) -> Result<MoveAccepted, MoveReject> {
        let (server_pos, cap) = self.lookup(host, handle)?;
        let mut state = self.session(handle, server_pos);

        check_seq(req.seq, state.last_seq, false)?;
        check_speed(req.speed, cap)?;

        let desync = req.from.distance(server_pos);
        if desync > self.config.position_tolerance as f64 {
            return Err(MoveReject::PositionDesync { distance: desync });
        }
        check_walkable(host, req.to)?;

        // Only a start from rest gets the grace window. A restart inside a
        // live session is held to the same budget as an update.
        let (distance, budget) = match self.recent_report(&state, now) {
            Some(since) => (
                state.last_client_pos.distance(req.to),
                self.config.speed_budget(cap, since.max(self.config.min_update_interval)),
            ),
            None => (
                req.from.distance(req.to),
                self.config.speed_budget(cap, self.config.start_grace),
            ),
        };
        if distance > budget {
            return Err(MoveReject::TooFast { distance, budget });
        }

        host.apply_move(handle, req.to)?;
        state.last_seq = req.seq;
        state.last_client_pos = req.to;
        state.last_report = Some(now);
        state.is_moving = true;
        self.states.insert(handle, state);

        tracing::debug!(entity = %handle, seq = req.seq, x = req.to.x, y = req.to.y, "start move accepted");
        Ok(MoveAccepted {
            pos: req.to,
            seq: req.seq,
            speed: req.speed,
        })
    }

    pub fn handle_update_move<H: MoveHost>(
        &mut self,
        host: &mut H,
        handle: EntityHandle,
        req: UpdateMove,
        now: Instant,
    ) -> Result<MoveAccepted, MoveReject> {
        let (server_pos, cap) = self.lookup(host, handle)?;
        let mut state = self.session(handle, server_pos);

        if !state.is_moving {
            return Err(MoveReject::NotMoving);
        }
        check_seq(req.seq, state.last_seq, false)?;
        check_speed(req.speed, cap)?;

        let since = state
            .last_report
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default();
        let elapsed = since.max(self.config.min_update_interval);
        let distance = state.last_client_pos.distance(req.pos);
        let budget = self.config.speed_budget(cap, elapsed);
        if distance > budget {
            return Err(MoveReject::TooFast { distance, budget });
        }
        check_walkable(host, req.pos)?;

        host.apply_move(handle, req.pos)?;
        state.last_seq = req.seq;
        state.last_client_pos = req.pos;
        state.last_report = Some(now);
        self.states.insert(handle, state);

        tracing::trace!(entity = %handle, seq = req.seq, x = req.pos.x, y = req.pos.y, "update move accepted");
        Ok(MoveAccepted {
            pos: req.pos,
            seq: req.seq,
            speed: req.speed,
        })
    }

    /// End may carry the same seq as the last update of a live session. An
    /// end arriving at rest needs a fresh seq and must also fit the speed
    /// budget since the last report.
    pub fn handle_end_move<H: MoveHost>(
        &mut self,
        host: &mut H,
        handle: EntityHandle,
        req: EndMove,
        now: Instant,
    ) -> Result<MoveAccepted, MoveReject> {
        let (server_pos, cap) = self.lookup(host, handle)?;
        let mut state = self.session(handle, server_pos);

        check_seq(req.seq, state.last_seq, state.is_moving)?;
        check_walkable(host, req.pos)?;

        let distance = state.last_client_pos.distance(req.pos);
        let mut limit = self.config.teleport_limit();
        if !state.is_moving {
            if let Some(since) = state.last_report.map(|t| now.saturating_duration_since(t)) {
                let budget = self.config.speed_budget(cap, since.max(self.config.min_update_interval));
                limit = limit.min(budget);
            }
        }
        if distance > limit {
            return Err(MoveReject::TeleportDetected { distance, limit });
        }

        host.apply_move(handle, req.pos)?;
        state.last_seq = req.seq;
        state.last_client_pos = req.pos;
        state.last_report = Some(now);
        state.is_moving = false;
        self.states.insert(handle, state);

        tracing::debug!(entity = %handle, seq = req.seq, x = req.pos.x, y = req.pos.y, "end move accepted");
        Ok(MoveAccepted {
            pos: req.pos,
            seq: req.seq,
            speed: 0,
        })
    }

    fn lookup<H: MoveHost>(&self, host: &H, handle: EntityHandle) -> Result<(TilePos, u32), MoveReject> {
        let pos = host.position(handle).ok_or(MoveReject::EntityNotFound(handle))?;
        let attr = host.speed_attribute(handle).ok_or(MoveReject::EntityNotFound(handle))?;
        let cap = if attr == 0 { self.config.default_speed_cap } else { attr };
        Ok((pos, cap))
    }

    /// Time since the last accepted report, when the session is moving or
    /// that report is still inside the start grace window.
    fn recent_report(&self, state: &MoveState, now: Instant) -> Option<Duration> {
        let since = now.saturating_duration_since(state.last_report?);
        (state.is_moving || since < self.config.start_grace).then_some(since)
    }

    /// Copy of the current session, or a fresh one at the server position.
    fn session(&self, handle: EntityHandle, server_pos: TilePos) -> MoveState {
        self.states
            .get(&handle)
            .cloned()
            .unwrap_or_else(|| MoveState::new(server_pos))
    }
}

fn check_seq(seq: u32, last: u32, allow_equal: bool) -> Result<(), MoveReject> {
    let stale = if allow_equal { seq < last } else { seq <= last };
    if seq == 0 || stale {
        return Err(MoveReject::SeqInvalid { seq, last });
    }
    Ok(())
}

fn check_speed(speed: u32, cap: u32) -> Result<(), MoveReject> {
    if speed == 0 || speed > cap {
        return Err(MoveReject::SpeedInvalid { speed, cap });
    }
    Ok(())
}

fn check_walkable<H: MoveHost>(host: &H, pos: TilePos) -> Result<(), MoveReject> {
    if !host.is_walkable(pos) {
        return Err(MoveReject::TargetNotWalkable { x: pos.x, y: pos.y });
    }
    Ok(())
}
