use std::collections::{HashMap, VecDeque};

use bevy::prelude::*;
use serde::Serialize;

use crate::components::{ActorId, GameConfig, Grounded, InputFlags, TickClock};
use crate::coordinator::{PhysicsCommand, PhysicsCoordinator, PhysicsQuery};
use crate::events::{ChangeEvent, ChangeKind, ChangeNotifier};
use crate::physics::MotionOutcomes;
use crate::schedule::TickSet;
use crate::stats::{spend_energy, Energy};

/// Oldest responses are dropped past this depth, mirroring the bounded
/// event buffer.
const MAX_RESPONSES: usize = 256;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementAction {
    Walk,
    Jump,
    Dash,
    Stop,
    Crouch,
}

/// Movement mode per actor; previous mode feeds request validity rules.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Idle,
    Walk,
    Airborne,
    Dash,
    Crouch,
}

impl Mode {
    fn as_action(self) -> Option<MovementAction> {
        match self {
            Mode::Idle => Some(MovementAction::Stop),
            Mode::Walk => Some(MovementAction::Walk),
            Mode::Airborne => Some(MovementAction::Jump),
            Mode::Dash => Some(MovementAction::Dash),
            Mode::Crouch => Some(MovementAction::Crouch),
        }
    }
}

#[derive(Component, Clone, Copy, Debug, Default)]
pub struct MovementState {
    pub current: Mode,
    pub previous: Mode,
    pub coyote: u32,
    pub jump_buffer: u32,
    pub variable_height: bool,
}

impl MovementState {
    fn transition(&mut self, next: Mode) {
        if next != self.current {
            self.previous = self.current;
            self.current = next;
        }
    }
}

/// Diagnostic context attached to a synthesized retry request.
#[derive(Clone, Debug, Serialize)]
pub struct RetryContext {
    pub retry_count: u32,
    pub original_speed: f32,
    pub retry_speed: f32,
    pub error_context: String,
    pub origin_request: u64,
    pub origin_timestamp: f64,
}

/// Immutable motion intent. A retry is a new record referencing the failed
/// request's id and timestamp, never an in-place mutation.
#[derive(Clone, Debug, Serialize)]
pub struct MovementRequest {
    pub id: u64,
    pub actor: u64,
    pub action: MovementAction,
    pub direction: (f32, f32),
    pub magnitude: f32,
    pub previous_action: Option<MovementAction>,
    pub timestamp: f64,
    pub previous_request_time: Option<f64>,
    pub retry: Option<RetryContext>,
}

impl MovementRequest {
    /// Input frequency implied by the gap to the previous request for this
    /// actor, in Hz. None when this is the first request.
    pub fn request_frequency(&self) -> Option<f64> {
        let previous = self.previous_request_time?;
        let gap = self.timestamp - previous;
        if gap <= 0.0 {
            return Some(f64::INFINITY);
        }
        Some(1.0 / gap)
    }

    pub fn is_rapid_input(&self, threshold_hz: f64) -> bool {
        self.request_frequency()
            .is_some_and(|freq| freq >= threshold_hz)
    }

    pub fn retry_count(&self) -> u32 {
        self.retry.as_ref().map_or(0, |r| r.retry_count)
    }

    fn with_previous(mut self, previous: Option<MovementAction>) -> Self {
        self.previous_action = previous;
        self
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    JumpWhileCrouching,
    ZeroDirectionDash,
    UnknownActor,
    InsufficientEnergy,
}

/// Outcome of a request, reported against store truth at application time,
/// never the requested values verbatim.
#[derive(Clone, Debug, Serialize)]
pub struct MovementResponse {
    pub request_id: u64,
    pub actor: u64,
    pub valid: bool,
    pub success: bool,
    pub rapid_input: bool,
    pub actual_velocity: (f32, f32),
    pub actual_position: (f32, f32),
    pub is_grounded: bool,
    pub rejection: Option<RejectReason>,
}

/// Validity rules applied before any request reaches the physics
/// coordinator.
pub fn validate(
    action: MovementAction,
    direction: (f32, f32),
    current_mode: Mode,
) -> Result<(), RejectReason> {
    match action {
        MovementAction::Jump if current_mode == Mode::Crouch => {
            Err(RejectReason::JumpWhileCrouching)
        }
        MovementAction::Dash if direction.0 == 0.0 && direction.1 == 0.0 => {
            Err(RejectReason::ZeroDirectionDash)
        }
        _ => Ok(()),
    }
}

/// Build the degraded follow-up for a blocked request: 75% of the prior
/// magnitude, an incremented retry count, and the failure context preserved
/// for diagnostics.
pub fn retry_from(
    failed: &MovementRequest,
    id: u64,
    reason: &str,
    retry_fraction: f32,
    fallback_speed_multiplier: f32,
    timestamp: f64,
) -> MovementRequest {
    let magnitude = failed.magnitude * retry_fraction;
    let original_speed = failed
        .retry
        .as_ref()
        .map_or(failed.magnitude, |r| r.original_speed);
    MovementRequest {
        id,
        actor: failed.actor,
        action: failed.action,
        direction: failed.direction,
        magnitude,
        previous_action: failed.previous_action,
        timestamp,
        previous_request_time: Some(failed.timestamp),
        retry: Some(RetryContext {
            retry_count: failed.retry_count() + 1,
            original_speed,
            retry_speed: magnitude * fallback_speed_multiplier,
            error_context: reason.to_string(),
            origin_request: failed.retry.as_ref().map_or(failed.id, |r| r.origin_request),
            origin_timestamp: failed
                .retry
                .as_ref()
                .map_or(failed.timestamp, |r| r.origin_timestamp),
        }),
    }
}

struct PendingMotion {
    request: MovementRequest,
    rapid: bool,
}

/// Validates motion intents, converts them into physics mutation plans, and
/// owns the retry/rapid-input policy.
#[derive(Resource, Default)]
pub struct MovementCoordinator {
    intents: VecDeque<MovementRequest>,
    pending: Vec<PendingMotion>,
    pub responses: VecDeque<MovementResponse>,
    pub dropped_responses: u64,
    last_request_time: HashMap<u64, f64>,
    jump_state: HashMap<u64, (bool, u32)>,
    variable_height_pref: HashMap<u64, bool>,
    next_request_id: u64,
}

impl MovementCoordinator {
    fn enqueue(
        &mut self,
        actor: u64,
        action: MovementAction,
        direction: (f32, f32),
        magnitude: f32,
        now: f64,
    ) -> u64 {
        self.next_request_id += 1;
        let id = self.next_request_id;
        let previous_request_time = self.last_request_time.insert(actor, now);
        self.intents.push_back(MovementRequest {
            id,
            actor,
            action,
            direction,
            magnitude,
            previous_action: None,
            timestamp: now,
            previous_request_time,
            retry: None,
        });
        id
    }

    pub fn handle_movement_input(
        &mut self,
        actor: u64,
        direction: (f32, f32),
        speed: f32,
        now: f64,
    ) -> u64 {
        self.enqueue(actor, MovementAction::Walk, direction, speed, now)
    }

    pub fn handle_jump_input(
        &mut self,
        actor: u64,
        force: f32,
        variable_height: bool,
        now: f64,
    ) -> u64 {
        self.variable_height_pref.insert(actor, variable_height);
        self.enqueue(actor, MovementAction::Jump, (0.0, 1.0), force, now)
    }

    pub fn handle_dash_input(&mut self, actor: u64, direction: (f32, f32), now: f64) -> u64 {
        self.enqueue(actor, MovementAction::Dash, direction, 0.0, now)
    }

    pub fn handle_stop_input(&mut self, actor: u64, now: f64) -> u64 {
        self.enqueue(actor, MovementAction::Stop, (0.0, 0.0), 0.0, now)
    }

    pub fn handle_crouch_input(&mut self, actor: u64, now: f64) -> u64 {
        self.enqueue(actor, MovementAction::Crouch, (0.0, 0.0), 0.0, now)
    }

    /// Grounded-or-coyote check against the state seen last tick.
    pub fn can_jump(&self, actor: u64) -> bool {
        self.jump_state
            .get(&actor)
            .is_some_and(|(grounded, coyote)| *grounded || *coyote > 0)
    }

    pub fn queued_intents(&self) -> usize {
        self.intents.len()
    }

    /// True while any per-actor bookkeeping remains for `actor`.
    pub fn tracks_actor(&self, actor: u64) -> bool {
        self.last_request_time.contains_key(&actor)
            || self.jump_state.contains_key(&actor)
            || self.variable_height_pref.contains_key(&actor)
    }

    /// Despawn teardown: drop every per-actor map entry.
    pub(crate) fn forget_actor(&mut self, actor: u64) {
        self.last_request_time.remove(&actor);
        self.jump_state.remove(&actor);
        self.variable_height_pref.remove(&actor);
    }

    fn push_response(&mut self, response: MovementResponse) {
        self.responses.push_back(response);
        while self.responses.len() > MAX_RESPONSES {
            self.responses.pop_front();
            self.dropped_responses = self.dropped_responses.saturating_add(1);
        }
    }

    fn rejection_response(
        &mut self,
        request: &MovementRequest,
        reason: RejectReason,
        valid: bool,
        snapshot: Option<crate::coordinator::Snapshot>,
    ) {
        let response = MovementResponse {
            request_id: request.id,
            actor: request.actor,
            valid,
            success: false,
            rapid_input: false,
            actual_velocity: snapshot.map_or((0.0, 0.0), |s| s.velocity),
            actual_position: snapshot.map_or((0.0, 0.0), |s| s.position),
            is_grounded: snapshot.is_some_and(|s| s.on_ground),
            rejection: Some(reason),
        };
        self.push_response(response);
    }
}

fn normalized(direction: (f32, f32)) -> (f32, f32) {
    let len = (direction.0 * direction.0 + direction.1 * direction.1).sqrt();
    if len <= f32::EPSILON {
        (0.0, 0.0)
    } else {
        (direction.0 / len, direction.1 / len)
    }
}

#[allow(clippy::type_complexity)]
pub fn process_requests(
    mut movement: ResMut<MovementCoordinator>,
    mut physics: ResMut<PhysicsCoordinator>,
    mut notifier: ResMut<ChangeNotifier>,
    config: Res<GameConfig>,
    clock: Res<TickClock>,
    mut actors: Query<(
        &ActorId,
        &Grounded,
        &mut MovementState,
        &mut InputFlags,
        Option<&mut Energy>,
    )>,
) {
    // Variable jump height: upward velocity is cut in half the tick the jump
    // input is released.
    for (id, _, state, flags, _) in actors.iter_mut() {
        if state.variable_height && !flags.jumping {
            if let Some((_, vy)) = physics.velocity(id.0) {
                if vy > 0.0 {
                    physics.submit(PhysicsCommand::SetVelocityY {
                        actor: id.0,
                        vy: vy * 0.5,
                    });
                }
            }
        }
    }

    let intents: Vec<MovementRequest> = movement.intents.drain(..).collect();
    for intent in intents {
        let Some((id, grounded, mut state, mut flags, energy)) = actors
            .iter_mut()
            .find(|(id, ..)| id.0 == intent.actor)
        else {
            movement.rejection_response(&intent, RejectReason::UnknownActor, false, None);
            continue;
        };

        let request = intent.with_previous(state.current.as_action());
        if let Err(reason) = validate(request.action, request.direction, state.current) {
            info!(
                "[Aetherfall] rejected {:?} request {} for actor {}: {:?}",
                request.action, request.id, request.actor, reason
            );
            let snapshot = physics.snapshot(request.actor);
            movement.rejection_response(&request, reason, false, snapshot);
            continue;
        }

        let rapid = request.is_rapid_input(config.rapid_input_hz);
        if rapid {
            // Rapid inputs are honored but flagged so a consumer can
            // intervene; the core does not suppress them.
            debug!(
                "[Aetherfall] rapid input from actor {} ({:.1} Hz)",
                request.actor,
                request.request_frequency().unwrap_or_default()
            );
        }

        match request.action {
            MovementAction::Walk => {
                let dir = normalized(request.direction);
                let magnitude = request.magnitude.min(config.max_horizontal_speed);
                flags.moving_left = dir.0 < 0.0;
                flags.moving_right = dir.0 > 0.0;
                physics.submit(PhysicsCommand::SetVelocityX {
                    actor: id.0,
                    vx: dir.0 * magnitude,
                });
                state.transition(if grounded.on_ground {
                    Mode::Walk
                } else {
                    Mode::Airborne
                });
            }
            MovementAction::Jump => {
                let can_jump = grounded.on_ground || state.coyote > 0;
                if can_jump {
                    physics.submit(PhysicsCommand::SetVelocityY {
                        actor: id.0,
                        vy: request.magnitude,
                    });
                    state.coyote = 0;
                    state.jump_buffer = 0;
                    state.variable_height = movement
                        .variable_height_pref
                        .get(&id.0)
                        .copied()
                        .unwrap_or(true);
                    flags.jumping = true;
                    flags.jump_buffered = false;
                    state.transition(Mode::Airborne);
                } else {
                    // Not grounded: buffer the jump instead of failing it
                    // outright, then report the miss.
                    state.jump_buffer = config.jump_buffer_frames;
                    flags.jump_buffered = true;
                    let snapshot = physics.snapshot(request.actor);
                    movement.push_response(MovementResponse {
                        request_id: request.id,
                        actor: request.actor,
                        valid: true,
                        success: false,
                        rapid_input: rapid,
                        actual_velocity: snapshot.map_or((0.0, 0.0), |s| s.velocity),
                        actual_position: snapshot.map_or((0.0, 0.0), |s| s.position),
                        is_grounded: false,
                        rejection: None,
                    });
                    continue;
                }
            }
            MovementAction::Dash => {
                if let Some(mut energy) = energy {
                    if !spend_energy(
                        &mut energy,
                        config.dash_energy_cost,
                        id.0,
                        "dash",
                        &mut notifier,
                        clock.frame,
                    ) {
                        let snapshot = physics.snapshot(request.actor);
                        movement.rejection_response(
                            &request,
                            RejectReason::InsufficientEnergy,
                            true,
                            snapshot,
                        );
                        continue;
                    }
                }
                let dir = normalized(request.direction);
                physics.submit(PhysicsCommand::SetVelocityX {
                    actor: id.0,
                    vx: dir.0 * config.dash_speed,
                });
                if dir.1 != 0.0 {
                    physics.submit(PhysicsCommand::SetVelocityY {
                        actor: id.0,
                        vy: dir.1 * config.dash_speed,
                    });
                }
                notifier.emit(ChangeEvent::new(
                    id.0,
                    ChangeKind::AbilityActivated,
                    0.0,
                    1.0,
                    "dash",
                    clock.frame,
                ));
                state.transition(Mode::Dash);
            }
            MovementAction::Stop => {
                physics.submit(PhysicsCommand::SetVelocityX { actor: id.0, vx: 0.0 });
                flags.moving_left = false;
                flags.moving_right = false;
                state.transition(if grounded.on_ground {
                    Mode::Idle
                } else {
                    Mode::Airborne
                });
            }
            MovementAction::Crouch => {
                if grounded.on_ground {
                    physics.submit(PhysicsCommand::SetVelocityX { actor: id.0, vx: 0.0 });
                    state.transition(Mode::Crouch);
                } else {
                    let snapshot = physics.snapshot(request.actor);
                    movement.push_response(MovementResponse {
                        request_id: request.id,
                        actor: request.actor,
                        valid: true,
                        success: false,
                        rapid_input: rapid,
                        actual_velocity: snapshot.map_or((0.0, 0.0), |s| s.velocity),
                        actual_position: snapshot.map_or((0.0, 0.0), |s| s.position),
                        is_grounded: false,
                        rejection: None,
                    });
                    continue;
                }
            }
        }

        movement.pending.push(PendingMotion { request, rapid });
    }

    // Refresh the grounded/coyote view used by can_jump.
    for (id, grounded, state, _, _) in actors.iter() {
        movement
            .jump_state
            .insert(id.0, (grounded.on_ground, state.coyote));
    }
}

/// Post-step bookkeeping: settle pending responses against committed store
/// truth, synthesize retries for blocked motion, and advance coyote/jump
/// buffers.
pub fn resolve_responses(
    mut movement: ResMut<MovementCoordinator>,
    physics: Res<PhysicsCoordinator>,
    outcomes: Res<MotionOutcomes>,
    config: Res<GameConfig>,
    clock: Res<TickClock>,
    mut states: Query<(&ActorId, &Grounded, &mut MovementState, &mut InputFlags)>,
) {
    let now = clock.seconds(config.dt);

    let mut buffered_jumps = Vec::new();
    for (id, grounded, mut state, mut flags) in states.iter_mut() {
        if grounded.on_ground {
            state.coyote = config.coyote_frames;
            if state.current == Mode::Airborne {
                state.transition(if flags.moving_left || flags.moving_right {
                    Mode::Walk
                } else {
                    Mode::Idle
                });
            }
            if flags.jumping && !grounded.just_landed {
                flags.jumping = false;
            }
            if flags.jump_buffered {
                flags.jump_buffered = false;
                state.jump_buffer = 0;
                buffered_jumps.push(id.0);
            }
        } else {
            if state.coyote > 0 {
                state.coyote -= 1;
            }
            if state.jump_buffer > 0 {
                state.jump_buffer -= 1;
                if state.jump_buffer == 0 {
                    flags.jump_buffered = false;
                }
            }
        }
    }
    for actor in buffered_jumps {
        movement.handle_jump_input(actor, config.jump_velocity, true, now);
    }

    let pending: Vec<PendingMotion> = movement.pending.drain(..).collect();
    for PendingMotion { request, rapid } in pending {
        let snapshot = physics.snapshot(request.actor);
        let blocked = matches!(request.action, MovementAction::Walk | MovementAction::Dash)
            && outcomes.was_blocked(request.actor, clock.frame);

        if blocked && request.retry_count() < config.max_retries {
            movement.next_request_id += 1;
            let id = movement.next_request_id;
            let retry = retry_from(
                &request,
                id,
                "motion blocked by collision",
                config.retry_fraction,
                config.fallback_speed_multiplier,
                now,
            );
            if let Some(ctx) = &retry.retry {
                warn!(
                    "[Aetherfall] retrying blocked {:?} for actor {}: attempt {}, speed {} -> {}",
                    request.action, request.actor, ctx.retry_count, ctx.original_speed, ctx.retry_speed
                );
            }
            movement.intents.push_back(retry);
        }

        movement.push_response(MovementResponse {
            request_id: request.id,
            actor: request.actor,
            valid: true,
            success: !blocked,
            rapid_input: rapid,
            actual_velocity: snapshot.map_or((0.0, 0.0), |s| s.velocity),
            actual_position: snapshot.map_or((0.0, 0.0), |s| s.position),
            is_grounded: snapshot.is_some_and(|s| s.on_ground),
            rejection: None,
        });
    }
}

pub struct MovementPlugin;

impl Plugin for MovementPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<MovementCoordinator>()
            .add_systems(FixedUpdate, process_requests.in_set(TickSet::Movement))
            .add_systems(FixedUpdate, resolve_responses.in_set(TickSet::Resolve));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk_request(id: u64, magnitude: f32, timestamp: f64) -> MovementRequest {
        MovementRequest {
            id,
            actor: 1,
            action: MovementAction::Walk,
            direction: (1.0, 0.0),
            magnitude,
            previous_action: Some(MovementAction::Stop),
            timestamp,
            previous_request_time: None,
            retry: None,
        }
    }

    #[test]
    fn jump_while_crouching_is_invalid() {
        let result = validate(MovementAction::Jump, (0.0, 1.0), Mode::Crouch);
        assert_eq!(result, Err(RejectReason::JumpWhileCrouching));
        assert!(validate(MovementAction::Jump, (0.0, 1.0), Mode::Idle).is_ok());
    }

    #[test]
    fn zero_direction_dash_is_invalid() {
        let result = validate(MovementAction::Dash, (0.0, 0.0), Mode::Idle);
        assert_eq!(result, Err(RejectReason::ZeroDirectionDash));
        assert!(validate(MovementAction::Dash, (1.0, 0.0), Mode::Idle).is_ok());
    }

    #[test]
    fn retry_reduces_speed_to_three_quarters() {
        let failed = walk_request(10, 200.0, 1.0);
        let retry = retry_from(&failed, 11, "blocked", 0.75, 0.9, 1.1);

        assert_eq!(retry.magnitude, 150.0);
        let ctx = retry.retry.as_ref().expect("retry context");
        assert_eq!(ctx.retry_count, 1);
        assert_eq!(ctx.original_speed, 200.0);
        assert!((ctx.retry_speed - 150.0 * 0.9).abs() < 1e-6);
        assert_eq!(ctx.origin_request, 10);
        assert_eq!(ctx.error_context, "blocked");
    }

    #[test]
    fn chained_retries_keep_the_original_speed_and_count_up() {
        let failed = walk_request(10, 200.0, 1.0);
        let first = retry_from(&failed, 11, "blocked", 0.75, 0.9, 1.1);
        let second = retry_from(&first, 12, "blocked again", 0.75, 0.9, 1.2);

        assert!((second.magnitude - 112.5).abs() < 1e-6);
        let ctx = second.retry.as_ref().expect("retry context");
        assert_eq!(ctx.retry_count, 2);
        assert_eq!(ctx.original_speed, 200.0);
        assert_eq!(ctx.origin_request, 10);
    }

    #[test]
    fn rapid_input_flags_at_twenty_hertz() {
        let mut request = walk_request(1, 200.0, 1.04);
        request.previous_request_time = Some(1.0);
        // 25 Hz
        assert!(request.is_rapid_input(20.0));

        request.previous_request_time = Some(0.9);
        // ~7 Hz
        assert!(!request.is_rapid_input(20.0));

        request.previous_request_time = None;
        assert!(!request.is_rapid_input(20.0));
        assert!(request.request_frequency().is_none());
    }

    #[test]
    fn intake_threads_previous_request_time_per_actor() {
        let mut movement = MovementCoordinator::default();
        movement.handle_movement_input(1, (1.0, 0.0), 200.0, 1.0);
        movement.handle_movement_input(1, (1.0, 0.0), 200.0, 1.02);
        movement.handle_movement_input(2, (1.0, 0.0), 200.0, 1.03);

        let requests: Vec<_> = movement.intents.iter().collect();
        assert_eq!(requests[0].previous_request_time, None);
        assert_eq!(requests[1].previous_request_time, Some(1.0));
        // Different actor, separate history.
        assert_eq!(requests[2].previous_request_time, None);
        assert!(requests[1].is_rapid_input(20.0));
    }

    #[test]
    fn can_jump_requires_ground_or_coyote() {
        let mut movement = MovementCoordinator::default();
        assert!(!movement.can_jump(1));

        movement.jump_state.insert(1, (true, 0));
        assert!(movement.can_jump(1));

        movement.jump_state.insert(1, (false, 3));
        assert!(movement.can_jump(1));

        movement.jump_state.insert(1, (false, 0));
        assert!(!movement.can_jump(1));
    }

    #[test]
    fn response_buffer_is_bounded() {
        let mut movement = MovementCoordinator::default();
        for i in 0..(MAX_RESPONSES + 10) {
            movement.push_response(MovementResponse {
                request_id: i as u64,
                actor: 1,
                valid: true,
                success: true,
                rapid_input: false,
                actual_velocity: (0.0, 0.0),
                actual_position: (0.0, 0.0),
                is_grounded: true,
                rejection: None,
            });
        }
        assert_eq!(movement.responses.len(), MAX_RESPONSES);
        assert_eq!(movement.dropped_responses, 10);
    }
}
