use bevy::prelude::*;
use serde::Serialize;

use crate::components::{ActorId, GameConfig, TickClock};
use crate::coordinator::{PhysicsCoordinator, PhysicsQuery};
use crate::events::ChangeNotifier;
use crate::platforms::PlatformSet;
use crate::schedule::TickSet;
use crate::stats::{heal, Health};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RespawnPhase {
    #[default]
    Active,
    FallingOutOfBounds,
    Dead,
    Respawning,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RespawnReason {
    OutOfBounds,
    Death,
    Checkpoint,
}

/// Single-use reset instruction produced when an invalid world state is
/// detected and consumed by the physics coordinator.
#[derive(Clone, Debug, Serialize)]
pub struct RespawnState {
    pub position: (f32, f32),
    /// Zero by policy; a respawned body never inherits momentum.
    pub velocity: (f32, f32),
    pub reset_forces: bool,
    pub reason: RespawnReason,
    pub is_safe_respawn: bool,
    pub metadata: serde_json::Value,
}

impl RespawnState {
    pub fn out_of_bounds(position: (f32, f32)) -> Self {
        Self {
            position,
            velocity: (0.0, 0.0),
            reset_forces: true,
            reason: RespawnReason::OutOfBounds,
            is_safe_respawn: true,
            metadata: serde_json::json!({}),
        }
    }

    pub fn death(position: (f32, f32)) -> Self {
        Self {
            position,
            velocity: (0.0, 0.0),
            reset_forces: true,
            reason: RespawnReason::Death,
            is_safe_respawn: false,
            metadata: serde_json::json!({}),
        }
    }

    pub fn checkpoint(position: (f32, f32)) -> Self {
        Self {
            position,
            velocity: (0.0, 0.0),
            reset_forces: true,
            reason: RespawnReason::Checkpoint,
            is_safe_respawn: true,
            metadata: serde_json::json!({}),
        }
    }
}

/// Per-actor respawn bookkeeping.
#[derive(Component, Clone, Debug)]
pub struct RespawnTracker {
    pub phase: RespawnPhase,
    pub last_safe_position: (f32, f32),
    expected_position: Option<(f32, f32)>,
}

impl RespawnTracker {
    pub fn new(spawn: (f32, f32)) -> Self {
        Self {
            phase: RespawnPhase::Active,
            last_safe_position: spawn,
            expected_position: None,
        }
    }
}

/// Watch for invalid world state and turn it into reset instructions. Reads
/// go through the coordinator's committed snapshots and the reset itself
/// goes back through the coordinator, so the store stays the only source and
/// mutator of physics truth.
pub fn monitor_world_state(
    config: Res<GameConfig>,
    platforms: Res<PlatformSet>,
    clock: Res<TickClock>,
    mut coordinator: ResMut<PhysicsCoordinator>,
    mut notifier: ResMut<ChangeNotifier>,
    mut actors: Query<(&ActorId, &mut RespawnTracker, Option<&mut Health>)>,
) {
    for (id, mut tracker, health) in actors.iter_mut() {
        let Some(snapshot) = coordinator.snapshot(id.0) else {
            continue;
        };
        match tracker.phase {
            RespawnPhase::Active => {
                if snapshot.on_ground {
                    tracker.last_safe_position = snapshot.position;
                }
                if snapshot.position.1 < config.fall_threshold_y {
                    tracker.phase = RespawnPhase::FallingOutOfBounds;
                } else if health.as_ref().is_some_and(|h| h.is_dead()) {
                    tracker.phase = RespawnPhase::Dead;
                }
            }
            RespawnPhase::FallingOutOfBounds => {
                let state = RespawnState::out_of_bounds(tracker.last_safe_position);
                tracker.expected_position = Some(state.position);
                info!(
                    "[Aetherfall] actor {} fell out of bounds, respawning at ({}, {})",
                    id.0, state.position.0, state.position.1
                );
                coordinator.reset_from(id.0, state);
                tracker.phase = RespawnPhase::Respawning;
            }
            RespawnPhase::Dead => {
                let spawn = platforms.checkpoint.unwrap_or(platforms.player_spawn);
                let state = RespawnState::death(spawn);
                tracker.expected_position = Some(state.position);
                info!(
                    "[Aetherfall] actor {} died, respawning at checkpoint ({}, {})",
                    id.0, spawn.0, spawn.1
                );
                coordinator.reset_from(id.0, state);
                if let Some(mut health) = health {
                    let missing = health.max - health.current;
                    heal(&mut health, missing, id.0, "respawn", &mut notifier, clock.frame);
                }
                tracker.phase = RespawnPhase::Respawning;
            }
            RespawnPhase::Respawning => {}
        }
    }
}

/// Flip respawning actors back to active once the coordinator confirms the
/// reset position was applied.
pub fn confirm_respawns(
    coordinator: Res<PhysicsCoordinator>,
    mut actors: Query<(&ActorId, &mut RespawnTracker)>,
) {
    for (id, mut tracker) in actors.iter_mut() {
        if tracker.phase != RespawnPhase::Respawning {
            continue;
        }
        let Some(expected) = tracker.expected_position else {
            tracker.phase = RespawnPhase::Active;
            continue;
        };
        let confirmed = coordinator
            .position(id.0)
            .is_some_and(|(x, y)| (x - expected.0).abs() < 0.5 && (y - expected.1).abs() < 0.5);
        if confirmed {
            tracker.phase = RespawnPhase::Active;
            tracker.expected_position = None;
        }
    }
}

pub struct RespawnPlugin;

impl Plugin for RespawnPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(FixedUpdate, monitor_world_state.in_set(TickSet::Respawn))
            .add_systems(FixedUpdate, confirm_respawns.in_set(TickSet::Confirm));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_respawn_is_safe_with_zero_velocity() {
        let state = RespawnState::out_of_bounds((10.0, 20.0));
        assert_eq!(state.velocity, (0.0, 0.0));
        assert!(state.is_safe_respawn);
        assert!(state.reset_forces);
        assert_eq!(state.reason, RespawnReason::OutOfBounds);
    }

    #[test]
    fn death_respawn_is_not_safe() {
        let state = RespawnState::death((0.0, 0.0));
        assert!(!state.is_safe_respawn);
        assert_eq!(state.reason, RespawnReason::Death);
    }

    #[test]
    fn checkpoint_respawn_is_safe() {
        let state = RespawnState::checkpoint((5.0, 5.0));
        assert!(state.is_safe_respawn);
        assert_eq!(state.reason, RespawnReason::Checkpoint);
    }
}
