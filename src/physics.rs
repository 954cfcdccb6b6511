use std::collections::HashMap;

use bevy::prelude::*;

use crate::components::{
    ActorId, Body, Collider, EdgeProximity, Forces, GameConfig, GamePosition, Grounded,
    SurfaceMaterial, TickClock, Velocity,
};
use crate::edge_detection::{detect_edges, EntityBox};
use crate::events::{ChangeEvent, ChangeKind, ChangeNotifier};
use crate::physics_core::{
    accumulate_gravity, apply_forces, apply_friction, clamp_speeds, integrate, StepParams,
};
use crate::platforms::PlatformSet;
use crate::schedule::TickSet;

/// Per-actor integration outcome for the tick, consumed by the movement
/// coordinator's retry policy.
#[derive(Clone, Copy, Debug)]
pub struct MotionOutcome {
    pub blocked_x: bool,
    pub frame: u64,
}

#[derive(Resource, Default)]
pub struct MotionOutcomes(HashMap<u64, MotionOutcome>);

impl MotionOutcomes {
    pub fn record(&mut self, actor: u64, outcome: MotionOutcome) {
        self.0.insert(actor, outcome);
    }

    /// True when the actor's horizontal motion was blocked during `frame`.
    pub fn was_blocked(&self, actor: u64, frame: u64) -> bool {
        self.0
            .get(&actor)
            .is_some_and(|o| o.blocked_x && o.frame == frame)
    }

    pub fn contains(&self, actor: u64) -> bool {
        self.0.contains_key(&actor)
    }

    pub(crate) fn forget(&mut self, actor: u64) {
        self.0.remove(&actor);
    }
}

/// Authoritative per-tick update for every registered body. Static bodies
/// are registered but never moved.
#[allow(clippy::type_complexity)]
pub fn step_bodies(
    config: Res<GameConfig>,
    platforms: Res<PlatformSet>,
    clock: Res<TickClock>,
    mut outcomes: ResMut<MotionOutcomes>,
    mut bodies: Query<(
        &ActorId,
        &Body,
        &Collider,
        &mut GamePosition,
        &mut Velocity,
        &mut Forces,
        &mut Grounded,
    )>,
) {
    let dt = config.dt;

    for (id, body, collider, mut position, mut velocity, mut forces, mut grounded) in
        bodies.iter_mut()
    {
        // Reborrow through the Mut smart pointer once so field projections
        // below are disjoint plain borrows.
        let velocity = &mut *velocity;
        if body.is_static {
            forces.x = 0.0;
            forces.y = 0.0;
            continue;
        }

        let was_on_ground = grounded.on_ground;

        if body.affected_by_gravity && !grounded.on_ground {
            accumulate_gravity(
                &mut forces.y,
                body.mass,
                velocity.y,
                config.gravity,
                config.fall_multiplier,
            );
        }

        apply_forces(
            &mut velocity.x,
            &mut velocity.y,
            forces.x,
            forces.y,
            body.mass,
            dt,
        );
        forces.x = 0.0;
        forces.y = 0.0;

        let coefficient = if grounded.on_ground {
            config.ground_friction
        } else {
            config.air_friction
        } * body.friction;
        apply_friction(&mut velocity.x, coefficient);

        let result = integrate(
            &platforms,
            StepParams {
                dt,
                x: position.x,
                y: position.y,
                vx: velocity.x,
                vy: velocity.y,
                width: collider.width,
                height: collider.height,
                restitution: body.restitution,
            },
        );
        position.x = result.x;
        position.y = result.y;
        velocity.x = result.vx;
        velocity.y = result.vy;

        // Clamping happens after integration and before edge detection.
        clamp_speeds(
            &mut velocity.x,
            &mut velocity.y,
            config.max_horizontal_speed,
            config.max_fall_speed,
        );

        let bottom = position.y - collider.height / 2.0;
        let support = platforms.support_for(
            position.x - collider.width / 2.0,
            position.x + collider.width / 2.0,
            bottom,
            config.support_tolerance,
        );

        grounded.on_ground = support.is_some();
        if grounded.on_ground && !was_on_ground {
            // Landing transition: vertical velocity dies with the contact.
            velocity.y = 0.0;
            grounded.just_landed = true;
            grounded.surface = result
                .landed_on
                .or(support.map(|p| p.material))
                .unwrap_or(SurfaceMaterial::None);
        } else {
            grounded.just_landed = false;
            grounded.surface = support.map_or(SurfaceMaterial::None, |p| p.material);
        }

        outcomes.record(
            id.0,
            MotionOutcome {
                blocked_x: result.blocked_x,
                frame: clock.frame,
            },
        );
    }
}

/// Recompute edge proximity from current positions, emitting a change event
/// whenever an actor's near-edge state flips.
pub fn refresh_edge_proximity(
    config: Res<GameConfig>,
    platforms: Res<PlatformSet>,
    clock: Res<TickClock>,
    mut notifier: ResMut<ChangeNotifier>,
    mut bodies: Query<(&ActorId, &GamePosition, &Collider, &mut EdgeProximity)>,
) {
    for (id, position, collider, mut edges) in bodies.iter_mut() {
        let was_near = edges.near_any();
        let report = detect_edges(
            EntityBox {
                left: position.x - collider.width / 2.0,
                right: position.x + collider.width / 2.0,
                bottom: position.y - collider.height / 2.0,
            },
            &platforms,
            config.edge_threshold,
            config.support_tolerance,
        );

        edges.near_left = report.near_left;
        edges.near_right = report.near_right;
        edges.left_distance = report.left_distance;
        edges.right_distance = report.right_distance;
        edges.left_edge = report.left_edge;
        edges.right_edge = report.right_edge;

        if report.near_any() != was_near {
            notifier.emit(ChangeEvent::new(
                id.0,
                ChangeKind::NearEdgeChanged,
                if was_near { 1.0 } else { 0.0 },
                if report.near_any() { 1.0 } else { 0.0 },
                "edge_proximity",
                clock.frame,
            ));
        }
    }
}

pub struct PhysicsPlugin;

impl Plugin for PhysicsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<MotionOutcomes>()
            .add_systems(FixedUpdate, step_bodies.in_set(TickSet::Step))
            .add_systems(FixedUpdate, refresh_edge_proximity.in_set(TickSet::Edges));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_outcomes_only_report_blocks_for_the_same_frame() {
        let mut outcomes = MotionOutcomes::default();
        outcomes.record(
            1,
            MotionOutcome {
                blocked_x: true,
                frame: 5,
            },
        );
        assert!(outcomes.was_blocked(1, 5));
        assert!(!outcomes.was_blocked(1, 6));
        assert!(!outcomes.was_blocked(2, 5));
    }
}
