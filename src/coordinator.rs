use std::cell::Cell;
use std::collections::{HashMap, VecDeque};

use bevy::prelude::*;

use crate::components::{
    ActorId, Body, EdgeProximity, Forces, GamePosition, Grounded, InputFlags, SurfaceMaterial,
    TickClock, Velocity,
};
use crate::respawn::RespawnState;
use crate::schedule::TickSet;

/// Committed physics truth for one actor, published after every mutation
/// point in the tick. Reads through the coordinator never see half-applied
/// state.
#[derive(Clone, Copy, Debug, serde::Serialize)]
pub struct Snapshot {
    pub position: (f32, f32),
    pub velocity: (f32, f32),
    pub on_ground: bool,
    pub just_landed: bool,
    pub surface: SurfaceMaterial,
    pub near_left_edge: bool,
    pub near_right_edge: bool,
    pub frame: u64,
}

/// Mutations other systems may request against the store. Commands are
/// applied in issuance order at fixed drain points within the same tick.
#[derive(Clone, Debug)]
pub enum PhysicsCommand {
    ApplyImpulse { actor: u64, x: f32, y: f32 },
    SetVelocityX { actor: u64, vx: f32 },
    SetVelocityY { actor: u64, vy: f32 },
    SetPosition { actor: u64, x: f32, y: f32 },
    ClearForces { actor: u64 },
    ResetFrom { actor: u64, state: RespawnState },
}

/// Read access to committed physics state, keyed by actor id. Exactly one
/// primary implementation exists (the coordinator); the cached fallback is
/// reserved for explicitly degraded consumers.
pub trait PhysicsQuery {
    fn position(&self, actor: u64) -> Option<(f32, f32)>;
    fn velocity(&self, actor: u64) -> Option<(f32, f32)>;
    fn is_grounded(&self, actor: u64) -> Option<bool>;
    fn snapshot(&self, actor: u64) -> Option<Snapshot>;
}

/// Request/response façade in front of the physics store. The only path by
/// which other systems read or influence physics state.
#[derive(Resource, Default)]
pub struct PhysicsCoordinator {
    queue: VecDeque<PhysicsCommand>,
    ledger: HashMap<u64, Snapshot>,
}

impl PhysicsCoordinator {
    pub fn submit(&mut self, command: PhysicsCommand) {
        self.queue.push_back(command);
    }

    pub fn apply_impulse(&mut self, actor: u64, x: f32, y: f32) {
        self.submit(PhysicsCommand::ApplyImpulse { actor, x, y });
    }

    pub fn set_position(&mut self, actor: u64, x: f32, y: f32) {
        self.submit(PhysicsCommand::SetPosition { actor, x, y });
    }

    pub fn clear_forces(&mut self, actor: u64) {
        self.submit(PhysicsCommand::ClearForces { actor });
    }

    pub fn reset_from(&mut self, actor: u64, state: RespawnState) {
        self.submit(PhysicsCommand::ResetFrom { actor, state });
    }

    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn drain(&mut self) -> Vec<PhysicsCommand> {
        self.queue.drain(..).collect()
    }

    pub(crate) fn commit(&mut self, actor: u64, snapshot: Snapshot) {
        self.ledger.insert(actor, snapshot);
    }

    pub(crate) fn forget(&mut self, actor: u64) {
        self.ledger.remove(&actor);
    }
}

impl PhysicsQuery for PhysicsCoordinator {
    fn position(&self, actor: u64) -> Option<(f32, f32)> {
        self.ledger.get(&actor).map(|s| s.position)
    }

    fn velocity(&self, actor: u64) -> Option<(f32, f32)> {
        self.ledger.get(&actor).map(|s| s.velocity)
    }

    fn is_grounded(&self, actor: u64) -> Option<bool> {
        self.ledger.get(&actor).map(|s| s.on_ground)
    }

    fn snapshot(&self, actor: u64) -> Option<Snapshot> {
        self.ledger.get(&actor).copied()
    }
}

/// Read path for consumers wired up before (or without) a coordinator. Serves
/// the last locally cached state instead of failing, but every access is
/// counted and logged as an unauthorized direct read so partial
/// initialization cannot silently become the normal path.
pub struct CachedPhysicsFallback {
    cache: HashMap<u64, Snapshot>,
    pub degraded: bool,
    unauthorized_reads: Cell<u64>,
}

impl CachedPhysicsFallback {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
            degraded: true,
            unauthorized_reads: Cell::new(0),
        }
    }

    /// Record the most recent state this consumer saw while a coordinator
    /// was still reachable.
    pub fn prime(&mut self, actor: u64, snapshot: Snapshot) {
        self.cache.insert(actor, snapshot);
    }

    pub fn unauthorized_reads(&self) -> u64 {
        self.unauthorized_reads.get()
    }

    fn flag_read(&self, actor: u64) {
        self.unauthorized_reads.set(self.unauthorized_reads.get() + 1);
        warn!(
            "[Aetherfall] unauthorized direct physics read for actor {} (degraded mode)",
            actor
        );
    }
}

impl Default for CachedPhysicsFallback {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsQuery for CachedPhysicsFallback {
    fn position(&self, actor: u64) -> Option<(f32, f32)> {
        self.flag_read(actor);
        self.cache.get(&actor).map(|s| s.position)
    }

    fn velocity(&self, actor: u64) -> Option<(f32, f32)> {
        self.flag_read(actor);
        self.cache.get(&actor).map(|s| s.velocity)
    }

    fn is_grounded(&self, actor: u64) -> Option<bool> {
        self.flag_read(actor);
        self.cache.get(&actor).map(|s| s.on_ground)
    }

    fn snapshot(&self, actor: u64) -> Option<Snapshot> {
        self.flag_read(actor);
        self.cache.get(&actor).copied()
    }
}

/// Entity -> actor id mapping used to tear state down on despawn.
#[derive(Resource, Default)]
pub struct ActorIndex(pub HashMap<Entity, u64>);

pub type CommandTargets<'w, 's> = Query<
    'w,
    's,
    (
        &'static ActorId,
        &'static Body,
        &'static EdgeProximity,
        &'static mut GamePosition,
        &'static mut Velocity,
        &'static mut Forces,
        &'static mut Grounded,
        Option<&'static mut InputFlags>,
    ),
>;

fn snapshot_of(
    position: &GamePosition,
    velocity: &Velocity,
    grounded: &Grounded,
    edges: &EdgeProximity,
    frame: u64,
) -> Snapshot {
    Snapshot {
        position: (position.x, position.y),
        velocity: (velocity.x, velocity.y),
        on_ground: grounded.on_ground,
        just_landed: grounded.just_landed,
        surface: grounded.surface,
        near_left_edge: grounded.on_ground && edges.near_left,
        near_right_edge: grounded.on_ground && edges.near_right,
        frame,
    }
}

/// Apply every queued command against the store and commit fresh snapshots
/// for the touched actors.
fn apply_commands(
    coordinator: &mut PhysicsCoordinator,
    targets: &mut CommandTargets,
    frame: u64,
) {
    for command in coordinator.drain() {
        let wanted = match &command {
            PhysicsCommand::ApplyImpulse { actor, .. }
            | PhysicsCommand::SetVelocityX { actor, .. }
            | PhysicsCommand::SetVelocityY { actor, .. }
            | PhysicsCommand::SetPosition { actor, .. }
            | PhysicsCommand::ClearForces { actor }
            | PhysicsCommand::ResetFrom { actor, .. } => *actor,
        };
        let Some((id, body, edges, mut position, mut velocity, mut forces, mut grounded, flags)) =
            targets
                .iter_mut()
                .find(|(id, ..)| id.0 == wanted)
        else {
            warn!("[Aetherfall] dropped physics command for unknown actor {}", wanted);
            continue;
        };

        match command {
            PhysicsCommand::ApplyImpulse { x, y, .. } => {
                if body.is_static {
                    debug!("[Aetherfall] ignored impulse on static actor {}", id.0);
                } else {
                    velocity.x += x;
                    velocity.y += y;
                }
            }
            PhysicsCommand::SetVelocityX { vx, .. } => {
                if !body.is_static {
                    velocity.x = vx;
                }
            }
            PhysicsCommand::SetVelocityY { vy, .. } => {
                if !body.is_static {
                    velocity.y = vy;
                }
            }
            PhysicsCommand::SetPosition { x, y, .. } => {
                position.x = x;
                position.y = y;
            }
            PhysicsCommand::ClearForces { .. } => {
                forces.x = 0.0;
                forces.y = 0.0;
            }
            PhysicsCommand::ResetFrom { state, .. } => {
                position.x = state.position.0;
                position.y = state.position.1;
                velocity.x = state.velocity.0;
                velocity.y = state.velocity.1;
                if state.reset_forces {
                    forces.x = 0.0;
                    forces.y = 0.0;
                }
                grounded.on_ground = false;
                grounded.just_landed = false;
                grounded.surface = SurfaceMaterial::None;
                if let Some(mut flags) = flags {
                    *flags = InputFlags::default();
                }
            }
        }

        let snapshot = snapshot_of(&position, &velocity, &grounded, edges, frame);
        coordinator.commit(id.0, snapshot);
    }
}

pub fn drain_commands_pre_step(
    mut coordinator: ResMut<PhysicsCoordinator>,
    mut targets: CommandTargets,
    clock: Res<TickClock>,
) {
    apply_commands(&mut coordinator, &mut targets, clock.frame);
}

pub fn drain_commands_post_combat(
    mut coordinator: ResMut<PhysicsCoordinator>,
    mut targets: CommandTargets,
    clock: Res<TickClock>,
) {
    apply_commands(&mut coordinator, &mut targets, clock.frame);
}

pub fn drain_commands_post_respawn(
    mut coordinator: ResMut<PhysicsCoordinator>,
    mut targets: CommandTargets,
    clock: Res<TickClock>,
) {
    apply_commands(&mut coordinator, &mut targets, clock.frame);
}

/// Full ledger refresh after the integration step.
pub fn publish_snapshots(
    mut coordinator: ResMut<PhysicsCoordinator>,
    clock: Res<TickClock>,
    bodies: Query<(&ActorId, &GamePosition, &Velocity, &Grounded, &EdgeProximity)>,
) {
    for (id, position, velocity, grounded, edges) in bodies.iter() {
        let snapshot = snapshot_of(position, velocity, grounded, edges, clock.frame);
        coordinator.commit(id.0, snapshot);
    }
}

pub fn index_new_actors(
    mut index: ResMut<ActorIndex>,
    added: Query<(Entity, &ActorId), Added<ActorId>>,
) {
    for (entity, id) in added.iter() {
        index.0.insert(entity, id.0);
    }
}

/// Drop every piece of per-actor state for despawned actors: the snapshot
/// ledger, registered observers, motion outcomes, and the movement
/// coordinator's bookkeeping.
pub fn forget_removed_actors(
    mut removed: RemovedComponents<ActorId>,
    mut index: ResMut<ActorIndex>,
    mut coordinator: ResMut<PhysicsCoordinator>,
    mut notifier: ResMut<crate::events::ChangeNotifier>,
    mut outcomes: ResMut<crate::physics::MotionOutcomes>,
    mut movement: ResMut<crate::movement::MovementCoordinator>,
) {
    for entity in removed.read() {
        if let Some(actor) = index.0.remove(&entity) {
            coordinator.forget(actor);
            notifier.teardown(actor);
            outcomes.forget(actor);
            movement.forget_actor(actor);
        }
    }
}

pub struct CoordinatorPlugin;

impl Plugin for CoordinatorPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PhysicsCoordinator>()
            .init_resource::<ActorIndex>()
            .init_resource::<crate::components::TickClock>()
            .init_resource::<crate::components::NextActorId>()
            .init_resource::<crate::events::ChangeNotifier>()
            .add_systems(
                FixedUpdate,
                (
                    crate::components::advance_tick_clock,
                    index_new_actors,
                    forget_removed_actors,
                )
                    .chain()
                    .in_set(TickSet::Housekeeping),
            )
            .add_systems(
                FixedUpdate,
                drain_commands_pre_step.in_set(TickSet::ApplyRequests),
            )
            .add_systems(FixedUpdate, publish_snapshots.in_set(TickSet::Publish))
            .add_systems(
                FixedUpdate,
                drain_commands_post_combat.in_set(TickSet::ApplyCombat),
            )
            .add_systems(
                FixedUpdate,
                drain_commands_post_respawn.in_set(TickSet::ApplyRespawn),
            );
    }
}
