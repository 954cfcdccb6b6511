use bevy::prelude::*;

/// Fixed per-tick stage order: controller intent, movement validation,
/// command application, integration, edge detection, snapshot publication,
/// response resolution, combat, and respawn handling. Single-threaded and
/// cooperative; no system preempts another mid-tick.
#[derive(SystemSet, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TickSet {
    Housekeeping,
    Controller,
    Movement,
    ApplyRequests,
    Step,
    Edges,
    Publish,
    Resolve,
    Combat,
    ApplyCombat,
    Respawn,
    ApplyRespawn,
    Confirm,
}

/// Everything the headless core needs, wired in tick order.
pub struct AetherfallCorePlugin;

impl Plugin for AetherfallCorePlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            FixedUpdate,
            (
                TickSet::Housekeeping,
                TickSet::Controller,
                TickSet::Movement,
                TickSet::ApplyRequests,
                TickSet::Step,
                TickSet::Edges,
                TickSet::Publish,
                TickSet::Resolve,
                TickSet::Combat,
                TickSet::ApplyCombat,
                TickSet::Respawn,
                TickSet::ApplyRespawn,
                TickSet::Confirm,
            )
                .chain(),
        )
        .add_plugins((
            crate::platforms::PlatformsPlugin,
            crate::coordinator::CoordinatorPlugin,
            crate::controller::ControllerPlugin,
            crate::movement::MovementPlugin,
            crate::physics::PhysicsPlugin,
            crate::combat::CombatPlugin,
            crate::respawn::RespawnPlugin,
        ));
    }
}
