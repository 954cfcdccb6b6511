use bevy::prelude::*;
use std::collections::HashSet;

use crate::components::{ActorId, GameConfig, InputFlags, Player, TickClock};
use crate::movement::MovementCoordinator;
use crate::schedule::TickSet;

/// Abstraction layer between raw input and the movement coordinator.
/// Keyboard (windowed) and scenario scripts (headless) both write to this.
#[derive(Resource, Default, Clone)]
pub struct VirtualInput {
    pub active: HashSet<String>,
    pub just_pressed: HashSet<String>,
    pub just_released: HashSet<String>,
}

impl VirtualInput {
    pub fn pressed(&self, action: &str) -> bool {
        self.active.contains(action)
    }

    pub fn just_pressed(&self, action: &str) -> bool {
        self.just_pressed.contains(action)
    }

    /// Script-side press: active from this tick until `release`.
    pub fn press(&mut self, action: &str) {
        if self.active.insert(action.to_string()) {
            self.just_pressed.insert(action.to_string());
        }
    }

    pub fn release(&mut self, action: &str) {
        if self.active.remove(action) {
            self.just_released.insert(action.to_string());
        }
    }

    pub fn clear_frame(&mut self) {
        self.just_pressed.clear();
        self.just_released.clear();
    }
}

/// Translate held/edge-triggered actions into movement requests for the
/// player actor. The coordinator does all validation; this layer only maps
/// action names to intents.
pub fn emit_movement_intents(
    mut vinput: ResMut<VirtualInput>,
    mut movement: ResMut<MovementCoordinator>,
    config: Res<GameConfig>,
    clock: Res<TickClock>,
    mut players: Query<(&ActorId, &mut InputFlags), With<Player>>,
) {
    let now = clock.seconds(config.dt);

    for (id, mut flags) in players.iter_mut() {
        let left = vinput.pressed("move_left");
        let right = vinput.pressed("move_right");

        if vinput.just_pressed("jump") {
            movement.handle_jump_input(id.0, config.jump_velocity, true, now);
        }
        if vinput.just_released.contains("jump") {
            // Release ends the variable-height window.
            flags.jumping = false;
        }

        if vinput.just_pressed("dash") {
            let dx = (right as i32 - left as i32) as f32;
            movement.handle_dash_input(id.0, (dx, 0.0), now);
        }

        if vinput.just_pressed("crouch") {
            movement.handle_crouch_input(id.0, now);
        }

        if left != right {
            let dir = if left { (-1.0, 0.0) } else { (1.0, 0.0) };
            movement.handle_movement_input(id.0, dir, config.move_speed, now);
        } else if (flags.moving_left || flags.moving_right) || vinput.just_pressed("stop") {
            movement.handle_stop_input(id.0, now);
        }
    }

    vinput.clear_frame();
}

pub struct ControllerPlugin;

impl Plugin for ControllerPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<VirtualInput>()
            .add_systems(FixedUpdate, emit_movement_intents.in_set(TickSet::Controller));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_is_edge_triggered_once() {
        let mut vinput = VirtualInput::default();
        vinput.press("jump");
        assert!(vinput.pressed("jump"));
        assert!(vinput.just_pressed("jump"));

        vinput.clear_frame();
        vinput.press("jump");
        // Already held, no new edge.
        assert!(vinput.pressed("jump"));
        assert!(!vinput.just_pressed("jump"));
    }

    #[test]
    fn release_only_fires_for_held_actions() {
        let mut vinput = VirtualInput::default();
        vinput.release("jump");
        assert!(vinput.just_released.is_empty());

        vinput.press("jump");
        vinput.clear_frame();
        vinput.release("jump");
        assert!(vinput.just_released.contains("jump"));
        assert!(!vinput.pressed("jump"));
    }
}
