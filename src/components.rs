use bevy::prelude::*;

/// Stable identifier for simulated actors, decoupled from ECS entity allocation
/// so coordinator requests can be keyed without holding entity references.
#[derive(Component, Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize)]
pub struct ActorId(pub u64);

#[derive(Resource, Default)]
pub struct NextActorId(pub u64);

/// Marks the player entity
#[derive(Component)]
pub struct Player;

/// World-space position in world units
#[derive(Component, Clone, Copy, Default, Debug)]
pub struct GamePosition {
    pub x: f32,
    pub y: f32,
}

/// Velocity in world units per second
#[derive(Component, Clone, Copy, Default, Debug)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}

/// Per-tick force accumulator, cleared after integration
#[derive(Component, Clone, Copy, Default, Debug)]
pub struct Forces {
    pub x: f32,
    pub y: f32,
}

/// Mass and material response of a simulated body.
#[derive(Component, Clone, Copy, Debug)]
pub struct Body {
    pub mass: f32,
    /// Per-body friction scale, multiplied with the world coefficient.
    pub friction: f32,
    /// Bounce factor applied when a rising body hits a ceiling.
    pub restitution: f32,
    /// Static bodies never have velocity mutated by gravity, friction,
    /// or knockback.
    pub is_static: bool,
    pub affected_by_gravity: bool,
}

impl Default for Body {
    fn default() -> Self {
        Self {
            mass: 1.0,
            friction: 1.0,
            restitution: 0.0,
            is_static: false,
            affected_by_gravity: true,
        }
    }
}

/// Collision box dimensions, centered on GamePosition
#[derive(Component, Clone, Copy, Debug)]
pub struct Collider {
    pub width: f32,
    pub height: f32,
}

/// Surface tag of the platform currently supporting an entity.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Debug, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceMaterial {
    #[default]
    None,
    Water,
    Grass,
    Stone,
    Metal,
}

/// Ground contact state. `just_landed` is true only on the tick contact is
/// newly acquired and is cleared the following tick.
#[derive(Component, Clone, Copy, Default, Debug)]
pub struct Grounded {
    pub on_ground: bool,
    pub just_landed: bool,
    pub surface: SurfaceMaterial,
}

/// Distances to the supporting platform's edges, recomputed every tick.
#[derive(Component, Clone, Copy, Debug)]
pub struct EdgeProximity {
    pub near_left: bool,
    pub near_right: bool,
    pub left_distance: f32,
    pub right_distance: f32,
    pub left_edge: Option<(f32, f32)>,
    pub right_edge: Option<(f32, f32)>,
}

impl Default for EdgeProximity {
    fn default() -> Self {
        Self {
            near_left: false,
            near_right: false,
            left_distance: f32::INFINITY,
            right_distance: f32::INFINITY,
            left_edge: None,
            right_edge: None,
        }
    }
}

impl EdgeProximity {
    pub fn near_any(&self) -> bool {
        self.near_left || self.near_right
    }
}

/// Input-derived movement flags. Reset wholesale when a respawn is applied so
/// stale input cannot resume motion afterwards.
#[derive(Component, Clone, Copy, Default, Debug)]
pub struct InputFlags {
    pub moving_left: bool,
    pub moving_right: bool,
    pub jumping: bool,
    pub jump_buffered: bool,
}

/// Fixed-tick clock advanced at the head of every simulation tick.
#[derive(Resource, Default)]
pub struct TickClock {
    pub frame: u64,
}

impl TickClock {
    /// Simulation time in seconds, derived from the frame count so request
    /// timestamps stay reproducible across runs.
    pub fn seconds(&self, dt: f32) -> f64 {
        self.frame as f64 * dt as f64
    }
}

pub fn advance_tick_clock(mut clock: ResMut<TickClock>) {
    clock.frame = clock.frame.saturating_add(1);
}

/// Tuning constants (as a resource so they can be loaded from JSON)
#[derive(Resource, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub gravity: f32,
    pub move_speed: f32,
    pub jump_velocity: f32,
    pub dash_speed: f32,
    pub dash_energy_cost: f32,
    pub fall_multiplier: f32,
    pub max_fall_speed: f32,
    pub max_horizontal_speed: f32,
    pub ground_friction: f32,
    pub air_friction: f32,
    pub coyote_frames: u32,
    pub jump_buffer_frames: u32,
    pub edge_threshold: f32,
    pub support_tolerance: f32,
    pub fall_threshold_y: f32,
    pub rapid_input_hz: f64,
    pub retry_fraction: f32,
    pub fallback_speed_multiplier: f32,
    pub max_retries: u32,
    pub dt: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            gravity: 980.0,
            move_speed: 200.0,
            jump_velocity: 400.0,
            dash_speed: 520.0,
            dash_energy_cost: 25.0,
            fall_multiplier: 1.5,
            max_fall_speed: 800.0,
            max_horizontal_speed: 400.0,
            ground_friction: 0.8,
            // Strictly smaller than ground friction, never zero.
            air_friction: 0.2,
            coyote_frames: 5,
            jump_buffer_frames: 4,
            edge_threshold: 40.0,
            support_tolerance: 2.0,
            fall_threshold_y: -100.0,
            rapid_input_hz: 20.0,
            retry_fraction: 0.75,
            fallback_speed_multiplier: 0.9,
            max_retries: 3,
            dt: 1.0 / 60.0,
        }
    }
}

impl GameConfig {
    /// Load tuning from the file named by `AETHERFALL_CONFIG` (default
    /// `aetherfall.json`), falling back to defaults on any failure.
    pub fn load_or_default() -> Self {
        let path = std::env::var("AETHERFALL_CONFIG")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "aetherfall.json".to_string());
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(cfg) => {
                    info!("[Aetherfall] Loaded config from {}", path);
                    cfg
                }
                Err(e) => {
                    warn!("[Aetherfall] Failed to parse {}: {}", path, e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn air_friction_is_strictly_below_ground_friction() {
        let config = GameConfig::default();
        assert!(config.air_friction > 0.0);
        assert!(config.air_friction < config.ground_friction);
    }

    #[test]
    fn tick_clock_seconds_follow_frame_count() {
        let clock = TickClock { frame: 120 };
        let seconds = clock.seconds(1.0 / 60.0);
        assert!((seconds - 2.0).abs() < 1e-9);
    }

    #[test]
    fn edge_proximity_defaults_to_unsupported() {
        let edges = EdgeProximity::default();
        assert!(!edges.near_any());
        assert!(edges.left_distance.is_infinite());
        assert!(edges.right_distance.is_infinite());
    }
}
