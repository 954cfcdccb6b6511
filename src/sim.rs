use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::{
    ActorId, Body, Collider, EdgeProximity, Forces, GameConfig, GamePosition, Grounded, InputFlags,
    NextActorId, Player, Velocity,
};
use crate::controller::VirtualInput;
use crate::coordinator::{PhysicsCoordinator, PhysicsQuery};
use crate::events::{ChangeEvent, ChangeNotifier};
use crate::movement::MovementState;
use crate::platforms::PlatformSet;
use crate::respawn::RespawnTracker;
use crate::schedule::AetherfallCorePlugin;
use crate::stats::{Energy, Health, Progress};

const PLAYER_WIDTH: f32 = 12.0;
const PLAYER_HEIGHT: f32 = 14.0;

/// Headless simulation wrapper around the core plugin. Scenario scripts and
/// system tests drive the fixed schedule directly, one tick per call, so runs
/// are reproducible without a wall clock.
pub struct SimHarness {
    pub app: App,
    pub player: u64,
}

impl SimHarness {
    pub fn new(config: GameConfig, level: PlatformSet) -> Self {
        let mut app = App::new();
        app.insert_resource(config)
            .insert_resource(level)
            .add_plugins(AetherfallCorePlugin);
        Self { app, player: 0 }
    }

    fn next_actor_id(&mut self) -> u64 {
        let mut next = self.app.world_mut().resource_mut::<NextActorId>();
        next.0 += 1;
        next.0
    }

    /// Spawn the full player bundle at the level spawn point.
    pub fn spawn_player(&mut self) -> u64 {
        let id = self.next_actor_id();
        let spawn = self.app.world().resource::<PlatformSet>().player_spawn;
        self.app.world_mut().spawn((
            ActorId(id),
            Player,
            GamePosition {
                x: spawn.0,
                y: spawn.1,
            },
            Velocity::default(),
            Forces::default(),
            Body::default(),
            Collider {
                width: PLAYER_WIDTH,
                height: PLAYER_HEIGHT,
            },
            Grounded::default(),
            EdgeProximity::default(),
            InputFlags::default(),
            MovementState::default(),
            RespawnTracker::new(spawn),
            Health::new(100.0),
            Energy::new(100.0),
            Progress::default(),
        ));
        self.player = id;
        id
    }

    /// Spawn a non-player actor with health. Carries movement state so combat
    /// and movement scenarios can drive it directly, but no virtual-input
    /// wiring.
    pub fn spawn_target(&mut self, x: f32, y: f32, health: f32) -> u64 {
        let id = self.next_actor_id();
        self.app.world_mut().spawn((
            ActorId(id),
            GamePosition { x, y },
            Velocity::default(),
            Forces::default(),
            Body::default(),
            Collider {
                width: PLAYER_WIDTH,
                height: PLAYER_HEIGHT,
            },
            Grounded::default(),
            EdgeProximity::default(),
            InputFlags::default(),
            MovementState::default(),
            Health::new(health),
        ));
        id
    }

    pub fn tick(&mut self) {
        self.app.world_mut().run_schedule(FixedUpdate);
    }

    pub fn tick_n(&mut self, n: u32) {
        for _ in 0..n {
            self.tick();
        }
    }

    pub fn press(&mut self, action: &str) {
        self.app
            .world_mut()
            .resource_mut::<VirtualInput>()
            .press(action);
    }

    pub fn release(&mut self, action: &str) {
        self.app
            .world_mut()
            .resource_mut::<VirtualInput>()
            .release(action);
    }

    pub fn subscribe(&mut self, actor: u64) -> crossbeam_channel::Receiver<ChangeEvent> {
        self.app
            .world_mut()
            .resource_mut::<ChangeNotifier>()
            .subscribe(actor)
    }

    pub fn player_snapshot(&self) -> Option<crate::coordinator::Snapshot> {
        self.app
            .world()
            .resource::<PhysicsCoordinator>()
            .snapshot(self.player)
    }
}

#[derive(Deserialize, Clone)]
pub struct ScenarioRequest {
    pub inputs: Vec<ScenarioInput>,
    pub max_frames: u32,
    #[serde(default = "default_record_interval")]
    pub record_interval: u32,
}

fn default_record_interval() -> u32 {
    1
}

#[derive(Deserialize, Clone)]
pub struct ScenarioInput {
    pub frame: u32,
    pub action: String,
    #[serde(default)]
    pub duration: u32,
}

#[derive(Serialize, Clone)]
pub struct ScenarioResult {
    pub outcome: String,
    pub frames_elapsed: u32,
    pub trace: Vec<TraceFrame>,
    pub events: Vec<SimEvent>,
    pub changes: Vec<ChangeEvent>,
}

#[derive(Serialize, Clone)]
pub struct TraceFrame {
    pub frame: u32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub grounded: bool,
}

#[derive(Serialize, Clone)]
pub struct SimEvent {
    pub frame: u32,
    #[serde(rename = "type")]
    pub event_type: String,
    pub x: f32,
    pub y: f32,
}

/// Run a scripted input sequence against the harness, tracing the player
/// through the coordinator's committed snapshots.
pub fn run_scenario(harness: &mut SimHarness, request: &ScenarioRequest) -> ScenarioResult {
    let receiver = harness.subscribe(harness.player);
    let player = harness.player;
    let mut trace = Vec::new();
    let mut events = Vec::new();
    let mut changes = Vec::new();
    let mut outcome = "completed".to_string();
    let mut frames_elapsed = request.max_frames;
    let mut was_grounded = false;
    let mut was_respawning = false;

    for frame in 0..request.max_frames {
        for input in &request.inputs {
            let duration = input.duration.max(1);
            if input.frame == frame {
                harness.press(&input.action);
            }
            if input.frame + duration == frame {
                harness.release(&input.action);
            }
        }

        harness.tick();

        changes.extend(receiver.try_iter());

        let respawning = {
            let mut query = harness
                .app
                .world_mut()
                .query::<(&ActorId, &RespawnTracker)>();
            query
                .iter(harness.app.world())
                .find(|(id, _)| id.0 == player)
                .is_some_and(|(_, t)| t.phase != crate::respawn::RespawnPhase::Active)
        };

        if let Some(snapshot) = harness.player_snapshot() {
            let (x, y) = snapshot.position;
            if snapshot.just_landed {
                events.push(SimEvent {
                    frame,
                    event_type: "land".to_string(),
                    x,
                    y,
                });
            }
            if was_grounded && !snapshot.on_ground && snapshot.velocity.1 > 0.0 {
                events.push(SimEvent {
                    frame,
                    event_type: "jump_start".to_string(),
                    x,
                    y,
                });
            }
            if respawning && !was_respawning {
                events.push(SimEvent {
                    frame,
                    event_type: "respawn".to_string(),
                    x,
                    y,
                });
            }
            was_grounded = snapshot.on_ground;

            if request.record_interval > 0 && frame % request.record_interval == 0 {
                trace.push(TraceFrame {
                    frame,
                    x,
                    y,
                    vx: snapshot.velocity.0,
                    vy: snapshot.velocity.1,
                    grounded: snapshot.on_ground,
                });
            }
        }
        was_respawning = respawning;

        // Stuck detection, same window the original runner used.
        if frame > 300 && trace.len() >= 2 {
            let recent = &trace[trace.len() - 1];
            let old_idx = trace.len().saturating_sub(300);
            let old = &trace[old_idx];
            if (recent.x - old.x).abs() < 1.0 && (recent.y - old.y).abs() < 1.0 {
                outcome = "stuck".to_string();
                frames_elapsed = frame + 1;
                break;
            }
        }
    }

    ScenarioResult {
        outcome,
        frames_elapsed,
        trace,
        events,
        changes,
    }
}
