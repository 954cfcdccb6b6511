mod combat;
mod components;
mod controller;
mod coordinator;
mod edge_detection;
mod events;
mod movement;
mod physics;
mod physics_core;
mod platforms;
mod respawn;
mod schedule;
mod sim;
mod stats;

use components::GameConfig;
use platforms::PlatformSet;
use sim::{run_scenario, ScenarioRequest, SimHarness};

fn load_level() -> PlatformSet {
    if let Ok(path) = std::env::var("AETHERFALL_LEVEL") {
        if !path.is_empty() {
            match PlatformSet::load(&path) {
                Ok(level) => {
                    println!("[Aetherfall] Loaded level from {}", path);
                    return level;
                }
                Err(e) => eprintln!("[Aetherfall] {}", e),
            }
        }
    }
    PlatformSet::from_embedded()
        .filter(|set| !set.platforms.is_empty())
        .unwrap_or_else(PlatformSet::test_level)
}

fn load_scenario() -> ScenarioRequest {
    let path = std::env::var("AETHERFALL_SCENARIO")
        .ok()
        .filter(|s| !s.is_empty());
    if let Some(path) = &path {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<ScenarioRequest>(&contents) {
                Ok(request) => {
                    println!("[Aetherfall] Loaded scenario from {}", path);
                    return request;
                }
                Err(e) => eprintln!("[Aetherfall] Failed to parse {}: {}", path, e),
            },
            Err(e) => eprintln!("[Aetherfall] Failed to read {}: {}", path, e),
        }
    }
    // Default demo: settle, walk right, jump the gap, walk off.
    ScenarioRequest {
        inputs: vec![
            sim::ScenarioInput {
                frame: 60,
                action: "move_right".to_string(),
                duration: 120,
            },
            sim::ScenarioInput {
                frame: 90,
                action: "jump".to_string(),
                duration: 12,
            },
        ],
        max_frames: 240,
        record_interval: 10,
    }
}

fn main() {
    let config = GameConfig::load_or_default();
    let level = load_level();
    println!(
        "[Aetherfall] Simulating {} platforms, spawn at ({}, {})",
        level.platforms.len(),
        level.player_spawn.0,
        level.player_spawn.1
    );

    let mut harness = SimHarness::new(config, level);
    harness.spawn_player();

    let request = load_scenario();
    let result = run_scenario(&mut harness, &request);
    match serde_json::to_string_pretty(&result) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("[Aetherfall] Failed to serialize result: {}", e),
    }
}
