use bevy::prelude::*;

use crate::components::SurfaceMaterial;

/// Axis-aligned platform box supplied by the level loader. `x`/`y` name the
/// bottom-left corner; the world is y-up.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Platform {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub material: SurfaceMaterial,
}

impl Platform {
    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn top(&self) -> f32 {
        self.y + self.height
    }

    pub fn bottom(&self) -> f32 {
        self.y
    }

    pub fn overlaps_horizontally(&self, left: f32, right: f32) -> bool {
        right > self.left() && left < self.right()
    }
}

/// Read-only level geometry consumed by grounding and edge detection.
#[derive(Resource, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PlatformSet {
    pub platforms: Vec<Platform>,
    pub player_spawn: (f32, f32),
    #[serde(default)]
    pub checkpoint: Option<(f32, f32)>,
}

impl PlatformSet {
    /// Platforms that could be supporting a body whose box bottom sits at
    /// `bottom`: horizontal overlap plus a top within the landing tolerance.
    pub fn support_candidates<'a>(
        &'a self,
        left: f32,
        right: f32,
        bottom: f32,
        tolerance: f32,
    ) -> impl Iterator<Item = &'a Platform> {
        self.platforms.iter().filter(move |p| {
            p.overlaps_horizontally(left, right)
                && bottom >= p.top() - 0.01
                && bottom - p.top() <= tolerance
        })
    }

    /// The platform currently under a body, if any. When several overlap, the
    /// highest top wins (the one the body actually rests on).
    pub fn support_for(
        &self,
        left: f32,
        right: f32,
        bottom: f32,
        tolerance: f32,
    ) -> Option<&Platform> {
        self.support_candidates(left, right, bottom, tolerance)
            .fold(None, |best: Option<&Platform>, p| match best {
                Some(b) if b.top() >= p.top() => Some(b),
                _ => Some(p),
            })
    }

    /// Level geometry embedded at compile time via build.rs, if any was
    /// provided through `AETHERFALL_EMBED_LEVEL_PATH`.
    pub fn from_embedded() -> Option<Self> {
        let raw = include_str!(concat!(env!("OUT_DIR"), "/aetherfall_embedded_level.json"));
        serde_json::from_str::<Self>(raw).ok()
    }

    pub fn load(path: &str) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read level '{}': {}", path, e))?;
        serde_json::from_str(&contents)
            .map_err(|e| format!("failed to parse level '{}': {}", path, e))
    }

    /// A simple test level for development: a long stone floor, a grass
    /// ledge, and a water pool platform.
    pub fn test_level() -> Self {
        Self {
            platforms: vec![
                Platform {
                    id: 1,
                    x: -200.0,
                    y: -20.0,
                    width: 800.0,
                    height: 20.0,
                    material: SurfaceMaterial::Stone,
                },
                Platform {
                    id: 2,
                    x: 120.0,
                    y: 60.0,
                    width: 160.0,
                    height: 16.0,
                    material: SurfaceMaterial::Grass,
                },
                Platform {
                    id: 3,
                    x: 360.0,
                    y: 120.0,
                    width: 120.0,
                    height: 16.0,
                    material: SurfaceMaterial::Water,
                },
            ],
            player_spawn: (0.0, 40.0),
            checkpoint: Some((0.0, 40.0)),
        }
    }
}

pub struct PlatformsPlugin;

impl Plugin for PlatformsPlugin {
    fn build(&self, app: &mut App) {
        if !app.world().contains_resource::<PlatformSet>() {
            let level = PlatformSet::from_embedded()
                .filter(|set| !set.platforms.is_empty())
                .unwrap_or_else(PlatformSet::test_level);
            app.insert_resource(level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_platform() -> PlatformSet {
        PlatformSet {
            platforms: vec![Platform {
                id: 7,
                x: 100.0,
                y: 200.0,
                width: 200.0,
                height: 50.0,
                material: SurfaceMaterial::Grass,
            }],
            player_spawn: (0.0, 0.0),
            checkpoint: None,
        }
    }

    #[test]
    fn support_requires_horizontal_overlap() {
        let set = single_platform();
        assert!(set.support_for(120.0, 140.0, 250.0, 2.0).is_some());
        assert!(set.support_for(320.0, 340.0, 250.0, 2.0).is_none());
    }

    #[test]
    fn support_requires_top_within_tolerance() {
        let set = single_platform();
        // Floating above the top, outside tolerance.
        assert!(set.support_for(120.0, 140.0, 260.0, 2.0).is_none());
        // Resting exactly on top.
        assert!(set.support_for(120.0, 140.0, 250.0, 2.0).is_some());
    }

    #[test]
    fn highest_platform_wins_when_stacked() {
        let mut set = single_platform();
        set.platforms.push(Platform {
            id: 8,
            x: 100.0,
            y: 150.0,
            width: 200.0,
            height: 99.0,
            material: SurfaceMaterial::Stone,
        });
        let support = set.support_for(120.0, 140.0, 250.0, 2.0);
        assert_eq!(support.map(|p| p.id), Some(7));
    }

    #[test]
    fn platform_set_round_trips_through_json() {
        let set = PlatformSet::test_level();
        let json = serde_json::to_string(&set).expect("serialize level");
        let back: PlatformSet = serde_json::from_str(&json).expect("parse level");
        assert_eq!(back.platforms.len(), set.platforms.len());
        assert_eq!(back.player_spawn, set.player_spawn);
    }
}
