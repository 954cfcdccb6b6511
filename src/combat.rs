use std::collections::VecDeque;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::{ActorId, Body, SurfaceMaterial, TickClock};
use crate::coordinator::{PhysicsCoordinator, PhysicsQuery};
use crate::events::ChangeNotifier;
use crate::schedule::TickSet;
use crate::stats::{apply_damage, Health};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttackType {
    Melee,
    Fire,
    Electric,
    Normal,
}

/// The environmental damage table, the single source of truth for attack ×
/// surface interactions. Any pair not listed multiplies by 1.0, including
/// airborne targets, whose surface is `None`.
const DAMAGE_MULTIPLIERS: &[(AttackType, SurfaceMaterial, f32)] = &[
    (AttackType::Electric, SurfaceMaterial::Water, 1.5),
    (AttackType::Fire, SurfaceMaterial::Grass, 1.25),
];

pub fn damage_multiplier(attack: AttackType, surface: SurfaceMaterial) -> f32 {
    DAMAGE_MULTIPLIERS
        .iter()
        .find(|(a, s, _)| *a == attack && *s == surface)
        .map_or(1.0, |(_, _, m)| *m)
}

/// One attack to resolve against every target in range.
#[derive(Clone, Debug, Serialize)]
pub struct AttackParameters {
    pub attacker: u64,
    pub direction: (f32, f32),
    pub range: f32,
    pub base_damage: f32,
    pub attack_type: AttackType,
    pub knockback_magnitude: Option<f32>,
    pub knockback_direction: Option<(f32, f32)>,
}

/// Per-target resolution record, kept for observability and tests.
#[derive(Clone, Debug, Serialize)]
pub struct AttackReport {
    pub attacker: u64,
    pub target: u64,
    pub damage: f32,
    pub multiplier: f32,
    pub surface: SurfaceMaterial,
    pub knockback: Option<(f32, f32)>,
    pub lethal: bool,
    pub frame: u64,
}

/// Oldest reports are dropped past this depth, mirroring the bounded
/// movement response buffer.
const MAX_REPORTS: usize = 256;

#[derive(Resource, Default)]
pub struct AttackQueue {
    pending: VecDeque<AttackParameters>,
    pub resolved: VecDeque<AttackReport>,
    pub dropped_reports: u64,
}

impl AttackQueue {
    pub fn submit(&mut self, attack: AttackParameters) {
        self.pending.push_back(attack);
    }

    fn push_report(&mut self, report: AttackReport) {
        self.resolved.push_back(report);
        while self.resolved.len() > MAX_REPORTS {
            self.resolved.pop_front();
            self.dropped_reports = self.dropped_reports.saturating_add(1);
        }
    }
}

fn normalized(x: f32, y: f32) -> Option<(f32, f32)> {
    let len = (x * x + y * y).sqrt();
    if len <= f32::EPSILON {
        None
    } else {
        Some((x / len, y / len))
    }
}

/// Resolve queued attacks: distance check against every other actor with
/// health, surface-modulated damage through the stats seam, and knockback
/// injected through the physics coordinator. Positions and grounding come
/// from the coordinator's committed snapshots, the same read path every
/// other consumer uses.
pub fn resolve_attacks(
    mut queue: ResMut<AttackQueue>,
    mut coordinator: ResMut<PhysicsCoordinator>,
    mut notifier: ResMut<ChangeNotifier>,
    clock: Res<TickClock>,
    mut targets: Query<(&ActorId, &Body, &mut Health)>,
) {
    let attacks: Vec<AttackParameters> = queue.pending.drain(..).collect();
    for attack in attacks {
        let Some(attacker_pos) = coordinator.position(attack.attacker) else {
            warn!(
                "[Aetherfall] dropped attack from unknown actor {}",
                attack.attacker
            );
            continue;
        };

        for (id, body, mut health) in targets.iter_mut() {
            if id.0 == attack.attacker {
                continue;
            }
            let Some(snapshot) = coordinator.snapshot(id.0) else {
                continue;
            };
            let dx = snapshot.position.0 - attacker_pos.0;
            let dy = snapshot.position.1 - attacker_pos.1;
            if (dx * dx + dy * dy).sqrt() > attack.range {
                continue;
            }

            let surface = if snapshot.on_ground {
                snapshot.surface
            } else {
                SurfaceMaterial::None
            };
            let multiplier = damage_multiplier(attack.attack_type, surface);
            let damage = attack.base_damage * multiplier;
            let lethal = apply_damage(
                &mut health,
                damage,
                id.0,
                "attack",
                &mut notifier,
                clock.frame,
            );

            let mut knockback = None;
            if let Some(magnitude) = attack.knockback_magnitude {
                if magnitude != 0.0 && !body.is_static {
                    let dir = attack
                        .knockback_direction
                        .and_then(|(x, y)| normalized(x, y))
                        .or_else(|| normalized(dx, dy));
                    if let Some((nx, ny)) = dir {
                        let impulse = (nx * magnitude, ny * magnitude);
                        coordinator.apply_impulse(id.0, impulse.0, impulse.1);
                        knockback = Some(impulse);
                    }
                }
            }

            queue.push_report(AttackReport {
                attacker: attack.attacker,
                target: id.0,
                damage,
                multiplier,
                surface,
                knockback,
                lethal,
                frame: clock.frame,
            });
        }
    }
}

pub struct CombatPlugin;

impl Plugin for CombatPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<AttackQueue>()
            .add_systems(FixedUpdate, resolve_attacks.in_set(TickSet::Combat));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplier_table_matches_the_environmental_pairs() {
        let base = 10.0;
        let cases = [
            (AttackType::Electric, SurfaceMaterial::Water, 15.0),
            (AttackType::Fire, SurfaceMaterial::Grass, 12.5),
            (AttackType::Fire, SurfaceMaterial::Stone, 10.0),
            (AttackType::Normal, SurfaceMaterial::Water, 10.0),
            (AttackType::Electric, SurfaceMaterial::None, 10.0),
            (AttackType::Melee, SurfaceMaterial::Metal, 10.0),
        ];
        for (attack, surface, expected) in cases {
            let damage = base * damage_multiplier(attack, surface);
            assert_eq!(damage, expected, "{:?} x {:?}", attack, surface);
        }
    }

    #[test]
    fn airborne_targets_never_get_a_surface_bonus() {
        // An airborne target keeps no surface tag, so even electric attacks
        // read the default row.
        assert_eq!(
            damage_multiplier(AttackType::Electric, SurfaceMaterial::None),
            1.0
        );
    }

    #[test]
    fn report_buffer_stays_bounded_and_counts_drops() {
        let mut queue = AttackQueue::default();
        for frame in 0..(MAX_REPORTS as u64 + 10) {
            queue.push_report(AttackReport {
                attacker: 1,
                target: 2,
                damage: 1.0,
                multiplier: 1.0,
                surface: SurfaceMaterial::Stone,
                knockback: None,
                lethal: false,
                frame,
            });
        }
        assert_eq!(queue.resolved.len(), MAX_REPORTS);
        assert_eq!(queue.dropped_reports, 10);
        // the oldest reports are the ones that went
        assert_eq!(queue.resolved.front().map(|r| r.frame), Some(10));
    }

    #[test]
    fn knockback_direction_normalizes_or_declines() {
        assert_eq!(normalized(0.0, 0.0), None);
        let (nx, ny) = normalized(3.0, 4.0).expect("unit vector");
        assert!((nx - 0.6).abs() < 1e-6);
        assert!((ny - 0.8).abs() < 1e-6);
    }
}
