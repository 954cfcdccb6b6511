use crate::components::SurfaceMaterial;
use crate::platforms::{Platform, PlatformSet};

/// Horizontal speed below which friction snaps a body to rest.
pub const REST_EPSILON: f32 = 0.1;

/// Skin distance used when snapping a blocked body to a platform side.
const CONTACT_SKIN: f32 = 0.01;

#[derive(Clone, Copy, Debug)]
pub struct StepParams {
    pub dt: f32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub width: f32,
    pub height: f32,
    pub restitution: f32,
}

#[derive(Clone, Copy, Debug)]
pub struct StepResult {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    /// Horizontal motion was stopped by a platform side this tick. Drives
    /// the movement coordinator's retry policy.
    pub blocked_x: bool,
    /// Surface landed on this tick, when the body came down onto a top.
    pub landed_on: Option<SurfaceMaterial>,
}

/// Accumulate gravity into the force accumulator. Falling bodies get the
/// fall multiplier for a heavier descent arc.
pub fn accumulate_gravity(
    fy: &mut f32,
    mass: f32,
    vy: f32,
    gravity: f32,
    fall_multiplier: f32,
) {
    let mult = if vy < 0.0 { fall_multiplier } else { 1.0 };
    *fy -= mass * gravity * mult;
}

/// Fold the force accumulator into velocity (`v += F/m * dt`).
pub fn apply_forces(vx: &mut f32, vy: &mut f32, fx: f32, fy: f32, mass: f32, dt: f32) {
    let inv_mass = if mass > 0.0 { 1.0 / mass } else { 0.0 };
    *vx += fx * inv_mass * dt;
    *vy += fy * inv_mass * dt;
}

/// Decay horizontal velocity against the surface. `coefficient` is the world
/// ground or air coefficient already scaled by the body's friction.
pub fn apply_friction(vx: &mut f32, coefficient: f32) {
    let decay = 1.0 - (coefficient * 0.25).clamp(0.0, 1.0);
    *vx *= decay;
    if vx.abs() < REST_EPSILON {
        *vx = 0.0;
    }
}

pub fn clamp_speeds(vx: &mut f32, vy: &mut f32, max_horizontal: f32, max_fall: f32) {
    *vx = vx.clamp(-max_horizontal, max_horizontal);
    if *vy < -max_fall {
        *vy = -max_fall;
    }
}

fn overlaps(p: &Platform, left: f32, right: f32, bottom: f32, top: f32) -> bool {
    right > p.left() && left < p.right() && top > p.bottom() && bottom < p.top()
}

fn first_overlap<'a>(
    platforms: &'a PlatformSet,
    left: f32,
    right: f32,
    bottom: f32,
    top: f32,
) -> Option<&'a Platform> {
    platforms
        .platforms
        .iter()
        .find(|p| overlaps(p, left, right, bottom, top))
}

/// Integrate one tick of motion with axis-separated collision against the
/// platform boxes. X resolves first, then Y; landing from above snaps to the
/// platform top, a ceiling hit reflects velocity by the restitution factor.
pub fn integrate(platforms: &PlatformSet, params: StepParams) -> StepResult {
    let StepParams {
        dt,
        x,
        y,
        vx,
        vy,
        width,
        height,
        restitution,
    } = params;
    let hw = width / 2.0;
    let hh = height / 2.0;

    let mut out_x = x;
    let mut out_y = y;
    let mut out_vx = vx;
    let mut out_vy = vy;
    let mut blocked_x = false;
    let mut landed_on = None;

    // Resolve X
    let new_x = out_x + vx * dt;
    if let Some(p) = first_overlap(platforms, new_x - hw, new_x + hw, out_y - hh, out_y + hh) {
        if vx > 0.0 {
            out_x = p.left() - hw - CONTACT_SKIN;
        } else if vx < 0.0 {
            out_x = p.right() + hw + CONTACT_SKIN;
        }
        out_vx = 0.0;
        blocked_x = vx != 0.0;
    } else {
        out_x = new_x;
    }

    // Resolve Y
    let new_y = out_y + vy * dt;
    if vy < 0.0 {
        let prev_bottom = out_y - hh;
        let new_bottom = new_y - hh;
        let landing = platforms
            .platforms
            .iter()
            .filter(|p| {
                p.overlaps_horizontally(out_x - hw, out_x + hw)
                    && prev_bottom >= p.top() - 0.01
                    && new_bottom <= p.top()
            })
            .fold(None, |best: Option<&Platform>, p| match best {
                Some(b) if b.top() >= p.top() => Some(b),
                _ => Some(p),
            });
        if let Some(p) = landing {
            out_y = p.top() + hh;
            out_vy = 0.0;
            landed_on = Some(p.material);
        } else if let Some(p) =
            first_overlap(platforms, out_x - hw, out_x + hw, new_y - hh, new_y + hh)
        {
            // Fell into a side face without crossing a top; push back out.
            out_y = p.top() + hh;
            out_vy = 0.0;
            landed_on = Some(p.material);
        } else {
            out_y = new_y;
        }
    } else if vy > 0.0 {
        if let Some(p) = first_overlap(platforms, out_x - hw, out_x + hw, new_y - hh, new_y + hh)
        {
            out_y = p.bottom() - hh - CONTACT_SKIN;
            out_vy = -vy * restitution.clamp(0.0, 1.0);
        } else {
            out_y = new_y;
        }
    }

    StepResult {
        x: out_x,
        y: out_y,
        vx: out_vx,
        vy: out_vy,
        blocked_x,
        landed_on,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::Platform;

    fn floor() -> PlatformSet {
        PlatformSet {
            platforms: vec![Platform {
                id: 1,
                x: -100.0,
                y: -20.0,
                width: 400.0,
                height: 20.0,
                material: SurfaceMaterial::Stone,
            }],
            player_spawn: (0.0, 10.0),
            checkpoint: None,
        }
    }

    fn wall() -> PlatformSet {
        PlatformSet {
            platforms: vec![Platform {
                id: 2,
                x: 50.0,
                y: -50.0,
                width: 40.0,
                height: 200.0,
                material: SurfaceMaterial::Stone,
            }],
            player_spawn: (0.0, 0.0),
            checkpoint: None,
        }
    }

    fn step(platforms: &PlatformSet, x: f32, y: f32, vx: f32, vy: f32) -> StepResult {
        integrate(
            platforms,
            StepParams {
                dt: 1.0 / 60.0,
                x,
                y,
                vx,
                vy,
                width: 12.0,
                height: 14.0,
                restitution: 0.0,
            },
        )
    }

    #[test]
    fn gravity_accumulates_with_fall_multiplier() {
        let mut fy = 0.0;
        accumulate_gravity(&mut fy, 2.0, 10.0, 980.0, 1.5);
        assert!((fy + 1960.0).abs() < 1e-3);
        let mut fy_falling = 0.0;
        accumulate_gravity(&mut fy_falling, 2.0, -10.0, 980.0, 1.5);
        assert!((fy_falling + 2940.0).abs() < 1e-3);
    }

    #[test]
    fn forces_fold_into_velocity_by_mass() {
        let (mut vx, mut vy) = (0.0, 0.0);
        apply_forces(&mut vx, &mut vy, 120.0, -60.0, 2.0, 0.5);
        assert!((vx - 30.0).abs() < 1e-6);
        assert!((vy + 15.0).abs() < 1e-6);
    }

    #[test]
    fn friction_has_no_effect_below_rest() {
        let mut vx = 0.0;
        apply_friction(&mut vx, 0.8);
        assert_eq!(vx, 0.0);
    }

    #[test]
    fn friction_decays_and_snaps_to_rest() {
        let mut vx = 100.0;
        apply_friction(&mut vx, 0.8);
        assert!(vx < 100.0 && vx > 0.0);
        let mut slow = 0.05;
        apply_friction(&mut slow, 0.2);
        assert_eq!(slow, 0.0);
    }

    #[test]
    fn falling_body_lands_on_platform_top() {
        let platforms = floor();
        let out = step(&platforms, 0.0, 10.0, 0.0, -600.0);
        assert!((out.y - 7.0).abs() < 1e-3);
        assert_eq!(out.vy, 0.0);
        assert_eq!(out.landed_on, Some(SurfaceMaterial::Stone));
    }

    #[test]
    fn horizontal_motion_blocks_on_platform_side() {
        let platforms = wall();
        let out = step(&platforms, 30.0, 20.0, 1200.0, 0.0);
        assert!(out.blocked_x);
        assert_eq!(out.vx, 0.0);
        assert!(out.x < 50.0);
    }

    #[test]
    fn unobstructed_motion_integrates_position() {
        let platforms = floor();
        let out = step(&platforms, 0.0, 50.0, 60.0, 0.0);
        assert!((out.x - 1.0).abs() < 1e-3);
        assert!(!out.blocked_x);
        assert!(out.landed_on.is_none());
    }

    #[test]
    fn ceiling_hit_reflects_by_restitution() {
        let platforms = PlatformSet {
            platforms: vec![Platform {
                id: 3,
                x: -100.0,
                y: 40.0,
                width: 200.0,
                height: 20.0,
                material: SurfaceMaterial::Stone,
            }],
            player_spawn: (0.0, 0.0),
            checkpoint: None,
        };
        let out = integrate(
            &platforms,
            StepParams {
                dt: 1.0 / 60.0,
                x: 0.0,
                y: 30.0,
                vx: 0.0,
                vy: 600.0,
                width: 12.0,
                height: 14.0,
                restitution: 0.5,
            },
        );
        assert!(out.y < 40.0);
        assert!((out.vy + 300.0).abs() < 1e-3);
    }

    #[test]
    fn speed_clamp_limits_fall_and_horizontal() {
        let (mut vx, mut vy) = (900.0, -1500.0);
        clamp_speeds(&mut vx, &mut vy, 400.0, 800.0);
        assert_eq!(vx, 400.0);
        assert_eq!(vy, -800.0);
    }
}
