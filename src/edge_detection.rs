use crate::platforms::PlatformSet;

/// Entity footprint handed to the detector; `bottom` locates the supporting
/// surface, `left`/`right` the horizontal extent of the box.
#[derive(Clone, Copy, Debug)]
pub struct EntityBox {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
}

/// Output of one detection pass. Distances are `+infinity` when no platform
/// supports the entity.
#[derive(Clone, Copy, Debug)]
pub struct EdgeReport {
    pub near_left: bool,
    pub near_right: bool,
    pub left_distance: f32,
    pub right_distance: f32,
    pub left_edge: Option<(f32, f32)>,
    pub right_edge: Option<(f32, f32)>,
}

impl EdgeReport {
    pub fn unsupported() -> Self {
        Self {
            near_left: false,
            near_right: false,
            left_distance: f32::INFINITY,
            right_distance: f32::INFINITY,
            left_edge: None,
            right_edge: None,
        }
    }

    pub fn near_any(&self) -> bool {
        self.near_left || self.near_right
    }
}

/// Pure edge-proximity computation. For every platform the entity rests on
/// (or sits just above, within `tolerance`), measure the distance from the
/// entity's sides to the platform's edges; the nearest non-negative distance
/// per side wins. A side is near when its distance is below `threshold`;
/// exactly on the edge (distance 0) counts as near.
pub fn detect_edges(
    entity: EntityBox,
    platforms: &PlatformSet,
    threshold: f32,
    tolerance: f32,
) -> EdgeReport {
    let mut report = EdgeReport::unsupported();
    let mut supported = false;

    for p in platforms.support_candidates(entity.left, entity.right, entity.bottom, tolerance) {
        supported = true;

        let left_distance = entity.left - p.left();
        if left_distance >= 0.0 && left_distance < report.left_distance {
            report.left_distance = left_distance;
            report.left_edge = Some((p.left(), p.top()));
        }

        let right_distance = p.right() - entity.right;
        if right_distance >= 0.0 && right_distance < report.right_distance {
            report.right_distance = right_distance;
            report.right_edge = Some((p.right(), p.top()));
        }
    }

    if !supported {
        return report;
    }

    report.near_left = report.left_distance < threshold;
    report.near_right = report.right_distance < threshold;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::SurfaceMaterial;
    use crate::platforms::Platform;

    fn platform(id: u64, x: f32, y: f32, width: f32, height: f32) -> Platform {
        Platform {
            id,
            x,
            y,
            width,
            height,
            material: SurfaceMaterial::Stone,
        }
    }

    fn set(platforms: Vec<Platform>) -> PlatformSet {
        PlatformSet {
            platforms,
            player_spawn: (0.0, 0.0),
            checkpoint: None,
        }
    }

    #[test]
    fn near_left_edge_at_threshold_distance() {
        let platforms = set(vec![platform(1, 100.0, 200.0, 200.0, 50.0)]);
        let report = detect_edges(
            EntityBox {
                left: 120.0,
                right: 120.0,
                bottom: 250.0,
            },
            &platforms,
            40.0,
            2.0,
        );
        assert_eq!(report.left_distance, 20.0);
        assert!(report.near_left);
        assert_eq!(report.right_distance, 180.0);
        assert!(!report.near_right);
        assert!(report.near_any());
        assert_eq!(report.left_edge, Some((100.0, 250.0)));
    }

    #[test]
    fn unsupported_entity_reports_infinite_distances() {
        let platforms = set(vec![platform(1, 100.0, 200.0, 200.0, 50.0)]);
        let report = detect_edges(
            EntityBox {
                left: 500.0,
                right: 510.0,
                bottom: 250.0,
            },
            &platforms,
            40.0,
            2.0,
        );
        assert!(report.left_distance.is_infinite());
        assert!(report.right_distance.is_infinite());
        assert!(!report.near_any());
    }

    #[test]
    fn distance_of_exactly_zero_counts_as_near() {
        let platforms = set(vec![platform(1, 100.0, 200.0, 200.0, 50.0)]);
        let report = detect_edges(
            EntityBox {
                left: 100.0,
                right: 110.0,
                bottom: 250.0,
            },
            &platforms,
            40.0,
            2.0,
        );
        assert_eq!(report.left_distance, 0.0);
        assert!(report.near_left);
    }

    #[test]
    fn nearest_non_negative_distance_wins_across_platforms() {
        // Two abutting platforms; the entity straddles the seam, so each side
        // should measure against the outermost edges.
        let platforms = set(vec![
            platform(1, 0.0, 200.0, 100.0, 50.0),
            platform(2, 100.0, 200.0, 100.0, 50.0),
        ]);
        let report = detect_edges(
            EntityBox {
                left: 90.0,
                right: 110.0,
                bottom: 250.0,
            },
            &platforms,
            40.0,
            2.0,
        );
        // Left side: 90-0=90 from platform 1; platform 2 gives a negative
        // candidate, which never wins.
        assert_eq!(report.left_distance, 90.0);
        // Right side: 200-110=90 from platform 2; platform 1 is negative.
        assert_eq!(report.right_distance, 90.0);
    }

    #[test]
    fn overhanging_side_reports_no_near_flag() {
        let platforms = set(vec![platform(1, 100.0, 200.0, 50.0, 50.0)]);
        // Entity hangs past the left edge; the left candidate is negative.
        let report = detect_edges(
            EntityBox {
                left: 90.0,
                right: 130.0,
                bottom: 250.0,
            },
            &platforms,
            40.0,
            2.0,
        );
        assert!(report.left_distance.is_infinite());
        assert!(!report.near_left);
        assert_eq!(report.right_distance, 20.0);
        assert!(report.near_right);
    }
}
