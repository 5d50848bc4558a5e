#![doc = include_str!("../README.md")]

use bevy::prelude::*;

/// The grid the sprite boxes snap to.
///
/// Lives in logical world space, so one step spans the same distance along
/// both planar axes no matter how the scene is projected.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
#[reflect(Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IsoGrid {
    /// Distance between two neighboring grid lines, in logical units.
    pub step: f32,
}

impl Default for IsoGrid {
    fn default() -> Self {
        Self { step: 1.0 }
    }
}

/// Projects a logical world position onto the isometric screen plane.
///
/// Inverse of [`screen_to_world`].
#[inline]
pub fn world_to_screen(p: Vec2) -> Vec2 {
    Vec2::new(p.y + 0.5 * p.x, p.y - 0.5 * p.x)
}

/// Maps an isometric screen position back to the logical world plane.
///
/// Inverse of [`world_to_screen`].
#[inline]
pub fn screen_to_world(p: Vec2) -> Vec2 {
    Vec2::new(p.x - p.y, 0.5 * (p.x + p.y))
}

/// Whichever of the two values has the smaller magnitude, sign preserved.
///
/// Ties go to `b`.
#[inline]
pub fn min_abs(a: f32, b: f32) -> f32 {
    if a.abs() < b.abs() {
        a
    } else {
        b
    }
}

impl IsoGrid {
    #[inline]
    pub const fn new(step: f32) -> Self {
        Self { step }
    }

    /// Non-positive steps fall back to `1`.
    #[inline]
    pub fn step(self) -> f32 {
        if self.step > 0.0 {
            self.step
        } else {
            1.0
        }
    }

    /// Signed distance from `v` to the closer of the two grid lines around
    /// it: the line at or above `v` and the one immediately below.
    #[inline]
    pub fn nearest_line_delta(self, v: f32) -> f32 {
        let step = self.step();
        let ceiling = (v / step).ceil() * step;
        let floor = ceiling - step;
        min_abs(ceiling - v, floor - v)
    }

    /// The smallest displacement that aligns one corner of the `min`/`max`
    /// box to the grid, independently per planar axis.
    ///
    /// Applying the result to both corners preserves the box size.
    pub fn snap_delta(self, min: Vec2, max: Vec2) -> Vec2 {
        Vec2::new(
            min_abs(
                self.nearest_line_delta(min.x),
                self.nearest_line_delta(max.x),
            ),
            min_abs(
                self.nearest_line_delta(min.y),
                self.nearest_line_delta(max.y),
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f32 = 1e-4;

    fn assert_close(a: Vec2, b: Vec2) {
        assert!(
            (a - b).length() < TOLERANCE,
            "{a:?} not within tolerance of {b:?}"
        );
    }

    #[test]
    fn it_projects_known_values() {
        assert_eq!(world_to_screen(Vec2::new(2.0, 3.0)), Vec2::new(4.0, 2.0));
        assert_eq!(screen_to_world(Vec2::new(4.0, 2.0)), Vec2::new(2.0, 3.0));
    }

    #[test]
    fn it_round_trips_the_projection() {
        for x in -50..=50 {
            for y in -50..=50 {
                let p = Vec2::new(x as f32 * 0.37, y as f32 * 0.81);

                assert_close(screen_to_world(world_to_screen(p)), p);
                assert_close(world_to_screen(screen_to_world(p)), p);
            }
        }
    }

    #[test]
    fn it_finds_nearest_line() {
        let grid = IsoGrid::new(1.0);

        assert_eq!(grid.nearest_line_delta(0.25), -0.25);
        assert_eq!(grid.nearest_line_delta(0.75), 0.25);
        assert_eq!(grid.nearest_line_delta(-1.25), 0.25);
        assert_eq!(grid.nearest_line_delta(3.0), 0.0);
    }

    #[test]
    fn it_breaks_ties_towards_the_floor_line() {
        // equidistant from both lines, the lower one wins
        assert_eq!(IsoGrid::new(1.0).nearest_line_delta(0.5), -0.5);
    }

    #[test]
    fn it_defaults_non_positive_steps_to_one() {
        assert_eq!(IsoGrid::new(0.0).step(), 1.0);
        assert_eq!(IsoGrid::new(-2.5).step(), 1.0);
        assert_eq!(IsoGrid::new(0.0).nearest_line_delta(0.75), 0.25);
    }

    #[test]
    fn it_snaps_the_closer_corner() {
        let grid = IsoGrid::new(1.0);

        // min corner x is 0.1 away from a line, max corner x is 0.3 away,
        // so the min corner decides the x axis; the other way around on y
        let delta = grid.snap_delta(Vec2::new(0.9, 0.4), Vec2::new(2.3, 1.8));

        assert_close(delta, Vec2::new(0.1, 0.2));
    }

    #[test]
    fn it_snaps_already_aligned_boxes_by_zero() {
        let grid = IsoGrid::new(0.5);

        let delta = grid.snap_delta(Vec2::new(1.0, -2.5), Vec2::new(1.3, -2.2));

        assert_eq!(delta, Vec2::ZERO);
    }
}
