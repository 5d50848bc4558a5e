//! Gizmo overlays for inspecting the grid and the sprite boxes.

use bevy::{color::palettes::css, prelude::*};
use bevy_grid_isometric::world_to_screen;

use crate::registry::DepthRegistry;

/// Which overlays to draw.
#[derive(Resource, Reflect)]
#[reflect(Resource, Default)]
pub struct DebugOverlay {
    /// Draw the snapping grid.
    pub show_grid: bool,
    /// Outline every sprite's box.
    pub show_boxes: bool,
}

impl Default for DebugOverlay {
    fn default() -> Self {
        Self {
            show_grid: true,
            show_boxes: true,
        }
    }
}

/// How far from the origin the grid is drawn, in logical units.
/// Plenty for scenes of all sizes.
const GRID_EXTENT: f32 = 100.0;

/// Sweeps iso-projected grid lines over ±[`GRID_EXTENT`] along both planar
/// axes.
pub fn draw_grid(
    overlay: Res<DebugOverlay>,
    registry: Res<DepthRegistry>,
    mut gizmos: Gizmos,
) {
    if !overlay.show_grid {
        return;
    }
    let Some(grid) = registry.grid() else {
        return;
    };

    let color = Color::srgba(0.5, 0.5, 0.5, 0.3);
    let step = grid.step();

    let mut line = |value: f32| {
        gizmos.line_2d(
            world_to_screen(Vec2::new(value, GRID_EXTENT)),
            world_to_screen(Vec2::new(value, -GRID_EXTENT)),
            color,
        );
        gizmos.line_2d(
            world_to_screen(Vec2::new(GRID_EXTENT, value)),
            world_to_screen(Vec2::new(-GRID_EXTENT, value)),
            color,
        );
    };

    let mut value = 0.0;
    while value < GRID_EXTENT {
        line(value);
        value += step;
    }
    let mut value = 0.0;
    while value > -GRID_EXTENT {
        line(value);
        value -= step;
    }
}

/// Outlines every sprite's box: the footprint with its diagonals in blue,
/// the volume's bottom and top rings plus the vertical edges in magenta.
pub fn draw_boxes(
    overlay: Res<DebugOverlay>,
    registry: Res<DepthRegistry>,
    mut gizmos: Gizmos,
) {
    if !overlay.show_boxes {
        return;
    }

    for handle in registry.iter() {
        let (min, max) = registry.corners(handle);

        let footprint = [
            world_to_screen(Vec2::new(min.x, min.y)),
            world_to_screen(Vec2::new(max.x, min.y)),
            world_to_screen(Vec2::new(max.x, max.y)),
            world_to_screen(Vec2::new(min.x, max.y)),
        ];

        for i in 0..4 {
            gizmos.line_2d(footprint[i], footprint[(i + 1) % 4], css::BLUE);
        }
        // diagonals keep flat boxes visible
        gizmos.line_2d(footprint[0], footprint[2], css::BLUE);
        gizmos.line_2d(footprint[1], footprint[3], css::BLUE);

        // elevation raises a point along screen y
        let lift = |p: Vec2, z: f32| Vec2::new(p.x, p.y + z);
        for i in 0..4 {
            let (a, b) = (footprint[i], footprint[(i + 1) % 4]);
            gizmos.line_2d(lift(a, min.z), lift(b, min.z), css::MAGENTA);
            gizmos.line_2d(lift(a, max.z), lift(b, max.z), css::MAGENTA);
            gizmos.line_2d(lift(a, min.z), lift(a, max.z), css::MAGENTA);
        }
    }
}
