#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![allow(clippy::type_complexity)]

pub mod cameras;
#[cfg(feature = "devtools")]
pub mod devtools;
pub mod registry;
pub mod systems;
mod types;

use bevy::prelude::*;
pub use bevy_grid_isometric::{screen_to_world, world_to_screen, IsoGrid};
pub use registry::{DepthRegistry, SpriteHandle};
pub use types::{GeometryUpdate, IsoSprite};

/// Exports a draw order as a z coordinate for the renderer.
///
/// Its domain is draw orders from -100_000 to 100_000.
///
/// Its range is from -0.1 to 1.1, strictly increasing, so a sprite with a
/// higher order always ends up on top.
pub fn zindex(order: i32) -> f32 {
    // it's easier to just hardcode the range than pass around values
    //
    // this gives us sufficient buffer for scenes of all sizes
    let (min, max) = (-100_000.0, 100_000.0);
    let size = max - min;

    // we allow for a tiny leeway for orders outside of the expected range
    ((order as f32 - min) / size).clamp(-0.1, 1.1)
}

/// Adds the registry and entity-map resources, the sprite sync and
/// projection systems, camera tracking and, with the `devtools` feature,
/// the gizmo overlays.
pub struct Plugin;

impl bevy::app::Plugin for Plugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<DepthRegistry>()
            .init_resource::<systems::SpriteEntities>()
            .register_type::<IsoSprite>()
            .register_type::<cameras::TrackTarget>();

        app.add_systems(
            Update,
            (
                (systems::sync_sprites, systems::unregister_despawned)
                    .chain(),
                cameras::track_target,
            ),
        )
        .add_systems(PostUpdate, systems::apply_screen_positions);

        #[cfg(feature = "devtools")]
        {
            app.init_resource::<devtools::DebugOverlay>()
                .register_type::<devtools::DebugOverlay>();

            app.add_systems(
                Update,
                (devtools::draw_grid, devtools::draw_boxes),
            );
        }
    }
}
