//! Systems syncing [`IsoSprite`] entities with the [`DepthRegistry`] and
//! pushing the resolved state back to their transforms.

use bevy::{ecs::entity::EntityHashMap, prelude::*};

use crate::{
    registry::{DepthRegistry, SpriteHandle},
    types::{GeometryUpdate, IsoSprite},
    zindex,
};

/// Which registry record belongs to which entity.
///
/// Needed to free records of entities that despawn wholesale, because by
/// the time [`RemovedComponents`] reports them their components are gone.
#[derive(Resource, Default)]
pub struct SpriteEntities {
    map: EntityHashMap<SpriteHandle>,
}

/// Registers newly added [`IsoSprite`]s and applies mutations of existing
/// ones to the registry.
///
/// The registry snaps the anchor onto the grid, so the corrected position
/// is written back into the component. That write bypasses change
/// detection, otherwise every snap would queue another sync next frame.
pub fn sync_sprites(
    mut registry: ResMut<DepthRegistry>,
    mut entities: ResMut<SpriteEntities>,
    mut sprites: Query<(Entity, &mut IsoSprite), Changed<IsoSprite>>,
) {
    for (entity, mut sprite) in sprites.iter_mut() {
        let handle = match entities.map.get(&entity) {
            Some(&handle) => {
                registry.update_geometry(
                    handle,
                    GeometryUpdate {
                        position: Some(sprite.position),
                        offset: Some(sprite.offset),
                        size: Some(sprite.size),
                        scale: Some(sprite.scale),
                    },
                );
                handle
            }
            None => {
                let handle = registry.register(*sprite);
                entities.map.insert(entity, handle);
                handle
            }
        };

        sprite.bypass_change_detection().position =
            registry.sprite(handle).position;
    }
}

/// Frees the registry records of entities that lost their [`IsoSprite`]
/// or despawned entirely.
pub fn unregister_despawned(
    mut registry: ResMut<DepthRegistry>,
    mut entities: ResMut<SpriteEntities>,
    mut removed: RemovedComponents<IsoSprite>,
) {
    for entity in removed.read() {
        if let Some(handle) = entities.map.remove(&entity) {
            registry.unregister(handle);
        }
    }
}

/// Projects every registered sprite's anchor to its screen position and
/// exports the resolved draw order as the z index the renderer sorts by.
pub fn apply_screen_positions(
    registry: Res<DepthRegistry>,
    entities: Res<SpriteEntities>,
    mut sprites: Query<(Entity, &mut Transform), With<IsoSprite>>,
) {
    for (entity, mut transform) in sprites.iter_mut() {
        let Some(&handle) = entities.map.get(&entity) else {
            continue;
        };

        let screen = registry.screen_position(handle);
        transform.translation =
            screen.extend(zindex(registry.draw_order(handle)));
    }
}
