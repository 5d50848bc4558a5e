//! Camera tracking for isometric scenes.

use bevy::{math::FloatExt, prelude::*};

/// The entity the camera keeps in frame, typically the player.
///
/// There should be at most one; with none the camera stays put.
#[derive(Component)]
pub struct CameraTarget;

/// Attach to a camera to make it follow the [`CameraTarget`].
#[derive(Component, Reflect)]
pub struct TrackTarget {
    /// How far the target may wander from the camera center along each
    /// axis before the camera starts moving.
    pub margin: Vec2,
    /// Per-axis smoothing factors.
    /// The higher the factor the faster the camera catches up.
    pub smoothing: Vec2,
    /// The camera viewport never leaves this world-space rectangle.
    pub bounds: Rect,
}

impl Default for TrackTarget {
    fn default() -> Self {
        Self {
            margin: Vec2::ZERO,
            smoothing: Vec2::new(2.0, 10.0),
            bounds: Rect::new(-1000.0, -1000.0, 1000.0, 1000.0),
        }
    }
}

/// Recommended to run after whatever moves the [`CameraTarget`], so the
/// camera lags at most one system apply behind the target, not a frame.
pub fn track_target(
    time: Res<Time>,
    target: Query<&GlobalTransform, With<CameraTarget>>,
    mut cameras: Query<(
        &mut Transform,
        &TrackTarget,
        &OrthographicProjection,
    )>,
) {
    let Ok(target) = target.get_single() else {
        return;
    };
    let target = target.translation().truncate();

    for (mut transform, track, projection) in cameras.iter_mut() {
        let current = transform.translation.truncate();
        let dt = time.delta_seconds();

        let mut desired = current;
        if (current.x - target.x).abs() > track.margin.x {
            desired.x =
                current.x.lerp(target.x, (track.smoothing.x * dt).min(1.0));
        }
        if (current.y - target.y).abs() > track.margin.y {
            desired.y =
                current.y.lerp(target.y, (track.smoothing.y * dt).min(1.0));
        }

        // keep the whole viewport inside the bounds
        let half = projection.area.half_size();
        desired =
            desired.clamp(track.bounds.min + half, track.bounds.max - half);

        if desired != current {
            trace!("Camera catches up with its target");
            transform.translation = desired.extend(transform.translation.z);
        }
    }
}
