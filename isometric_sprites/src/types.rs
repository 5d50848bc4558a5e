use bevy::prelude::*;

/// A sprite that participates in depth sorting.
///
/// The component is the authoring surface: mutate it and the sync systems
/// propagate the change into the [`crate::DepthRegistry`], which snaps the
/// anchor, recomputes the box corners and re-resolves the draw order before
/// the next frame is drawn.
#[derive(Component, Reflect, Clone, Copy, Debug, PartialEq)]
#[reflect(Component, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IsoSprite {
    /// World anchor.
    /// `x`/`y` are logical-plane coordinates, `z` is elevation.
    pub position: Vec3,
    /// From the anchor to the near corner of the box.
    pub offset: Vec3,
    /// Box extents along each axis.
    /// Must be non-negative; zero extents collapse the box to a plane or a
    /// point, which is permitted.
    pub size: Vec3,
    /// External display multiplier.
    /// Applied to the size term only, never to the offset.
    pub scale: Vec3,
}

impl Default for IsoSprite {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            offset: Vec3::ZERO,
            size: Vec3::ONE,
            scale: Vec3::ONE,
        }
    }
}

/// A partial geometry mutation.
///
/// Fields left as [`None`] keep their current value.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GeometryUpdate {
    /// New world anchor.
    pub position: Option<Vec3>,
    /// New anchor-to-near-corner offset.
    pub offset: Option<Vec3>,
    /// New box extents.
    pub size: Option<Vec3>,
    /// New display multiplier.
    pub scale: Option<Vec3>,
}
