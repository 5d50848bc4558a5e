//! The registry owns every live sprite's geometry, the pairwise behind
//! relation between their boxes and the resolved draw order.
//!
//! All mutating operations are synchronous: a call returns only after the
//! relation has been rebuilt and the whole draw order re-resolved, so the
//! caller always observes a consistent ordering.

use bevy::prelude::*;
use bevy_grid_isometric::{world_to_screen, IsoGrid};
use smallvec::SmallVec;

use crate::types::{GeometryUpdate, IsoSprite};

/// Stable identity of a sprite registered in a [`DepthRegistry`].
///
/// Slots are recycled but generations are not, so a handle kept past
/// [`DepthRegistry::unregister`] can never silently alias a newer sprite.
/// Using such a handle is a contract violation and panics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Reflect)]
pub struct SpriteHandle {
    index: u32,
    generation: u32,
}

impl std::fmt::Display for SpriteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone)]
struct SpriteRecord {
    sprite: IsoSprite,
    box_min: Vec3,
    box_max: Vec3,
    /// Sprites that must be painted before this one.
    /// Handles into the same registry, never references; entries are purged
    /// on unregister so they always point at live sprites.
    behind: SmallVec<[SpriteHandle; 8]>,
    draw_order: i32,
}

#[derive(Debug, Clone, Default)]
struct Slot {
    generation: u32,
    record: Option<SpriteRecord>,
}

/// An arena of all sprites participating in depth sorting.
///
/// Expected scene sizes are tens to low hundreds of sprites: mutating one
/// sprite costs O(n) pairwise relation tests plus a full O(n + e) order
/// resolution, which makes a scene where everything moves every frame O(n²)
/// per frame.
#[derive(Resource, Debug, Clone, Default)]
pub struct DepthRegistry {
    grid: Option<IsoGrid>,
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl DepthRegistry {
    /// An empty registry with no snapping grid.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty registry whose boxes snap to the given grid.
    pub fn with_grid(grid: IsoGrid) -> Self {
        Self {
            grid: Some(grid),
            ..Self::default()
        }
    }

    /// The grid the boxes snap to, if any.
    #[inline]
    pub fn grid(&self) -> Option<IsoGrid> {
        self.grid
    }

    /// Replaces the snapping grid.
    ///
    /// Already registered sprites keep their geometry until their next
    /// mutation, which snaps against the new grid.
    pub fn set_grid(&mut self, grid: Option<IsoGrid>) {
        self.grid = grid;
    }

    /// How many sprites are live.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether no sprite is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds a sprite and resolves the draw order, so the returned handle
    /// has a valid order before first display.
    pub fn register(&mut self, sprite: IsoSprite) -> SpriteHandle {
        debug_assert!(
            sprite.size.cmpge(Vec3::ZERO).all(),
            "sprite size must be non-negative"
        );

        let mut record = SpriteRecord {
            sprite,
            box_min: Vec3::ZERO,
            box_max: Vec3::ZERO,
            behind: SmallVec::new(),
            draw_order: 0,
        };
        record.recompute(self.grid);

        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].record = Some(record);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    record: Some(record),
                });
                self.slots.len() as u32 - 1
            }
        };
        let handle = SpriteHandle {
            index,
            generation: self.slots[index as usize].generation,
        };

        trace!("Registered sprite {handle}");

        self.rebuild_relations(handle);
        self.resolve();

        handle
    }

    /// Applies any subset of the geometry components, re-snaps and
    /// re-resolves the whole draw order.
    pub fn update_geometry(
        &mut self,
        handle: SpriteHandle,
        update: GeometryUpdate,
    ) {
        let grid = self.grid;

        let record = self.record_mut(handle);
        let GeometryUpdate {
            position,
            offset,
            size,
            scale,
        } = update;
        if let Some(position) = position {
            record.sprite.position = position;
        }
        if let Some(offset) = offset {
            record.sprite.offset = offset;
        }
        if let Some(size) = size {
            record.sprite.size = size;
        }
        if let Some(scale) = scale {
            record.sprite.scale = scale;
        }
        debug_assert!(
            record.sprite.size.cmpge(Vec3::ZERO).all(),
            "sprite size must be non-negative"
        );
        record.recompute(grid);

        self.rebuild_relations(handle);
        self.resolve();
    }

    /// Removes the sprite and purges its handle from every other sprite's
    /// behind set, so no dangling edge remains.
    ///
    /// The remaining sprites keep their draw orders; relative to each other
    /// they stay valid.
    pub fn unregister(&mut self, handle: SpriteHandle) {
        // validates the handle
        self.record(handle);

        let slot = &mut self.slots[handle.index as usize];
        slot.record = None;
        slot.generation += 1;
        self.free.push(handle.index);

        for slot in self.slots.iter_mut() {
            if let Some(record) = slot.record.as_mut() {
                record.behind.retain(|h| *h != handle);
            }
        }

        trace!("Unregistered sprite {handle}");
    }

    /// The most recently resolved draw order.
    ///
    /// Meaningless in isolation; lower orders are painted first.
    pub fn draw_order(&self, handle: SpriteHandle) -> i32 {
        self.record(handle).draw_order
    }

    /// The sprite's current geometry, including any snap correction
    /// applied to the anchor.
    pub fn sprite(&self, handle: SpriteHandle) -> &IsoSprite {
        &self.record(handle).sprite
    }

    /// The derived box corners, `(min, max)`.
    pub fn corners(&self, handle: SpriteHandle) -> (Vec3, Vec3) {
        let record = self.record(handle);
        (record.box_min, record.box_max)
    }

    /// Where on screen the sprite's anchor lands: the planar position
    /// projected isometrically, elevation raising it along screen y.
    pub fn screen_position(&self, handle: SpriteHandle) -> Vec2 {
        let position = self.record(handle).sprite.position;
        let screen = world_to_screen(position.truncate());
        Vec2::new(screen.x, screen.y + position.z)
    }

    /// Handles of all live sprites, in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = SpriteHandle> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.record.as_ref().map(|_| SpriteHandle {
                index: index as u32,
                generation: slot.generation,
            })
        })
    }

    fn record(&self, handle: SpriteHandle) -> &SpriteRecord {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.record.as_ref())
            .unwrap_or_else(|| panic!("No live sprite for handle {handle}"))
    }

    fn record_mut(&mut self, handle: SpriteHandle) -> &mut SpriteRecord {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.record.as_mut())
            .unwrap_or_else(|| panic!("No live sprite for handle {handle}"))
    }
}

/// Depth sorting logic.
impl DepthRegistry {
    fn handle_of(&self, index: usize) -> SpriteHandle {
        SpriteHandle {
            index: index as u32,
            generation: self.slots[index].generation,
        }
    }

    /// Recomputes the behind relation between the given sprite and every
    /// other live sprite, in both directions, replacing stale edges.
    /// Pairs not involving the sprite keep their edges.
    fn rebuild_relations(&mut self, handle: SpriteHandle) {
        let subject_index = handle.index as usize;
        let (subject_min, subject_max) = {
            let record = self.record(handle);
            (record.box_min, record.box_max)
        };

        let mut behind = SmallVec::new();
        for index in 0..self.slots.len() {
            if index == subject_index {
                continue;
            }
            let other_handle = self.handle_of(index);
            let Some(other) = self.slots[index].record.as_mut() else {
                continue;
            };

            if is_behind(
                (other.box_min, other.box_max),
                (subject_min, subject_max),
            ) {
                behind.push(other_handle);
            }

            let subject_behind_other = is_behind(
                (subject_min, subject_max),
                (other.box_min, other.box_max),
            );
            let present = other.behind.contains(&handle);
            if subject_behind_other && !present {
                other.behind.push(handle);
            } else if !subject_behind_other && present {
                other.behind.retain(|h| *h != handle);
            }
        }

        self.record_mut(handle).behind = behind;
    }

    /// Recomputes every live sprite's draw order from the current behind
    /// relation.
    ///
    /// Triggered by every mutating operation; public so that callers can
    /// re-resolve defensively, e.g. after a batch of unregisters.
    pub fn resolve(&mut self) {
        let mut visited = vec![false; self.slots.len()];
        let mut next_order = 0;

        for index in 0..self.slots.len() {
            if self.slots[index].record.is_some() && !visited[index] {
                self.visit(index, &mut visited, &mut next_order);
            }
        }

        trace!("Resolved draw order of {next_order} sprites");
    }

    /// Iterative post-order numbering: a sprite is marked visited on entry
    /// and numbered once everything behind it has been. The bitset, not the
    /// relation, guarantees termination, so a cyclic relation degrades the
    /// order instead of hanging the pass.
    fn visit(
        &mut self,
        root: usize,
        visited: &mut [bool],
        next_order: &mut i32,
    ) {
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        visited[root] = true;

        while let Some(&(index, cursor)) = stack.last() {
            let record = self.slots[index]
                .record
                .as_ref()
                .expect("behind edges only point at live sprites");

            match record.behind.get(cursor).copied() {
                Some(child) => {
                    stack.last_mut().expect("just peeked").1 += 1;

                    let child_index = child.index as usize;
                    if !visited[child_index] {
                        visited[child_index] = true;
                        stack.push((child_index, 0));
                    }
                }
                None => {
                    self.slots[index]
                        .record
                        .as_mut()
                        .expect("checked above")
                        .draw_order = *next_order;
                    *next_order += 1;
                    stack.pop();
                }
            }
        }
    }
}

impl SpriteRecord {
    /// Corners from the anchor, then the whole box (anchor included) nudged
    /// onto the grid. Elevation is never snapped.
    fn recompute(&mut self, grid: Option<IsoGrid>) {
        self.box_min = self.sprite.position + self.sprite.offset;
        self.box_max =
            self.box_min + self.sprite.size * self.sprite.scale;

        let Some(grid) = grid else { return };

        let delta = grid
            .snap_delta(self.box_min.truncate(), self.box_max.truncate())
            .extend(0.0);
        self.box_min += delta;
        self.box_max += delta;
        self.sprite.position += delta;
    }
}

/// Must `b` be painted before `a`?
///
/// Holds when b's footprint reaches past a's near corner in the plane and
/// b's vertical extent starts below a's top. Deliberately neither
/// antisymmetric nor acyclic: mutually overlapping boxes can be behind each
/// other at the same time.
fn is_behind(
    (b_min, b_max): (Vec3, Vec3),
    (a_min, a_max): (Vec3, Vec3),
) -> bool {
    b_max.x > a_min.x && b_max.y > a_min.y && b_min.z < a_max.z
}

#[cfg(test)]
mod tests {
    use bevy::utils::default;
    use itertools::Itertools;

    use super::*;

    fn boxed(position: Vec3, size: Vec3) -> IsoSprite {
        IsoSprite {
            position,
            size,
            ..default()
        }
    }

    /// In an acyclic configuration every occluder must come out strictly
    /// before its occludee.
    fn assert_consistent(registry: &DepthRegistry) {
        for a in registry.iter() {
            for b in registry.iter() {
                if a == b {
                    continue;
                }

                let b_behind_a =
                    is_behind(registry.corners(b), registry.corners(a));
                let a_behind_b =
                    is_behind(registry.corners(a), registry.corners(b));

                if b_behind_a && !a_behind_b {
                    assert!(
                        registry.draw_order(b) < registry.draw_order(a),
                        "{b} should be painted before {a}"
                    );
                }
            }
        }
    }

    #[test]
    fn it_recomputes_corners_from_anchor_offset_and_scaled_size() {
        let mut registry = DepthRegistry::new();

        let handle = registry.register(IsoSprite {
            position: Vec3::new(1.0, 2.0, 3.0),
            offset: Vec3::new(0.5, -0.5, 0.0),
            size: Vec3::new(2.0, 2.0, 1.0),
            scale: Vec3::new(2.0, 1.0, 1.0),
        });

        let (min, max) = registry.corners(handle);
        assert_eq!(min, Vec3::new(1.5, 1.5, 3.0));
        // scale applies to the size term only, not to the offset
        assert_eq!(max, Vec3::new(5.5, 3.5, 4.0));
    }

    #[test]
    fn it_projects_the_anchor_to_the_screen_with_elevation() {
        let mut registry = DepthRegistry::new();

        let handle =
            registry.register(boxed(Vec3::new(2.0, 3.0, 5.0), Vec3::ONE));

        assert_eq!(registry.screen_position(handle), Vec2::new(4.0, 7.0));
    }

    #[test]
    fn it_stacks_draw_order_by_elevation() {
        let mut registry = DepthRegistry::new();

        // registered deliberately out of elevation order
        let top = registry.register(boxed(Vec3::new(0.0, 0.0, 2.0), Vec3::ONE));
        let bottom =
            registry.register(boxed(Vec3::new(0.0, 0.0, 0.0), Vec3::ONE));
        let middle =
            registry.register(boxed(Vec3::new(0.0, 0.0, 1.0), Vec3::ONE));

        assert!(registry.draw_order(bottom) < registry.draw_order(middle));
        assert!(registry.draw_order(middle) < registry.draw_order(top));
        assert_consistent(&registry);
    }

    #[test]
    fn it_orders_any_registration_permutation_of_a_stack() {
        let geometries = [
            boxed(Vec3::new(0.0, 0.0, 0.0), Vec3::ONE),
            boxed(Vec3::new(0.0, 0.0, 1.0), Vec3::ONE),
            boxed(Vec3::new(0.0, 0.0, 2.0), Vec3::ONE),
        ];

        for permutation in (0..geometries.len()).permutations(3) {
            let mut registry = DepthRegistry::new();

            let mut handles = [None; 3];
            for i in permutation {
                handles[i] = Some(registry.register(geometries[i]));
            }
            let handles = handles.map(Option::unwrap);

            assert!(
                registry.draw_order(handles[0])
                    < registry.draw_order(handles[1])
            );
            assert!(
                registry.draw_order(handles[1])
                    < registry.draw_order(handles[2])
            );
            assert_consistent(&registry);
        }
    }

    #[test]
    fn it_terminates_on_mutually_ambiguous_overlap() {
        let mut registry = DepthRegistry::new();

        let a = registry.register(boxed(Vec3::ZERO, Vec3::ONE));
        let b =
            registry.register(boxed(Vec3::new(0.5, 0.5, 0.0), Vec3::ONE));

        // both are behind each other, the resolver must still assign two
        // distinct valid integers
        let orders = [registry.draw_order(a), registry.draw_order(b)];
        assert_ne!(orders[0], orders[1]);
        assert!(orders.contains(&0));
        assert!(orders.contains(&1));
    }

    #[test]
    fn it_resolves_deterministically() {
        let mut registry = DepthRegistry::new();

        let handles: Vec<_> = [
            boxed(Vec3::new(0.0, 0.0, 0.0), Vec3::ONE),
            boxed(Vec3::new(0.5, 0.5, 0.0), Vec3::ONE),
            boxed(Vec3::new(3.0, 3.0, 0.0), Vec3::new(2.0, 2.0, 2.0)),
            boxed(Vec3::new(0.0, 0.0, 1.0), Vec3::ONE),
        ]
        .into_iter()
        .map(|sprite| registry.register(sprite))
        .collect();

        let orders = |registry: &DepthRegistry| {
            handles
                .iter()
                .map(|handle| registry.draw_order(*handle))
                .collect::<Vec<_>>()
        };

        let first = orders(&registry);
        registry.resolve();
        assert_eq!(first, orders(&registry));
        registry.resolve();
        assert_eq!(first, orders(&registry));
    }

    #[test]
    fn it_reorders_after_geometry_changes() {
        let mut registry = DepthRegistry::new();

        let a = registry.register(boxed(Vec3::ZERO, Vec3::ONE));
        let b =
            registry.register(boxed(Vec3::new(0.0, 0.0, 1.0), Vec3::ONE));

        assert!(registry.draw_order(a) < registry.draw_order(b));

        // drop a below b
        registry.update_geometry(
            b,
            GeometryUpdate {
                position: Some(Vec3::new(0.0, 0.0, -1.0)),
                ..default()
            },
        );

        assert!(registry.draw_order(b) < registry.draw_order(a));
        assert_consistent(&registry);
    }

    #[test]
    fn it_snaps_boxes_on_registration_and_preserves_their_size() {
        let mut registry = DepthRegistry::with_grid(IsoGrid::new(1.0));

        let handle = registry.register(boxed(
            Vec3::new(0.9, 0.4, 0.25),
            Vec3::new(1.5, 2.5, 1.0),
        ));

        let (min, max) = registry.corners(handle);
        // the min corner decides the x axis (0.1 below the next line), the
        // max corner decides the y axis (0.1 below the line at 3)
        assert!((min.x - 1.0).abs() < 1e-5);
        assert!((min.y - 0.5).abs() < 1e-5);
        // elevation is never snapped
        assert_eq!(min.z, 0.25);
        // size survives exactly
        assert!((max - min - Vec3::new(1.5, 2.5, 1.0)).length() < 1e-5);

        // the anchor moved by the same delta, so corners still derive
        // from it
        let sprite = registry.sprite(handle);
        assert_eq!(min, sprite.position + sprite.offset);
    }

    #[test]
    fn it_snaps_idempotently() {
        let mut registry = DepthRegistry::with_grid(IsoGrid::new(0.5));

        let handle = registry.register(boxed(
            Vec3::new(0.3, -0.7, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
        ));
        let snapped = registry.sprite(handle).position;

        // an empty update re-runs the snap; an already snapped box must
        // not move
        registry.update_geometry(handle, default());
        assert_eq!(snapped, registry.sprite(handle).position);
    }

    #[test]
    fn it_accepts_zero_extent_boxes() {
        let mut registry = DepthRegistry::new();

        let flat =
            registry.register(boxed(Vec3::new(0.5, 0.5, 0.5), Vec3::ZERO));
        let around = registry.register(boxed(Vec3::ZERO, Vec3::ONE));

        assert_ne!(registry.draw_order(flat), registry.draw_order(around));
    }

    #[test]
    fn it_purges_removed_sprites_from_behind_sets() {
        let mut registry = DepthRegistry::new();

        // a mutually overlapping cluster so every behind set is populated
        let a = registry.register(boxed(Vec3::ZERO, Vec3::ONE));
        let b =
            registry.register(boxed(Vec3::new(0.5, 0.5, 0.0), Vec3::ONE));
        let c =
            registry.register(boxed(Vec3::new(0.25, 0.25, 0.0), Vec3::ONE));

        registry.unregister(b);

        assert_eq!(registry.len(), 2);
        for slot in &registry.slots {
            let Some(record) = slot.record.as_ref() else {
                continue;
            };
            assert!(
                !record.behind.contains(&b),
                "{b} still referenced after unregister"
            );
        }

        // the survivors still resolve
        registry.resolve();
        assert_ne!(registry.draw_order(a), registry.draw_order(c));
    }

    #[test]
    fn it_recycles_slots_under_a_new_generation() {
        let mut registry = DepthRegistry::new();

        let first = registry.register(boxed(Vec3::ZERO, Vec3::ONE));
        registry.unregister(first);
        let second = registry.register(boxed(Vec3::ZERO, Vec3::ONE));

        assert_ne!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    #[should_panic(expected = "No live sprite")]
    fn it_fails_fast_on_stale_handles() {
        let mut registry = DepthRegistry::new();

        let handle = registry.register(boxed(Vec3::ZERO, Vec3::ONE));
        registry.unregister(handle);

        registry.draw_order(handle);
    }
}
