//! Gameplay reactions to collisions.

use rustc_hash::FxHashMap;

use super::{
    shape::{CollisionShape, EntityKind, Rect, ShapeKind},
    shape_shape::CollisionInfo,
    storage::ColliderClass,
};

/// The static collider an entity ran into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StaticHit {
    pub class: ColliderClass,
    /// Tag of the collider: the tile object's class, the tile's class,
    /// the manual collider's group, or the world bound slab index.
    pub data: u32,
    /// Object number of the collider in the collider storage.
    pub object: u32,
    pub bounds: Rect,
}

/// Collision handlers for one kind of entity.
///
/// Handlers run on the calling thread during the merge phase, after all collisions
/// of the tick have been found but before any resolution is applied,
/// so every handler sees the same positions.
/// Handlers may freely modify the world, including despawning entities;
/// pairs involving despawned entities are skipped.
///
/// To have the collision push the entity out, call
/// [`accumulate`][CollisionInfo::accumulate] on the info.
pub trait CollisionScript {
    /// Called once for each side of a colliding entity pair.
    /// The normal points from `this` toward `other`.
    #[allow(unused_variables)]
    fn on_dynamic_collision(
        &mut self,
        world: &mut hecs::World,
        this: hecs::Entity,
        other: hecs::Entity,
        info: &mut CollisionInfo,
    ) {
    }

    /// Called when `this` collides with static geometry.
    /// The normal points from `this` toward the collider.
    #[allow(unused_variables)]
    fn on_static_collision(
        &mut self,
        world: &mut hecs::World,
        this: hecs::Entity,
        hit: StaticHit,
        info: &mut CollisionInfo,
    ) {
    }
}

/// Scripts by the kind of entity they handle.
#[derive(Default)]
pub struct ScriptRegistry {
    scripts: FxHashMap<EntityKind, Box<dyn CollisionScript>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the script of an entity kind, returning the previous one.
    pub fn insert(
        &mut self,
        kind: EntityKind,
        script: impl CollisionScript + 'static,
    ) -> Option<Box<dyn CollisionScript>> {
        self.scripts.insert(kind, Box::new(script))
    }

    pub fn remove(&mut self, kind: EntityKind) -> Option<Box<dyn CollisionScript>> {
        self.scripts.remove(&kind)
    }

    pub(crate) fn dispatch_dynamic(
        &mut self,
        world: &mut hecs::World,
        kind: EntityKind,
        this: hecs::Entity,
        other: hecs::Entity,
        other_shape: ShapeKind,
        mut info: CollisionInfo,
    ) {
        if let Some(script) = self.scripts.get_mut(&kind) {
            script.on_dynamic_collision(world, this, other, &mut info);
        }
        accumulate_if_marked(world, this, other_shape, &info);
    }

    pub(crate) fn dispatch_static(
        &mut self,
        world: &mut hecs::World,
        kind: EntityKind,
        this: hecs::Entity,
        hit: StaticHit,
        mut info: CollisionInfo,
    ) {
        if let Some(script) = self.scripts.get_mut(&kind) {
            script.on_static_collision(world, this, hit, &mut info);
        }
        // static colliders are always rects
        accumulate_if_marked(world, this, ShapeKind::Rect, &info);
    }
}

impl std::fmt::Debug for ScriptRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.scripts.keys()).finish()
    }
}

fn accumulate_if_marked(world: &mut hecs::World, this: hecs::Entity, other: ShapeKind, info: &CollisionInfo) {
    if !info.accumulated {
        return;
    }
    // the handler may have despawned the entity or removed its shape
    if let Ok(mut shape) = world.get::<&mut CollisionShape>(this) {
        shape.accumulate(info, other);
    }
}
