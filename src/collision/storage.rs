//! Storage of static collider bounds, referenced by stable object numbers.

use thunderdome as td;

use super::shape::Rect;

/// Which kind of static geometry a collider belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum ColliderClass {
    /// An object placed in a tile map editor.
    TileMapObject,
    /// A tile whose class is marked solid in the tile set.
    TileSetTile,
    /// A collider added at runtime as part of a group.
    ManualCollider,
    /// One of the slabs surrounding the world bounds.
    WorldBounds,
}

/// Object numbers at the top of the range are reserved for the world bound slabs.
pub(crate) const WORLD_BOUND_OBJECTS: [u32; 4] = [u32::MAX, u32::MAX - 1, u32::MAX - 2, u32::MAX - 3];

/// A static collider as stored in a grid cell:
/// the collider's object number in the high half and a tag in the low half.
///
/// The tag is the tile object's class, the tile's class, the manual collider's group,
/// or the slab index for world bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StaticId(pub u64);

impl StaticId {
    #[inline]
    pub const fn new(object: u32, data: u32) -> Self {
        StaticId(((object as u64) << 32) | data as u64)
    }

    #[inline]
    pub const fn object(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub const fn data(self) -> u32 {
        self.0 as u32
    }
}

/// Free-list backed storage of static collider bounds.
///
/// Removing a collider frees its object number, and the most recently freed
/// number is the next one handed out.
#[derive(Debug)]
pub struct ColliderStorage {
    colliders: td::Arena<Rect>,
    soft_limit: u32,
    limit_warned: bool,
}

impl ColliderStorage {
    pub fn new(soft_limit: u32) -> Self {
        ColliderStorage {
            colliders: td::Arena::new(),
            soft_limit,
            limit_warned: false,
        }
    }

    /// Store a collider and return its object number.
    pub fn insert(&mut self, bounds: Rect) -> u32 {
        let object = self.colliders.insert(bounds).slot();
        debug_assert!(
            !WORLD_BOUND_OBJECTS.contains(&object),
            "collider storage ran into the reserved object numbers"
        );
        if self.colliders.len() as u32 > self.soft_limit && !self.limit_warned {
            self.limit_warned = true;
            log::warn!(
                "{} static colliders stored, more than the soft limit of {}",
                self.colliders.len(),
                self.soft_limit
            );
        }
        object
    }

    /// Free a collider's object number.
    pub fn remove(&mut self, object: u32) {
        let removed = self.colliders.remove_by_slot(object);
        debug_assert!(removed.is_some(), "collider {object} removed twice");
    }

    /// Bounds of a collider, or a zero rect if the object number is free.
    #[inline]
    pub fn get(&self, object: u32) -> Rect {
        self.colliders
            .get_by_slot(object)
            .map_or(Rect::ZERO, |(_, bounds)| *bounds)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }
}
