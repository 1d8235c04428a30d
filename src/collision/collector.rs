//! Per-thread output of the broad phase and the keys used to deduplicate it.

use rustc_hash::FxHashSet;

use super::{
    shape::Rect,
    shape_shape::CollisionInfo,
    storage::{ColliderClass, StaticId},
};

/// Colliding entity pair found by the dynamic broad phase.
/// Entities are referred to by their index in the tick's snapshot.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PairInfo {
    pub a: u32,
    pub b: u32,
    /// Normal points from `a` to `b`.
    pub info: CollisionInfo,
}

/// Entity colliding with a piece of static geometry.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StaticPair {
    pub entity: u32,
    pub id: StaticId,
    pub class: ColliderClass,
    pub bounds: Rect,
    /// Normal points from the entity to the collider.
    pub info: CollisionInfo,
}

/// Output buffer owned by exactly one job during the parallel phase.
/// Aligned to a cache line so that neighboring collectors
/// written by different threads don't share one.
#[derive(Debug)]
#[repr(align(64))]
pub(crate) struct WorkerCollector<T, S> {
    pub pairs: Vec<T>,
    /// Reused per-cell or per-query working space.
    pub scratch: Vec<S>,
}

impl<T, S> Default for WorkerCollector<T, S> {
    fn default() -> Self {
        WorkerCollector {
            pairs: Vec::new(),
            scratch: Vec::new(),
        }
    }
}

/// Resize to `count` collectors, keeping existing allocations.
pub(crate) fn ensure_collectors<T, S>(collectors: &mut Vec<WorkerCollector<T, S>>, count: usize) {
    if collectors.len() < count {
        collectors.resize_with(count, Default::default);
    }
    for c in collectors.iter_mut() {
        c.pairs.clear();
    }
}

/// Identifies one pair for deduplication within a tick.
///
/// Entity pairs and entity-collider pairs are separate variants,
/// so both kinds share one set without their keys ever colliding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum PairKey {
    /// Lower entity id in the high half.
    Dynamic(u64),
    /// Entity id in the high half, collider object number in the low half.
    Static(u64),
}

impl PairKey {
    #[inline]
    pub fn dynamic(a: hecs::Entity, b: hecs::Entity) -> Self {
        let (lo, hi) = if a.id() < b.id() {
            (a.id(), b.id())
        } else {
            (b.id(), a.id())
        };
        PairKey::Dynamic(((lo as u64) << 32) | hi as u64)
    }

    #[inline]
    pub fn fixed(entity: hecs::Entity, object: u32) -> Self {
        PairKey::Static(((entity.id() as u64) << 32) | object as u64)
    }
}

pub(crate) type PairSet = FxHashSet<PairKey>;
