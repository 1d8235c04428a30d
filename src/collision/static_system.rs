//! Entity versus world collisions.
//!
//! Static geometry around a single entity is usually sparse, so instead of
//! splitting grid cells this phase splits the snapshot into index ranges.
//! Each entity is tested against the world bound slabs first, then against
//! the tile object, tile and manual collider grids of its map.

use super::{
    collector::{PairKey, PairSet, StaticPair, WorkerCollector},
    script::{ScriptRegistry, StaticHit},
    shape::{Rect, Shape, Transform},
    shape_shape::intersection_check,
    static_world::StaticWorld,
    storage::{ColliderClass, StaticId, WORLD_BOUND_OBJECTS},
    Collidable,
};
use crate::scheduler::{slice_ranges, JobScheduler};

pub(crate) type StaticCollector = WorkerCollector<StaticPair, StaticId>;

pub(crate) fn broad_phase<S: JobScheduler>(
    statics: &StaticWorld,
    snapshot: &[Collidable],
    collectors: &mut [StaticCollector],
    scheduler: &S,
    workers: usize,
    main_share: f32,
) {
    let _span = tracy_span!("static broad phase", "broad_phase");

    let ranges = slice_ranges(snapshot.len(), workers, main_share);
    let parts = &mut collectors[..ranges.len()];

    let job = |idx: usize, coll: &mut StaticCollector| {
        let _span = tracy_span!("static slice", "broad_phase");
        for entity in &snapshot[ranges[idx].clone()] {
            test_entity(statics, entity, coll);
        }
    };

    if workers == 0 {
        job(0, &mut parts[0]);
    } else {
        scheduler.run(parts, job);
    }
}

fn test_entity(statics: &StaticWorld, c: &Collidable, coll: &mut StaticCollector) {
    if let Some(slabs) = statics.world_slabs() {
        for (slab_idx, slab) in slabs.iter().enumerate() {
            let id = StaticId::new(WORLD_BOUND_OBJECTS[slab_idx], slab_idx as u32);
            test_collider(c, id, ColliderClass::WorldBounds, *slab, coll);
        }
    }

    for (grid, class) in statics.grids(c.pos.map) {
        coll.scratch.clear();
        grid.query(&c.bounds, &mut coll.scratch);
        if coll.scratch.is_empty() {
            continue;
        }
        // colliders spanning several cells show up once per cell
        coll.scratch.sort_unstable();
        coll.scratch.dedup();
        for i in 0..coll.scratch.len() {
            let id = coll.scratch[i];
            let bounds = statics.storage.get(id.object());
            if bounds.is_empty() {
                continue;
            }
            test_collider(c, id, class, bounds, coll);
        }
    }
}

#[inline]
fn test_collider(c: &Collidable, id: StaticId, class: ColliderClass, bounds: Rect, coll: &mut StaticCollector) {
    if !c.bounds.overlaps(&bounds) {
        return;
    }
    let collider = Shape::Rect {
        width: bounds.width,
        height: bounds.height,
    };
    let info = intersection_check(&c.shape, &c.transform, &collider, &Transform::at(bounds.x, bounds.y));
    if info.is_colliding {
        coll.pairs.push(StaticPair {
            entity: c.index,
            id,
            class,
            bounds,
            info,
        });
    }
}

/// Dispatch every entity-collider pair once, in collector order.
pub(crate) fn merge(
    snapshot: &[Collidable],
    collectors: &[StaticCollector],
    pair_set: &mut PairSet,
    ecs: &mut hecs::World,
    scripts: &mut ScriptRegistry,
    touched: &mut Vec<hecs::Entity>,
) -> Vec<(hecs::Entity, StaticId, ColliderClass)> {
    let _span = tracy_span!("static merge", "merge");

    let mut dispatched = Vec::new();
    for pair in collectors.iter().flat_map(|c| c.pairs.iter()) {
        let c = &snapshot[pair.entity as usize];
        if !ecs.contains(c.entity) {
            continue;
        }
        if !pair_set.insert(PairKey::fixed(c.entity, pair.id.object())) {
            continue;
        }

        let hit = StaticHit {
            class: pair.class,
            data: pair.id.data(),
            object: pair.id.object(),
            bounds: pair.bounds,
        };
        scripts.dispatch_static(ecs, c.pos.kind, c.entity, hit, pair.info);

        touched.push(c.entity);
        dispatched.push((c.entity, pair.id, pair.class));
    }
    dispatched
}
