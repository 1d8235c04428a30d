//! Entity versus entity collisions.
//!
//! The broad phase scans every occupied cell of every map's entity grid pairwise.
//! Cells are numbered globally across grids and split into contiguous ranges,
//! one per job. Jobs only read the grids and the snapshot and only write
//! their own collector, so they need no synchronization.

use super::{
    collector::{PairInfo, PairKey, PairSet, WorkerCollector},
    hash_grid::HashGrid,
    script::ScriptRegistry,
    shape_shape::intersection_check,
    Collidable,
};
use crate::scheduler::{slice_ranges, JobScheduler};

/// Values per grid block. A block of 14 snapshot indices plus its header fills one cache line.
pub const ENTITY_BLOCK: usize = 14;
pub type EntityGrid = HashGrid<u32, ENTITY_BLOCK>;

pub(crate) type DynamicCollector = WorkerCollector<PairInfo, u32>;

/// Find colliding entity pairs, spreading the cells over `workers` jobs plus the caller.
/// With zero workers everything runs on the calling thread.
pub(crate) fn broad_phase<S: JobScheduler>(
    grids: &[&EntityGrid],
    snapshot: &[Collidable],
    collectors: &mut [DynamicCollector],
    scheduler: &S,
    workers: usize,
    main_share: f32,
) {
    let _span = tracy_span!("dynamic broad phase", "broad_phase");

    let total_cells: usize = grids.iter().map(|g| g.cell_count()).sum();
    let ranges = slice_ranges(total_cells, workers, main_share);
    let parts = &mut collectors[..ranges.len()];

    let job = |idx: usize, coll: &mut DynamicCollector| {
        let _span = tracy_span!("dynamic slice", "broad_phase");
        let range = ranges[idx].clone();
        // translate the global cell range into per-grid ranges
        let mut offset = 0;
        for grid in grids {
            let count = grid.cell_count();
            let start = range.start.max(offset);
            let end = range.end.min(offset + count);
            for cell in start..end {
                scan_cell(grid, cell - offset, snapshot, coll);
            }
            offset += count;
            if offset >= range.end {
                break;
            }
        }
    };

    if workers == 0 {
        job(0, &mut parts[0]);
    } else {
        scheduler.run(parts, job);
    }
}

/// Test every pair in one cell.
fn scan_cell(grid: &EntityGrid, cell: usize, snapshot: &[Collidable], coll: &mut DynamicCollector) {
    coll.scratch.clear();
    coll.scratch.extend(grid.bucket(cell));

    let members = &coll.scratch;
    for (i, &a_idx) in members.iter().enumerate() {
        for &b_idx in &members[i + 1..] {
            if a_idx == b_idx {
                continue;
            }
            let (a_idx, b_idx) = (a_idx.min(b_idx), a_idx.max(b_idx));
            let a = &snapshot[a_idx as usize];
            let b = &snapshot[b_idx as usize];
            if a.pos.map != b.pos.map || !a.layer.intersects(b.layer) {
                continue;
            }
            if !a.bounds.overlaps(&b.bounds) {
                continue;
            }
            let info = intersection_check(&a.shape, &a.transform, &b.shape, &b.transform);
            if info.is_colliding {
                coll.pairs.push(PairInfo {
                    a: a_idx,
                    b: b_idx,
                    info,
                });
            }
        }
    }
}

/// Dispatch every pair found by the broad phase once, in collector order.
///
/// Entities despawned by an earlier handler are skipped.
/// Returns the dispatched pairs, and every entity that took part is pushed to `touched`.
pub(crate) fn merge(
    snapshot: &[Collidable],
    collectors: &[DynamicCollector],
    pair_set: &mut PairSet,
    ecs: &mut hecs::World,
    scripts: &mut ScriptRegistry,
    touched: &mut Vec<hecs::Entity>,
) -> Vec<(hecs::Entity, hecs::Entity)> {
    let _span = tracy_span!("dynamic merge", "merge");

    let mut dispatched = Vec::new();
    for pair in collectors.iter().flat_map(|c| c.pairs.iter()) {
        let a = &snapshot[pair.a as usize];
        let b = &snapshot[pair.b as usize];
        if !ecs.contains(a.entity) || !ecs.contains(b.entity) {
            continue;
        }
        if !pair_set.insert(PairKey::dynamic(a.entity, b.entity)) {
            continue;
        }

        scripts.dispatch_dynamic(ecs, a.pos.kind, a.entity, b.entity, b.shape.kind(), pair.info);
        if ecs.contains(a.entity) && ecs.contains(b.entity) {
            scripts.dispatch_dynamic(
                ecs,
                b.pos.kind,
                b.entity,
                a.entity,
                a.shape.kind(),
                pair.info.flipped(),
            );
        }

        touched.push(a.entity);
        touched.push(b.entity);
        dispatched.push((a.entity, b.entity));
    }
    dispatched
}
