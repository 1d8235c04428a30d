pub mod collector;
pub mod dynamic;
pub mod hash_grid;
pub mod script;
pub mod shape;
pub mod shape_shape;
pub mod static_system;
pub mod static_world;
pub mod storage;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{config::CollisionConfig, error::Result, scheduler::JobScheduler};
use collector::{ensure_collectors, PairSet};
use dynamic::{DynamicCollector, EntityGrid};
use script::ScriptRegistry;
use shape::{CollisionShape, Contacts, LayerMask, MapId, Position, Rect, Shape, Transform};
use static_system::StaticCollector;
use static_world::{StaticWorld, TileMap, TileObject, TileSet};
use storage::{ColliderClass, StaticId};

/// One entity's collision state, copied out of the ECS at the start of a tick
/// so the parallel phases never touch the ECS.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Collidable {
    pub entity: hecs::Entity,
    /// Position of this entry in the snapshot.
    pub index: u32,
    pub pos: Position,
    pub shape: Shape,
    pub transform: Transform,
    pub layer: LayerMask,
    pub bounds: Rect,
}

/// What happened during one [`CollisionWorld::tick`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    /// Number of entities that took part.
    pub entities: usize,
    /// Whether broad phase work was spread over worker threads.
    pub parallel: bool,
    /// Entity pairs whose handlers were called, in dispatch order.
    pub dynamic_pairs: Vec<(hecs::Entity, hecs::Entity)>,
    /// Entity-collider pairs whose handlers were called, in dispatch order.
    pub static_pairs: Vec<(hecs::Entity, StaticId, ColliderClass)>,
}

/// All collision state of one simulation.
#[derive(Debug)]
pub struct CollisionWorld {
    config: CollisionConfig,
    snapshot: Vec<Collidable>,
    /// Entities already in the snapshot.
    listed: FxHashSet<hecs::Entity>,
    entity_grids: FxHashMap<MapId, EntityGrid>,
    statics: StaticWorld,
    dynamic_collectors: Vec<DynamicCollector>,
    static_collectors: Vec<StaticCollector>,
    pair_set: PairSet,
    touched: Vec<hecs::Entity>,
}

impl Default for CollisionWorld {
    fn default() -> Self {
        Self::with_valid_config(CollisionConfig::default())
    }
}

impl CollisionWorld {
    pub fn new(config: CollisionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: CollisionConfig) -> Self {
        CollisionWorld {
            statics: StaticWorld::new(&config),
            config,
            snapshot: Vec::new(),
            listed: FxHashSet::default(),
            entity_grids: FxHashMap::default(),
            dynamic_collectors: Vec::new(),
            static_collectors: Vec::new(),
            pair_set: PairSet::default(),
            touched: Vec::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &CollisionConfig {
        &self.config
    }

    #[inline]
    pub fn statics(&self) -> &StaticWorld {
        &self.statics
    }

    #[inline]
    pub fn statics_mut(&mut self) -> &mut StaticWorld {
        &mut self.statics
    }

    /// See [`StaticWorld::set_world_bounds`].
    pub fn set_world_bounds(&mut self, bounds: Rect) {
        self.statics.set_world_bounds(bounds);
    }

    /// See [`StaticWorld::load_map_objects`].
    pub fn load_map_objects(
        &mut self,
        map: MapId,
        layer: usize,
        objects: &[TileObject],
        scale: f32,
    ) -> Result<()> {
        self.statics.load_map_objects(map, layer, objects, scale)
    }

    /// See [`StaticWorld::set_tile_set`].
    pub fn set_tile_set(&mut self, tile_set: &TileSet, solid_classes: &[u32], scale: f32) {
        self.statics.set_tile_set(tile_set, solid_classes, scale);
    }

    /// See [`StaticWorld::load_tile_map`].
    pub fn load_tile_map(&mut self, map: MapId, tile_map: &TileMap, layers: &[usize]) -> Result<()> {
        self.statics.load_tile_map(map, tile_map, layers)
    }

    pub fn is_solid_tile(&self, map: MapId, tile_x: u32, tile_y: u32) -> bool {
        self.statics.is_solid_tile(map, tile_x, tile_y)
    }

    pub fn add_manual_collider(&mut self, map: MapId, group: u32, bounds: Rect) {
        self.statics.add_manual_collider(map, group, bounds);
    }

    pub fn remove_collider_group(&mut self, group: u32) {
        self.statics.remove_collider_group(group);
    }

    pub fn unload_map(&mut self, map: MapId) {
        self.statics.unload_map(map);
    }

    /// Detect collisions among the `eligible` entities and against static geometry,
    /// call collision handlers, and move entities by their accumulated resolution.
    ///
    /// Entities without a [`Position`] and a [`CollisionShape`] are ignored,
    /// as are repeated entries in `eligible`.
    /// Handlers see every entity where it was at the start of the tick;
    /// resolution is applied only once all of them have run.
    pub fn tick<S: JobScheduler>(
        &mut self,
        ecs: &mut hecs::World,
        eligible: &[hecs::Entity],
        scripts: &mut ScriptRegistry,
        scheduler: &S,
    ) -> TickReport {
        let _span = tracy_span!("collision tick", "tick");

        //
        // Populate
        //

        self.populate(ecs, eligible);

        let parallel =
            self.snapshot.len() > self.config.serial_threshold && scheduler.worker_count() > 0;
        let workers = if parallel { scheduler.worker_count() } else { 0 };
        ensure_collectors(&mut self.dynamic_collectors, workers + 1);
        ensure_collectors(&mut self.static_collectors, workers + 1);

        //
        // Entities against entities
        //

        let mut grids: Vec<(&MapId, &EntityGrid)> = self
            .entity_grids
            .iter()
            .filter(|(_, g)| !g.is_empty())
            .collect();
        // map order fixes the dispatch order
        grids.sort_unstable_by_key(|(map, _)| **map);
        let grids: Vec<&EntityGrid> = grids.into_iter().map(|(_, g)| g).collect();

        dynamic::broad_phase(
            &grids,
            &self.snapshot,
            &mut self.dynamic_collectors,
            scheduler,
            workers,
            self.config.main_thread_share,
        );
        let dynamic_pairs = dynamic::merge(
            &self.snapshot,
            &self.dynamic_collectors,
            &mut self.pair_set,
            ecs,
            scripts,
            &mut self.touched,
        );

        //
        // Entities against the world
        //

        static_system::broad_phase(
            &self.statics,
            &self.snapshot,
            &mut self.static_collectors,
            scheduler,
            workers,
            self.config.main_thread_share,
        );
        let static_pairs = static_system::merge(
            &self.snapshot,
            &self.static_collectors,
            &mut self.pair_set,
            ecs,
            scripts,
            &mut self.touched,
        );

        //
        // Resolve
        //

        self.resolve(ecs);

        //
        // Clean up
        //

        self.pair_set.clear();
        for c in &mut self.dynamic_collectors {
            c.pairs.clear();
        }
        for c in &mut self.static_collectors {
            c.pairs.clear();
        }

        TickReport {
            entities: self.snapshot.len(),
            parallel,
            dynamic_pairs,
            static_pairs,
        }
    }

    /// Snapshot the eligible entities and rebuild the entity grids from scratch.
    fn populate(&mut self, ecs: &mut hecs::World, eligible: &[hecs::Entity]) {
        let _span = tracy_span!("populate", "populate");

        self.snapshot.clear();
        self.listed.clear();
        for grid in self.entity_grids.values_mut() {
            grid.clear();
        }

        for &entity in eligible {
            if !self.listed.insert(entity) {
                continue;
            }
            let Ok((pos, coll)) = ecs.query_one_mut::<(&Position, &mut CollisionShape)>(entity)
            else {
                continue;
            };
            coll.resolution = Default::default();
            coll.contacts = Contacts::default();

            let transform = Transform::of(pos, coll);
            let index = self.snapshot.len() as u32;
            let c = Collidable {
                entity,
                index,
                pos: *pos,
                shape: coll.shape,
                transform,
                layer: coll.layer,
                bounds: coll.shape.bounds(&transform),
            };

            let cell_size = self.config.cell_size;
            let grid = self
                .entity_grids
                .entry(pos.map)
                .or_insert_with(|| EntityGrid::new(cell_size));
            if transform.is_rotated() {
                grid.insert_corners(index, &c.shape.corners(&transform));
            } else {
                grid.insert(index, &c.bounds);
            }
            self.snapshot.push(c);
        }
    }

    /// Move every entity that collided this tick by its accumulated resolution.
    fn resolve(&mut self, ecs: &mut hecs::World) {
        let _span = tracy_span!("resolve", "resolve");

        for entity in self.touched.drain(..) {
            // despawned by a handler
            let Ok((pos, coll)) = ecs.query_one_mut::<(&mut Position, &mut CollisionShape)>(entity)
            else {
                continue;
            };
            pos.x += coll.resolution.x;
            pos.y += coll.resolution.y;
            coll.resolution = Default::default();
        }
    }
}

/// Every entity with both a [`Position`] and a [`CollisionShape`].
pub fn collidable_entities(ecs: &hecs::World) -> Vec<hecs::Entity> {
    ecs.query::<(&Position, &CollisionShape)>()
        .iter()
        .map(|(entity, _)| entity)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::{
        script::{CollisionScript, StaticHit},
        shape::{ContactDirs, EntityKind},
        shape_shape::CollisionInfo,
        *,
    };
    use crate::{math::Vec2, scheduler::SerialScheduler};

    const MAP: MapId = MapId(0);
    const PLAYER: EntityKind = EntityKind(1);
    const PROP: EntityKind = EntityKind(2);

    type Log = Rc<RefCell<Vec<(hecs::Entity, hecs::Entity)>>>;

    /// Records every dynamic collision and optionally accumulates them.
    struct Recorder {
        log: Log,
        accumulate: bool,
    }

    impl CollisionScript for Recorder {
        fn on_dynamic_collision(
            &mut self,
            _world: &mut hecs::World,
            this: hecs::Entity,
            other: hecs::Entity,
            info: &mut CollisionInfo,
        ) {
            self.log.borrow_mut().push((this, other));
            if self.accumulate {
                info.accumulate();
            }
        }
    }

    fn spawn_rect(ecs: &mut hecs::World, kind: EntityKind, x: f32, y: f32, w: f32, h: f32) -> hecs::Entity {
        ecs.spawn((Position::new(x, y, MAP, kind), CollisionShape::rect(w, h)))
    }

    fn tick(world: &mut CollisionWorld, ecs: &mut hecs::World, scripts: &mut ScriptRegistry) -> TickReport {
        let eligible = collidable_entities(ecs);
        world.tick(ecs, &eligible, scripts, &SerialScheduler)
    }

    #[test]
    fn pairs_sharing_many_cells_dispatch_once_per_side() {
        let mut world = CollisionWorld::new(CollisionConfig {
            cell_size: 8.0,
            ..Default::default()
        })
        .unwrap();
        let mut ecs = hecs::World::new();
        // both span a 6x6 block of cells and share most of them
        let a = spawn_rect(&mut ecs, PLAYER, 0.0, 0.0, 40.0, 40.0);
        let b = spawn_rect(&mut ecs, PLAYER, 4.0, 4.0, 40.0, 40.0);

        let log = Log::default();
        let mut scripts = ScriptRegistry::new();
        scripts.insert(
            PLAYER,
            Recorder {
                log: log.clone(),
                accumulate: false,
            },
        );

        let report = tick(&mut world, &mut ecs, &mut scripts);
        assert_eq!(report.entities, 2);
        assert!(!report.parallel);
        assert_eq!(report.dynamic_pairs, vec![(a, b)]);
        assert_eq!(*log.borrow(), vec![(a, b), (b, a)]);

        // nothing carries over into the next tick
        let report = tick(&mut world, &mut ecs, &mut scripts);
        assert_eq!(report.dynamic_pairs.len(), 1);
        assert_eq!(log.borrow().len(), 4);
    }

    /// Despawns everything it touches.
    struct Eater {
        eaten: Rc<RefCell<usize>>,
    }

    impl CollisionScript for Eater {
        fn on_dynamic_collision(
            &mut self,
            world: &mut hecs::World,
            _this: hecs::Entity,
            other: hecs::Entity,
            _info: &mut CollisionInfo,
        ) {
            if world.despawn(other).is_ok() {
                *self.eaten.borrow_mut() += 1;
            }
        }
    }

    #[test]
    fn pairs_with_despawned_entities_are_skipped() {
        let mut world = CollisionWorld::default();
        let mut ecs = hecs::World::new();
        let eater = spawn_rect(&mut ecs, PLAYER, 0.0, 0.0, 20.0, 20.0);
        let b = spawn_rect(&mut ecs, PROP, 5.0, 5.0, 10.0, 10.0);
        let c = spawn_rect(&mut ecs, PROP, 8.0, 8.0, 10.0, 10.0);

        let eaten = Rc::new(RefCell::new(0));
        let log = Log::default();
        let mut scripts = ScriptRegistry::new();
        scripts.insert(
            PLAYER,
            Eater {
                eaten: eaten.clone(),
            },
        );
        scripts.insert(
            PROP,
            Recorder {
                log: log.clone(),
                accumulate: true,
            },
        );

        let report = tick(&mut world, &mut ecs, &mut scripts);
        // (eater, b) and (eater, c) dispatch, (b, c) is moot by then
        assert_eq!(report.dynamic_pairs, vec![(eater, b), (eater, c)]);
        assert_eq!(*eaten.borrow(), 2);
        assert!(log.borrow().is_empty());
        assert!(ecs.contains(eater));
        assert!(!ecs.contains(b) && !ecs.contains(c));
    }

    /// Records where its entity was each time a handler ran, and accumulates.
    struct PositionRecorder {
        seen: Rc<RefCell<Vec<(f32, f32)>>>,
    }

    impl CollisionScript for PositionRecorder {
        fn on_dynamic_collision(
            &mut self,
            world: &mut hecs::World,
            this: hecs::Entity,
            _other: hecs::Entity,
            info: &mut CollisionInfo,
        ) {
            let pos = world.get::<&Position>(this).unwrap();
            self.seen.borrow_mut().push((pos.x, pos.y));
            info.accumulate();
        }
    }

    #[test]
    fn resolution_waits_for_every_handler() {
        let mut world = CollisionWorld::default();
        let mut ecs = hecs::World::new();
        let player = spawn_rect(&mut ecs, PLAYER, 0.0, 0.0, 10.0, 10.0);
        // ground overlapping by 2 below, wall overlapping by 2 to the right
        let ground = spawn_rect(&mut ecs, PROP, 0.0, 8.0, 10.0, 10.0);
        let wall = spawn_rect(&mut ecs, PROP, 8.0, -20.0, 10.0, 28.0);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut scripts = ScriptRegistry::new();
        scripts.insert(PLAYER, PositionRecorder { seen: seen.clone() });

        let report = tick(&mut world, &mut ecs, &mut scripts);
        assert_eq!(report.dynamic_pairs.len(), 2);
        assert_eq!(*seen.borrow(), vec![(0.0, 0.0), (0.0, 0.0)]);

        let pos = *ecs.get::<&Position>(player).unwrap();
        assert_eq!((pos.x, pos.y), (-2.0, -2.0));
        let shape = ecs.get::<&CollisionShape>(player).unwrap();
        assert_eq!(shape.resolution(), Vec2::zero());
        assert_eq!(shape.contacts.dirs, ContactDirs::BOTTOM | ContactDirs::RIGHT);
        assert!(shape.contacts.last.is_some());

        // props have no script and stay put
        let ground_pos = *ecs.get::<&Position>(ground).unwrap();
        assert_eq!((ground_pos.x, ground_pos.y), (0.0, 8.0));
        let wall_pos = *ecs.get::<&Position>(wall).unwrap();
        assert_eq!((wall_pos.x, wall_pos.y), (8.0, -20.0));
    }

    #[test]
    fn contacts_clear_on_the_next_tick() {
        let mut world = CollisionWorld::default();
        let mut ecs = hecs::World::new();
        let player = spawn_rect(&mut ecs, PLAYER, 0.0, 0.0, 10.0, 10.0);
        let ground = spawn_rect(&mut ecs, PROP, 0.0, 8.0, 10.0, 10.0);

        let mut scripts = ScriptRegistry::new();
        scripts.insert(
            PLAYER,
            Recorder {
                log: Log::default(),
                accumulate: true,
            },
        );
        tick(&mut world, &mut ecs, &mut scripts);
        assert_eq!(
            ecs.get::<&CollisionShape>(player).unwrap().contacts.dirs,
            ContactDirs::BOTTOM
        );

        ecs.despawn(ground).unwrap();
        tick(&mut world, &mut ecs, &mut scripts);
        assert_eq!(
            ecs.get::<&CollisionShape>(player).unwrap().contacts,
            Contacts::default()
        );
    }

    #[test]
    fn layers_and_maps_filter_pairs() {
        let mut world = CollisionWorld::default();
        let mut ecs = hecs::World::new();
        let a = ecs.spawn((
            Position::new(0.0, 0.0, MAP, PROP),
            CollisionShape::rect(10.0, 10.0).with_layer(LayerMask::layer(1)),
        ));
        let b = ecs.spawn((
            Position::new(5.0, 0.0, MAP, PROP),
            CollisionShape::rect(10.0, 10.0).with_layer(LayerMask::layer(2)),
        ));
        // same place, different map
        ecs.spawn((
            Position::new(2.0, 0.0, MapId(1), PROP),
            CollisionShape::rect(10.0, 10.0).with_layer(LayerMask::ALL),
        ));

        let mut scripts = ScriptRegistry::new();
        assert!(tick(&mut world, &mut ecs, &mut scripts).dynamic_pairs.is_empty());

        ecs.get::<&mut CollisionShape>(b).unwrap().layer = LayerMask::layer(1) | LayerMask::layer(2);
        assert_eq!(tick(&mut world, &mut ecs, &mut scripts).dynamic_pairs, vec![(a, b)]);
    }

    #[test]
    fn ineligible_entities_are_ignored() {
        let mut world = CollisionWorld::default();
        let mut ecs = hecs::World::new();
        let a = spawn_rect(&mut ecs, PROP, 0.0, 0.0, 10.0, 10.0);
        let b = spawn_rect(&mut ecs, PROP, 5.0, 0.0, 10.0, 10.0);
        let shapeless = ecs.spawn((Position::new(5.0, 5.0, MAP, PROP),));

        let mut scripts = ScriptRegistry::new();
        let report = world.tick(&mut ecs, &[a, shapeless], &mut scripts, &SerialScheduler);
        assert_eq!(report.entities, 1);
        assert!(report.dynamic_pairs.is_empty());

        let report = world.tick(&mut ecs, &[a, b], &mut scripts, &SerialScheduler);
        assert_eq!(report.dynamic_pairs, vec![(a, b)]);
    }

    /// Records static hits and accumulates them.
    struct StaticRecorder {
        hits: Rc<RefCell<Vec<StaticHit>>>,
    }

    impl CollisionScript for StaticRecorder {
        fn on_static_collision(
            &mut self,
            _world: &mut hecs::World,
            _this: hecs::Entity,
            hit: StaticHit,
            info: &mut CollisionInfo,
        ) {
            self.hits.borrow_mut().push(hit);
            info.accumulate();
        }
    }

    #[test]
    fn world_bounds_push_entities_back_inside() {
        let mut world = CollisionWorld::default();
        world.set_world_bounds(Rect::new(0.0, 0.0, 100.0, 100.0));
        let mut ecs = hecs::World::new();
        let player = spawn_rect(&mut ecs, PLAYER, -3.0, 5.0, 10.0, 10.0);

        let hits = Rc::new(RefCell::new(Vec::new()));
        let mut scripts = ScriptRegistry::new();
        scripts.insert(PLAYER, StaticRecorder { hits: hits.clone() });

        let report = tick(&mut world, &mut ecs, &mut scripts);
        assert_eq!(
            report.static_pairs,
            vec![(player, StaticId::new(u32::MAX, 0), ColliderClass::WorldBounds)]
        );
        let hit = hits.borrow()[0];
        assert_eq!(hit.class, ColliderClass::WorldBounds);
        assert_eq!(hit.data, 0);
        assert_eq!(hit.bounds, world.statics().world_slabs().unwrap()[0]);

        let pos = *ecs.get::<&Position>(player).unwrap();
        assert_eq!((pos.x, pos.y), (0.0, 5.0));
        // touching the bound afterwards is not a collision
        assert!(tick(&mut world, &mut ecs, &mut scripts).static_pairs.is_empty());
    }

    #[test]
    fn static_hits_carry_class_and_tag() {
        let mut world = CollisionWorld::new(CollisionConfig {
            cell_size: 16.0,
            ..Default::default()
        })
        .unwrap();
        world
            .load_map_objects(
                MAP,
                0,
                &[TileObject {
                    x: 0.0,
                    y: 20.0,
                    width: 64.0,
                    height: 8.0,
                    class: 11,
                    visible: true,
                }],
                1.0,
            )
            .unwrap();
        world.add_manual_collider(MAP, 3, Rect::new(30.0, 0.0, 8.0, 40.0));
        let mut ecs = hecs::World::new();
        // a player spanning several cells of both colliders
        let player = spawn_rect(&mut ecs, PLAYER, 26.0, 14.0, 40.0, 8.0);

        let hits = Rc::new(RefCell::new(Vec::new()));
        let mut scripts = ScriptRegistry::new();
        scripts.insert(PLAYER, StaticRecorder { hits: hits.clone() });

        let report = tick(&mut world, &mut ecs, &mut scripts);
        assert_eq!(report.static_pairs.len(), 2);
        let mut seen: Vec<(ColliderClass, u32)> =
            hits.borrow().iter().map(|h| (h.class, h.data)).collect();
        seen.sort_by_key(|(_, data)| *data);
        assert_eq!(
            seen,
            vec![(ColliderClass::ManualCollider, 3), (ColliderClass::TileMapObject, 11)]
        );
        assert!(report.static_pairs.iter().all(|(e, _, _)| *e == player));

        world.remove_collider_group(3);
        world.unload_map(MAP);
        hits.borrow_mut().clear();
        ecs.get::<&mut Position>(player).unwrap().x = 26.0;
        let report = tick(&mut world, &mut ecs, &mut scripts);
        assert!(report.static_pairs.is_empty());
        assert!(hits.borrow().is_empty());
    }

    #[test]
    fn tiles_collide_after_loading() {
        let mut world = CollisionWorld::default();
        let tile_set = TileSet {
            tile_size: 16.0,
            tiles: vec![static_world::TileInfo {
                tile_id: 0,
                class: 7,
                collision: None,
            }],
        };
        world.set_tile_set(&tile_set, &[7], 1.0);
        // a floor along the bottom row of a 4x2 map
        let tile_map = TileMap {
            width: 4,
            height: 2,
            layers: vec![vec![0, 0, 0, 0, 1, 1, 1, 1]],
        };
        world.load_tile_map(MAP, &tile_map, &[0]).unwrap();
        assert!(world.is_solid_tile(MAP, 3, 1));
        assert!(!world.is_solid_tile(MAP, 3, 0));

        let mut ecs = hecs::World::new();
        spawn_rect(&mut ecs, PLAYER, 10.0, 4.0, 16.0, 14.0);
        let mut scripts = ScriptRegistry::new();
        let report = tick(&mut world, &mut ecs, &mut scripts);
        // overlapping tiles 0 and 1 of the floor, tagged with the tile class
        assert_eq!(report.static_pairs.len(), 2);
        assert!(report
            .static_pairs
            .iter()
            .all(|(_, id, class)| *class == ColliderClass::TileSetTile && id.data() == 7));
    }

    #[test]
    fn floor_seams_do_not_snag() {
        let mut world = CollisionWorld::default();
        let tile_set = TileSet {
            tile_size: 16.0,
            tiles: vec![static_world::TileInfo {
                tile_id: 0,
                class: 1,
                collision: None,
            }],
        };
        world.set_tile_set(&tile_set, &[1], 1.0);
        let tile_map = TileMap {
            width: 4,
            height: 2,
            layers: vec![vec![0, 0, 0, 0, 1, 1, 1, 1]],
        };
        world.load_tile_map(MAP, &tile_map, &[0]).unwrap();

        let mut ecs = hecs::World::new();
        // sunk 2 into the floor, straddling the seam between tiles 0 and 1
        let player = spawn_rect(&mut ecs, PLAYER, 1.0, 2.0, 16.0, 16.0);
        let hits = Rc::new(RefCell::new(Vec::new()));
        let mut scripts = ScriptRegistry::new();
        scripts.insert(PLAYER, StaticRecorder { hits: hits.clone() });

        let report = tick(&mut world, &mut ecs, &mut scripts);
        assert_eq!(report.static_pairs.len(), 2);
        let pos = *ecs.get::<&Position>(player).unwrap();
        assert_eq!((pos.x, pos.y), (1.0, 0.0));
        assert_eq!(
            ecs.get::<&CollisionShape>(player).unwrap().contacts.dirs,
            ContactDirs::BOTTOM
        );
    }

    #[test]
    fn repeated_eligible_entities_count_once() {
        let mut world = CollisionWorld::default();
        let mut ecs = hecs::World::new();
        let a = spawn_rect(&mut ecs, PROP, 0.0, 0.0, 10.0, 10.0);
        let b = spawn_rect(&mut ecs, PROP, 5.0, 0.0, 10.0, 10.0);

        let log = Log::default();
        let mut scripts = ScriptRegistry::new();
        scripts.insert(
            PROP,
            Recorder {
                log: log.clone(),
                accumulate: false,
            },
        );

        let report = world.tick(&mut ecs, &[a, a], &mut scripts, &SerialScheduler);
        assert_eq!(report.entities, 1);
        assert!(report.dynamic_pairs.is_empty());
        assert!(log.borrow().is_empty());

        let report = world.tick(&mut ecs, &[a, b, a, b], &mut scripts, &SerialScheduler);
        assert_eq!(report.entities, 2);
        assert_eq!(report.dynamic_pairs, vec![(a, b)]);
        assert_eq!(*log.borrow(), vec![(a, b), (b, a)]);
    }

    fn random_scene(seed: u64, count: usize) -> hecs::World {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut ecs = hecs::World::new();
        for _ in 0..count {
            let pos = Position::new(
                rng.gen_range(0.0..1500.0),
                rng.gen_range(0.0..1500.0),
                MAP,
                PROP,
            );
            let shape = match rng.gen_range(0..4) {
                0 => CollisionShape::rect(rng.gen_range(5.0..60.0), rng.gen_range(5.0..60.0)),
                1 => CollisionShape::circle(rng.gen_range(3.0..30.0)),
                2 => CollisionShape::capsule(rng.gen_range(3.0..15.0), rng.gen_range(30.0..60.0)),
                _ => CollisionShape::triangle(
                    Vec2::new(rng.gen_range(10.0..40.0), 0.0),
                    Vec2::new(rng.gen_range(0.0..40.0), rng.gen_range(10.0..40.0)),
                ),
            };
            let pos = if rng.gen_bool(0.25) {
                pos.with_rotation(crate::math::Angle::Deg(rng.gen_range(0.0..360.0)))
            } else {
                pos
            };
            ecs.spawn((pos, shape.with_centered_anchor()));
        }
        ecs
    }

    fn sorted_pairs(report: &TickReport) -> Vec<(u32, u32)> {
        let mut pairs: Vec<(u32, u32)> = report
            .dynamic_pairs
            .iter()
            .map(|(a, b)| (a.id().min(b.id()), a.id().max(b.id())))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_broad_phase_finds_the_same_pairs() {
        use crate::scheduler::RayonScheduler;

        let mut scripts = ScriptRegistry::new();

        let mut serial_ecs = random_scene(7, 1000);
        let mut serial_world = CollisionWorld::new(CollisionConfig {
            serial_threshold: usize::MAX,
            ..Default::default()
        })
        .unwrap();
        serial_world.set_world_bounds(Rect::new(0.0, 0.0, 1500.0, 1500.0));
        let eligible = collidable_entities(&serial_ecs);
        let serial = serial_world.tick(&mut serial_ecs, &eligible, &mut scripts, &SerialScheduler);

        let mut parallel_ecs = random_scene(7, 1000);
        let mut parallel_world = CollisionWorld::new(CollisionConfig {
            serial_threshold: 100,
            ..Default::default()
        })
        .unwrap();
        parallel_world.set_world_bounds(Rect::new(0.0, 0.0, 1500.0, 1500.0));
        let scheduler = RayonScheduler::new(4).unwrap();
        let eligible = collidable_entities(&parallel_ecs);
        let parallel = parallel_world.tick(&mut parallel_ecs, &eligible, &mut scripts, &scheduler);

        assert!(!serial.parallel);
        assert!(parallel.parallel);
        assert_eq!(serial.entities, 1000);
        assert!(!serial.dynamic_pairs.is_empty());
        assert_eq!(sorted_pairs(&serial), sorted_pairs(&parallel));

        let static_keys = |report: &TickReport| {
            let mut keys: Vec<(u32, StaticId)> =
                report.static_pairs.iter().map(|(e, id, _)| (e.id(), *id)).collect();
            keys.sort_unstable();
            keys
        };
        assert!(!serial.static_pairs.is_empty());
        assert_eq!(static_keys(&serial), static_keys(&parallel));
    }
}
