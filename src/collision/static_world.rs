//! Static geometry: world bounds, tile map objects, solid tiles and manual collider groups.
//!
//! All of these work together and can be used in any combination.
//! Geometry arrives already decoded from whatever loaded the map files.

use rustc_hash::{FxHashMap, FxHashSet};

use super::{
    hash_grid::HashGrid,
    shape::{MapId, Rect},
    storage::{ColliderClass, ColliderStorage, StaticId},
};
use crate::{
    config::CollisionConfig,
    error::{Error, Result},
};

/// Values per grid block. A block of 7 ids plus its header fills one cache line.
pub const STATIC_BLOCK: usize = 7;
/// Object layers that can be loaded per map.
pub const MAX_OBJECT_LAYERS: usize = 2;
pub type StaticGrid = HashGrid<StaticId, STATIC_BLOCK>;

/// An object placed in a tile map editor.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub struct TileObject {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Class set in the editor, forwarded to collision handlers.
    pub class: u32,
    pub visible: bool,
}

/// One tile of a tile set.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub struct TileInfo {
    pub tile_id: u32,
    pub class: u32,
    /// Collision area within the tile in tile set pixels. Defaults to the whole tile.
    pub collision: Option<Rect>,
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub struct TileSet {
    /// Side length of a tile in tile set pixels.
    pub tile_size: f32,
    pub tiles: Vec<TileInfo>,
}

/// Tile layers of a map, row-major.
/// Tile numbers are one more than the tile id, zero means no tile.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub struct TileMap {
    pub width: u32,
    pub height: u32,
    pub layers: Vec<Vec<u32>>,
}

/// Collision area and class of a solid tile, in world units.
#[derive(Clone, Copy, Debug)]
struct SolidTile {
    area: Rect,
    class: u32,
}

/// Solid tiles of the global tile set by tile id.
#[derive(Debug)]
struct SolidTiles {
    tile_size: f32,
    collision: FxHashMap<u32, SolidTile>,
}

/// Tile layers kept around for point lookups.
#[derive(Debug, Default)]
struct LoadedTiles {
    width: u32,
    height: u32,
    layers: Vec<Vec<u32>>,
}

/// Static colliders of one map.
#[derive(Debug, Default)]
struct MapColliders {
    objects: Option<StaticGrid>,
    object_layers: [bool; MAX_OBJECT_LAYERS],
    object_nums: Vec<u32>,
    tiles: Option<StaticGrid>,
    tile_nums: Vec<u32>,
    loaded_tiles: Option<LoadedTiles>,
    manual: Option<StaticGrid>,
}

#[derive(Debug)]
pub struct StaticWorld {
    cell_size: f32,
    slab_depth: f32,
    pub(crate) storage: ColliderStorage,
    slabs: Option<[Rect; 4]>,
    maps: FxHashMap<MapId, MapColliders>,
    solid_tiles: Option<SolidTiles>,
    // group -> map -> object numbers
    groups: FxHashMap<u32, FxHashMap<MapId, Vec<u32>>>,
}

impl StaticWorld {
    pub fn new(config: &CollisionConfig) -> Self {
        StaticWorld {
            cell_size: config.cell_size,
            slab_depth: config.world_bound_depth,
            storage: ColliderStorage::new(config.collider_soft_limit),
            slabs: None,
            maps: FxHashMap::default(),
            solid_tiles: None,
            groups: FxHashMap::default(),
        }
    }

    //
    // WORLD BOUNDS
    //

    /// Make everything outside the given rectangle solid.
    /// A width or height of zero disables world bounds.
    pub fn set_world_bounds(&mut self, bounds: Rect) {
        if bounds.is_empty() {
            self.slabs = None;
            return;
        }
        let d = self.slab_depth;
        let Rect {
            x,
            y,
            width: w,
            height: h,
        } = bounds;
        self.slabs = Some([
            // left, top, right, bottom
            Rect::new(x - d, y - d, d, h + 2.0 * d),
            Rect::new(x, y - d, w, d),
            Rect::new(x + w, y - d, d, h + 2.0 * d),
            Rect::new(x, y + h, w, d),
        ]);
    }

    /// The four slabs around the world bounds, if set.
    #[inline]
    pub fn world_slabs(&self) -> Option<&[Rect; 4]> {
        self.slabs.as_ref()
    }

    //
    // TILE MAP OBJECTS
    //

    /// Load one object layer of a map as colliders, multiplying geometry by `scale`.
    /// Invisible objects are skipped.
    ///
    /// Each map has up to [`MAX_OBJECT_LAYERS`] object layers.
    /// Only the first call for each layer of a map does anything,
    /// so this can be called every time something enters the map.
    pub fn load_map_objects(
        &mut self,
        map: MapId,
        layer: usize,
        objects: &[TileObject],
        scale: f32,
    ) -> Result<()> {
        if layer >= MAX_OBJECT_LAYERS {
            log::warn!("object layer {layer} of map {map:?} exceeds the object layer limit");
            return Err(Error::LayerOutOfRange {
                layer,
                count: MAX_OBJECT_LAYERS,
            });
        }
        let map_colls = self.maps.entry(map).or_default();
        if map_colls.object_layers[layer] {
            log::debug!("object layer {layer} of map {map:?} already loaded");
            return Ok(());
        }
        map_colls.object_layers[layer] = true;
        let cell_size = self.cell_size;
        let grid = map_colls
            .objects
            .get_or_insert_with(|| StaticGrid::new(cell_size));
        for obj in objects.iter().filter(|o| o.visible) {
            let bounds = Rect::new(obj.x, obj.y, obj.width, obj.height).scaled(scale);
            if bounds.is_empty() {
                continue;
            }
            let num = self.storage.insert(bounds);
            grid.insert(StaticId::new(num, obj.class), &bounds);
            map_colls.object_nums.push(num);
        }
        Ok(())
    }

    //
    // TILE SET
    //

    /// Set the tile set used by [`load_tile_map`][Self::load_tile_map].
    /// Tiles whose class is one of `solid_classes` become colliders.
    /// `scale` converts tile set pixels to world units.
    ///
    /// Maps loaded before this call keep the colliders they were loaded with.
    pub fn set_tile_set(&mut self, tile_set: &TileSet, solid_classes: &[u32], scale: f32) {
        let tile_size = tile_set.tile_size * scale;
        let collision = tile_set
            .tiles
            .iter()
            .filter(|t| solid_classes.contains(&t.class))
            .map(|t| {
                let area = t
                    .collision
                    .map_or(Rect::new(0.0, 0.0, tile_size, tile_size), |r| r.scaled(scale));
                (
                    t.tile_id,
                    SolidTile {
                        area,
                        class: t.class,
                    },
                )
            })
            .collect();
        self.solid_tiles = Some(SolidTiles {
            tile_size,
            collision,
        });
    }

    /// Turn the solid tiles of the given layers into colliders.
    ///
    /// Only the first call for each map does anything.
    pub fn load_tile_map(&mut self, map: MapId, tile_map: &TileMap, layers: &[usize]) -> Result<()> {
        let Some(solid) = self.solid_tiles.as_ref() else {
            log::warn!("tile map for {map:?} loaded before any tile set");
            return Err(Error::NoTileSet);
        };
        if let Some(&layer) = layers.iter().find(|&&l| l >= tile_map.layers.len()) {
            return Err(Error::LayerOutOfRange {
                layer,
                count: tile_map.layers.len(),
            });
        }
        let map_colls = self.maps.entry(map).or_default();
        if map_colls.tiles.is_some() {
            log::debug!("tiles of map {map:?} already loaded");
            return Ok(());
        }

        let mut grid = StaticGrid::new(self.cell_size);
        let mut loaded = LoadedTiles {
            width: tile_map.width,
            height: tile_map.height,
            layers: Vec::with_capacity(layers.len()),
        };
        for &layer in layers {
            let data = &tile_map.layers[layer];
            for (idx, &tile_num) in data.iter().enumerate() {
                let Some(tile_id) = tile_num.checked_sub(1) else {
                    continue;
                };
                let Some(&SolidTile { area, class }) = solid.collision.get(&tile_id) else {
                    continue;
                };
                let tx = (idx as u32 % tile_map.width.max(1)) as f32;
                let ty = (idx as u32 / tile_map.width.max(1)) as f32;
                let bounds = Rect::new(
                    tx * solid.tile_size + area.x,
                    ty * solid.tile_size + area.y,
                    area.width,
                    area.height,
                );
                let num = self.storage.insert(bounds);
                grid.insert(StaticId::new(num, class), &bounds);
                map_colls.tile_nums.push(num);
            }
            loaded.layers.push(data.clone());
        }
        map_colls.tiles = Some(grid);
        map_colls.loaded_tiles = Some(loaded);
        Ok(())
    }

    /// True only if the map's tiles were loaded and the tile at `(tile_x, tile_y)`
    /// in any loaded layer is solid in the tile set.
    pub fn is_solid_tile(&self, map: MapId, tile_x: u32, tile_y: u32) -> bool {
        let (Some(solid), Some(loaded)) = (
            self.solid_tiles.as_ref(),
            self.maps.get(&map).and_then(|m| m.loaded_tiles.as_ref()),
        ) else {
            return false;
        };
        if tile_x >= loaded.width || tile_y >= loaded.height {
            return false;
        }
        let idx = (tile_y * loaded.width + tile_x) as usize;
        loaded.layers.iter().any(|layer| {
            layer
                .get(idx)
                .and_then(|&n| n.checked_sub(1))
                .is_some_and(|id| solid.collision.contains_key(&id))
        })
    }

    //
    // MANUAL GROUPS
    //

    /// Add a collider to a group. Manual colliders can only be removed a whole group at a time.
    pub fn add_manual_collider(&mut self, map: MapId, group: u32, bounds: Rect) {
        if bounds.is_empty() {
            return;
        }
        let num = self.storage.insert(bounds);
        let cell_size = self.cell_size;
        self.maps
            .entry(map)
            .or_default()
            .manual
            .get_or_insert_with(|| StaticGrid::new(cell_size))
            .insert(StaticId::new(num, group), &bounds);
        self.groups
            .entry(group)
            .or_default()
            .entry(map)
            .or_default()
            .push(num);
    }

    /// Remove every collider of a group.
    pub fn remove_collider_group(&mut self, group: u32) {
        let Some(by_map) = self.groups.remove(&group) else {
            return;
        };
        for (map, nums) in by_map {
            let Some(grid) = self.maps.get_mut(&map).and_then(|m| m.manual.as_mut()) else {
                continue;
            };
            let mut removal = grid.begin_removal();
            for num in nums {
                let bounds = self.storage.get(num);
                removal.remove(StaticId::new(num, group), &bounds);
                self.storage.remove(num);
            }
            removal.patch_holes();
        }
    }

    //
    // UNLOADING
    //

    /// Remove every static collider of a map, including its manual colliders
    /// and its loaded tile layers.
    pub fn unload_map(&mut self, map: MapId) {
        let Some(map_colls) = self.maps.remove(&map) else {
            return;
        };
        for num in map_colls.object_nums.into_iter().chain(map_colls.tile_nums) {
            self.storage.remove(num);
        }
        if map_colls.manual.is_some() {
            let mut emptied = FxHashSet::default();
            for (&group, by_map) in self.groups.iter_mut() {
                if let Some(nums) = by_map.remove(&map) {
                    for num in nums {
                        self.storage.remove(num);
                    }
                }
                if by_map.is_empty() {
                    emptied.insert(group);
                }
            }
            self.groups.retain(|group, _| !emptied.contains(group));
        }
    }

    /// Static grids of a map in the order they're tested.
    pub(crate) fn grids(&self, map: MapId) -> impl Iterator<Item = (&StaticGrid, ColliderClass)> {
        self.maps.get(&map).into_iter().flat_map(|m| {
            [
                (m.objects.as_ref(), ColliderClass::TileMapObject),
                (m.tiles.as_ref(), ColliderClass::TileSetTile),
                (m.manual.as_ref(), ColliderClass::ManualCollider),
            ]
            .into_iter()
            .filter_map(|(grid, class)| grid.map(|g| (g, class)))
        })
    }

    /// Number of stored static colliders, not counting world bounds.
    #[inline]
    pub fn collider_count(&self) -> usize {
        self.storage.len()
    }
}
