//! Grid-accelerated 2D collision detection and resolution.
//!
//! A [`CollisionWorld`][collision::CollisionWorld] owns all collision state of one simulation:
//! per-map entity grids rebuilt every tick, static world geometry,
//! and the scratch buffers of the parallel broad phase.
//! Entities live in a [`hecs::World`] owned by the caller and take part
//! in collision by having both a [`Position`] and a [`CollisionShape`].

/// Open a profiling span that closes when the returned value is dropped.
/// Does nothing unless the `tracy` feature is enabled and a client is running.
macro_rules! tracy_span {
    ($name:expr, $fn_name:expr) => {
        tracy_client::Client::running()
            .map(|client| client.span_alloc(Some($name), $fn_name, file!(), line!(), 0))
    };
}

pub mod config;
pub use config::CollisionConfig;

pub mod error;
pub use error::{Error, Result};

pub mod math;
pub use math::{uv, Angle, Unit, Vec2};

pub mod scheduler;
#[cfg(feature = "parallel")]
pub use scheduler::RayonScheduler;
pub use scheduler::{JobScheduler, SerialScheduler};

pub mod collision;
pub use collision::{
    script::{CollisionScript, ScriptRegistry, StaticHit},
    shape::{
        CollisionShape, ContactDirs, Contacts, EntityKind, LayerMask, MapId, Position, Rect, Shape,
        ShapeKind,
    },
    shape_shape::CollisionInfo,
    static_world::{StaticWorld, TileInfo, TileMap, TileObject, TileSet},
    storage::{ColliderClass, StaticId},
    collidable_entities, CollisionWorld, TickReport,
};

// Re-exported to guarantee versions match
pub use hecs;
