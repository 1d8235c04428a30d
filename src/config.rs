use crate::error::{Error, Result};

/// Start-up parameters of a [`CollisionWorld`][crate::CollisionWorld].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Deserialize, serde::Serialize),
    serde(default)
)]
pub struct CollisionConfig {
    /// Side length of a hash grid cell.
    ///
    /// A likely good value is a little larger than the typical entity,
    /// so that most entities occupy between one and four cells.
    pub cell_size: f32,
    /// Up to this many eligible entities, a tick runs entirely on the calling thread
    /// because dispatching jobs would cost more than it saves.
    /// This is a performance knob, results are the same either way.
    pub serial_threshold: usize,
    /// Number of worker threads in addition to the calling thread.
    pub worker_threads: usize,
    /// Size of the calling thread's slice of broad phase work
    /// relative to a worker's slice. The caller starts working immediately,
    /// so it gets a bit more than the workers.
    pub main_thread_share: f32,
    /// Thickness of the solid slabs placed around the world bounds.
    pub world_bound_depth: f32,
    /// Number of static collider slots after which a warning is logged.
    pub collider_soft_limit: u32,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            cell_size: 64.0,
            serial_threshold: 500,
            worker_threads: 4,
            main_thread_share: 1.25,
            world_bound_depth: 250.0,
            collider_soft_limit: u16::MAX as u32,
        }
    }
}

impl CollisionConfig {
    /// Check that the values make sense.
    pub fn validate(&self) -> Result<()> {
        // written as negations so NaN fails too
        if !(self.cell_size > 0.0) {
            return Err(Error::InvalidConfig("cell_size must be positive"));
        }
        if !(self.main_thread_share > 0.0) {
            return Err(Error::InvalidConfig("main_thread_share must be positive"));
        }
        if !(self.world_bound_depth > 0.0) {
            return Err(Error::InvalidConfig("world_bound_depth must be positive"));
        }
        Ok(())
    }
}
