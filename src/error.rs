//! Errors from setting up a collision world and loading static geometry.
//!
//! The per-tick pipeline never fails; these only come from configuration
//! and the loaders that feed it.

/// Error when configuring the engine or loading static geometry.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[cfg(feature = "parallel")]
    #[error("Failed to build the worker thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("A tile map was loaded before a tile set was set")]
    NoTileSet,
    #[error("Map has {count} layers, layer {layer} does not exist")]
    LayerOutOfRange { layer: usize, count: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
