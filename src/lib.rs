//! Terrain canvas compositing.
//!
//! Turns a set of placed, masked, variable-resolution elevation/imagery
//! patches (or a set of uniform grid tiles) into one output raster.

pub mod canvas;
pub mod compositor;
pub mod config;
pub mod error;
pub mod export;
pub mod grid;
pub mod patch;
pub mod project;
pub mod raster;

pub use compositor::{Composite, Composition};
pub use error::{CanvasError, Result, SkippedPatch};
