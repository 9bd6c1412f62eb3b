use std::fmt;
use std::path::PathBuf;

/// Errors raised by the compositing core and its loaders.
///
/// Only global preconditions are fatal. Problems confined to one patch are
/// reported through [`SkippedPatch`] instead.
#[derive(thiserror::Error, Debug)]
pub enum CanvasError {
    #[error("no patches placed on canvas")]
    NoPatches,

    #[error("no valid patches could be loaded ({skipped} skipped)")]
    NoSurvivors { skipped: usize },

    #[error("tile list is empty")]
    EmptyTileList,

    #[error("required input not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("patch '{name}' has zero native dimension ({width}x{height})")]
    ZeroDimension {
        name: String,
        width: u32,
        height: u32,
    },

    #[error("patch '{name}': {field} must be a positive finite number, got {value}")]
    InvalidPlacement {
        name: String,
        field: &'static str,
        value: f64,
    },

    #[error("cannot resample to degenerate size {width}x{height}")]
    DegenerateTarget { width: u32, height: u32 },

    #[error("cannot resample an empty {width}x{height} source")]
    EmptySource { width: u32, height: u32 },

    #[error("image error in {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CanvasError>;

/// A patch dropped during loading, with the reason it was dropped.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SkippedPatch {
    pub name: String,
    pub reason: String,
}

impl SkippedPatch {
    pub fn new(name: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for SkippedPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}': {}", self.name, self.reason)
    }
}
