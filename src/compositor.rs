use crate::canvas::{Canvas, CanvasOutput};
use crate::error::{CanvasError, Result, SkippedPatch};
use crate::grid::{self, GridShape, Layout, DEFAULT_BLEND_PX};
use crate::patch::{Patch, Placement};
use crate::raster::{self, ElevationMap, Filter, Filters};

/// Default `max_resolution` for placement composites.
pub const DEFAULT_MAX_RESOLUTION: u32 = 8192;

/// Loaded patches in input order, plus those dropped on the way.
#[derive(Debug, Default)]
pub struct PatchSet {
    pub patches: Vec<Patch>,
    pub skipped: Vec<SkippedPatch>,
}

impl PatchSet {
    /// Record a patch that could not be loaded.
    pub fn skip(&mut self, skipped: SkippedPatch) {
        tracing::warn!("Skipping patch {}", skipped);
        self.skipped.push(skipped);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlacementSettings {
    pub max_resolution: u32,
    pub filters: Filters,
}

impl Default for PlacementSettings {
    fn default() -> Self {
        Self {
            max_resolution: DEFAULT_MAX_RESOLUTION,
            filters: Filters::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GridSettings {
    pub layout: Layout,
    pub blend_px: u32,
    /// Used only when tiles of different sizes need harmonizing.
    pub resample_filter: Filter,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            layout: Layout::Auto,
            blend_px: DEFAULT_BLEND_PX,
            resample_filter: Filter::Bilinear,
        }
    }
}

/// A compositing run: an ordered patch/tile sequence plus the mode that
/// turns it into one raster.
#[derive(Debug)]
pub enum Composition {
    /// Masked, scaled patches at arbitrary canvas offsets.
    Placement {
        set: PatchSet,
        settings: PlacementSettings,
    },
    /// Uniform tiles on a regular grid with seam cross-fading.
    Grid {
        tiles: Vec<ElevationMap>,
        settings: GridSettings,
    },
}

/// Per-patch record of what went into a placement composite.
#[derive(Debug, Clone)]
pub struct PatchRecord {
    pub instance_id: String,
    pub name: String,
    pub placement: Placement,
}

impl From<&Patch> for PatchRecord {
    fn from(p: &Patch) -> Self {
        Self {
            instance_id: p.instance_id().to_string(),
            name: p.name().to_string(),
            placement: p.placement(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlacementOutput {
    pub canvas: CanvasOutput,
    pub max_resolution: u32,
    pub patches: Vec<PatchRecord>,
    pub skipped: Vec<SkippedPatch>,
}

#[derive(Debug, Clone)]
pub struct GridOutput {
    pub elevation: ElevationMap,
    pub shape: GridShape,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_count: usize,
    pub blend_px: u32,
    pub elevation_min: f32,
    pub elevation_max: f32,
}

impl GridOutput {
    pub fn width(&self) -> u32 {
        self.elevation.width()
    }

    pub fn height(&self) -> u32 {
        self.elevation.height()
    }
}

/// Result of a [`Composition`].
#[derive(Debug, Clone)]
pub enum Composite {
    Placement(PlacementOutput),
    Grid(GridOutput),
}

impl Composition {
    pub fn placement(set: PatchSet, settings: PlacementSettings) -> Self {
        Composition::Placement { set, settings }
    }

    pub fn grid(tiles: Vec<ElevationMap>, settings: GridSettings) -> Self {
        Composition::Grid { tiles, settings }
    }

    pub fn compose(self) -> Result<Composite> {
        match self {
            Composition::Placement { set, settings } => {
                compose_placement(set, settings).map(Composite::Placement)
            }
            Composition::Grid { tiles, settings } => {
                compose_grid(tiles, settings).map(Composite::Grid)
            }
        }
    }
}

/// Blend every patch in input order onto one output canvas.
pub fn compose_placement(set: PatchSet, settings: PlacementSettings) -> Result<PlacementOutput> {
    let PatchSet { patches, skipped } = set;
    if patches.is_empty() {
        return Err(if skipped.is_empty() {
            CanvasError::NoPatches
        } else {
            CanvasError::NoSurvivors {
                skipped: skipped.len(),
            }
        });
    }

    tracing::info!(
        "Compositing {} patch{}",
        patches.len(),
        if patches.len() == 1 { "" } else { "es" }
    );

    let mut canvas = Canvas::for_patches(&patches, settings.max_resolution, settings.filters)?;
    let bounds = canvas.bounds();
    let out = canvas.grid();
    tracing::info!("Canvas extent: {}x{} canvas-px", bounds.width(), bounds.height());
    if out.scale < 1.0 {
        tracing::info!(
            "Downsampling to {}x{} px (max-resolution={})",
            out.width,
            out.height,
            settings.max_resolution
        );
    } else {
        tracing::info!("Output size: {}x{} px", out.width, out.height);
    }

    for patch in &patches {
        canvas.apply(patch)?;
    }

    let canvas = canvas.finish();
    tracing::info!(
        "Elevation range: {:.1}m - {:.1}m",
        canvas.stats.elevation_min,
        canvas.stats.elevation_max
    );

    Ok(PlacementOutput {
        canvas,
        max_resolution: settings.max_resolution,
        patches: patches.iter().map(PatchRecord::from).collect(),
        skipped,
    })
}

/// Stitch uniform tiles row-major and smooth the internal seams.
pub fn compose_grid(tiles: Vec<ElevationMap>, settings: GridSettings) -> Result<GridOutput> {
    if tiles.is_empty() {
        return Err(CanvasError::EmptyTileList);
    }
    let tiles = grid::harmonize(tiles, settings.resample_filter)?;
    let (tile_width, tile_height) = tiles[0].dimensions();
    let shape = GridShape::solve(tiles.len(), settings.layout)?;
    tracing::info!("Layout: {} column(s) x {} row(s)", shape.cols, shape.rows);

    let stitched = grid::stitch(&tiles, shape)?;
    tracing::info!("Canvas size: {}x{} px", stitched.width(), stitched.height());

    let elevation = grid::blend_seams(&stitched, tile_width, tile_height, shape, settings.blend_px);
    tracing::info!("Seam blending applied ({}px fade)", settings.blend_px);

    let (elevation_min, elevation_max) = raster::value_range(&elevation);
    Ok(GridOutput {
        elevation,
        shape,
        tile_width,
        tile_height,
        tile_count: tiles.len(),
        blend_px: settings.blend_px,
        elevation_min,
        elevation_max,
    })
}
