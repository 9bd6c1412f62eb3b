use image::{ImageBuffer, Luma, Rgb, Rgb32FImage};

use crate::error::{CanvasError, Result};
use crate::patch::Patch;
use crate::raster::{self, round_px, ColorMap, ElevationMap, Filters, MaskMap};

/// Smallest accepted `max_resolution`.
pub const MIN_RESOLUTION: u32 = 64;

/// Stand-in denominator where neither the canvas nor the patch has alpha.
const ALPHA_EPSILON: f32 = 1e-6;

/// Axis-aligned canvas-space rectangle covering every placed patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min_x: i64,
    pub min_y: i64,
    pub max_x: i64,
    pub max_y: i64,
}

impl Bounds {
    /// Minimal rectangle over all patch origins and origin + effective extent.
    pub fn resolve(patches: &[Patch]) -> Result<Self> {
        let mut iter = patches.iter().map(|p| {
            let (x, y) = p.origin();
            let (w, h) = p.effective_size();
            (x, y, x + w as i64, y + h as i64)
        });
        let first = iter.next().ok_or(CanvasError::NoPatches)?;
        let (min_x, min_y, max_x, max_y) = iter.fold(first, |acc, r| {
            (acc.0.min(r.0), acc.1.min(r.1), acc.2.max(r.2), acc.3.max(r.3))
        });
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    pub fn width(&self) -> u64 {
        (self.max_x - self.min_x) as u64
    }

    pub fn height(&self) -> u64 {
        (self.max_y - self.min_y) as u64
    }
}

/// Pixel rectangle in output space. May extend past the output edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

/// Uniform canvas-to-output scale and the resulting output size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputGrid {
    pub scale: f64,
    pub width: u32,
    pub height: u32,
}

impl OutputGrid {
    /// Fit `width` x `height` canvas pixels under `max_resolution` on the long
    /// side. Never upscales.
    pub fn govern(width: u64, height: u64, max_resolution: u32) -> Self {
        let budget = max_resolution.max(MIN_RESOLUTION) as f64;
        let long_side = width.max(height);
        let scale = if long_side == 0 {
            1.0
        } else {
            (budget / long_side as f64).min(1.0)
        };
        let side = |d: u64| round_px(d as f64 * scale).max(1) as u32;
        Self {
            scale,
            width: side(width),
            height: side(height),
        }
    }

    /// Target rectangle of a patch in output pixels, relative to `bounds` min.
    pub fn project(&self, bounds: &Bounds, patch: &Patch) -> Rect {
        let (cx, cy) = patch.origin();
        let (ew, eh) = patch.effective_size();
        Rect {
            x: round_px((cx - bounds.min_x) as f64 * self.scale),
            y: round_px((cy - bounds.min_y) as f64 * self.scale),
            width: round_px(ew as f64 * self.scale).max(1) as u32,
            height: round_px(eh as f64 * self.scale).max(1) as u32,
        }
    }
}

/// Summary of a finished placement composite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasStats {
    pub width: u32,
    pub height: u32,
    pub elevation_min: f32,
    pub elevation_max: f32,
    pub patches_composited: usize,
}

/// Final rasters of a placement composite.
#[derive(Debug, Clone)]
pub struct CanvasOutput {
    pub bounds: Bounds,
    pub grid: OutputGrid,
    pub elevation: ElevationMap,
    pub color: ColorMap,
    pub alpha: MaskMap,
    pub stats: CanvasStats,
}

/// Output-resolution accumulators owned by one compositing run.
pub struct Canvas {
    bounds: Bounds,
    grid: OutputGrid,
    filters: Filters,
    elevation: ElevationMap,
    color: Rgb32FImage,
    alpha: MaskMap,
    composited: usize,
}

impl Canvas {
    /// Zeroed accumulators sized for `patches` under `max_resolution`.
    pub fn for_patches(patches: &[Patch], max_resolution: u32, filters: Filters) -> Result<Self> {
        let bounds = Bounds::resolve(patches)?;
        let grid = OutputGrid::govern(bounds.width(), bounds.height(), max_resolution);
        Ok(Self::new(bounds, grid, filters))
    }

    pub fn new(bounds: Bounds, grid: OutputGrid, filters: Filters) -> Self {
        Self {
            bounds,
            grid,
            filters,
            elevation: ImageBuffer::new(grid.width, grid.height),
            color: ImageBuffer::new(grid.width, grid.height),
            alpha: ImageBuffer::new(grid.width, grid.height),
            composited: 0,
        }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn grid(&self) -> OutputGrid {
        self.grid
    }

    pub fn alpha(&self) -> &MaskMap {
        &self.alpha
    }

    /// Blend one patch into the accumulators.
    ///
    /// Values are a weighted average of the canvas and the patch, weighted by
    /// accumulated alpha and the patch mask. The denominator is the unclamped
    /// alpha sum while the stored alpha is clamped to [0,1]. Returns `false`
    /// when the patch lands entirely off the output.
    pub fn apply(&mut self, patch: &Patch) -> Result<bool> {
        let rect = self.grid.project(&self.bounds, patch);

        let px0 = rect.x.max(0);
        let py0 = rect.y.max(0);
        let px1 = (rect.x + rect.width as i64).min(self.grid.width as i64);
        let py1 = (rect.y + rect.height as i64).min(self.grid.height as i64);
        if px1 <= px0 || py1 <= py0 {
            tracing::debug!("Patch '{}' falls outside the output, skipped", patch.name());
            return Ok(false);
        }

        let elevation =
            raster::resample_elevation(patch.elevation(), rect.width, rect.height, self.filters.elevation)?;
        let mask = raster::resample_mask(patch.mask(), rect.width, rect.height, self.filters.mask)?;
        let color = patch
            .color()
            .map(|c| raster::resample_color(c, rect.width, rect.height, self.filters.color))
            .transpose()?;

        tracing::debug!(
            "Patch '{}' -> output [{}:{}, {}:{}] from {}x{} px",
            patch.name(),
            px0,
            px1,
            py0,
            py1,
            rect.width,
            rect.height
        );

        for py in py0..py1 {
            for px in px0..px1 {
                let (ox, oy) = (px as u32, py as u32);
                let (sx, sy) = ((px - rect.x) as u32, (py - rect.y) as u32);

                let new_alpha = mask.get_pixel(sx, sy)[0];
                let old_alpha = self.alpha.get_pixel(ox, oy)[0];
                let mut denom = old_alpha + new_alpha;
                if denom == 0.0 {
                    denom = ALPHA_EPSILON;
                }

                let new_value = elevation.get_pixel(sx, sy)[0];
                let acc = self.elevation.get_pixel_mut(ox, oy);
                acc[0] = (new_value * new_alpha + acc[0] * old_alpha) / denom;

                if let Some(ref color) = color {
                    let src = color.get_pixel(sx, sy);
                    let acc = self.color.get_pixel_mut(ox, oy);
                    for c in 0..3 {
                        acc[c] = (src[c] as f32 * new_alpha + acc[c] * old_alpha) / denom;
                    }
                }

                self.alpha.put_pixel(ox, oy, Luma([(old_alpha + new_alpha).clamp(0.0, 1.0)]));
            }
        }

        self.composited += 1;
        Ok(true)
    }

    /// Convert the accumulators into output rasters.
    pub fn finish(self) -> CanvasOutput {
        let color: ColorMap = ImageBuffer::from_fn(self.grid.width, self.grid.height, |x, y| {
            let p = self.color.get_pixel(x, y);
            Rgb(p.0.map(|v| v.clamp(0.0, 255.0) as u8))
        });
        let (elevation_min, elevation_max) = raster::value_range(&self.elevation);
        CanvasOutput {
            bounds: self.bounds,
            grid: self.grid,
            stats: CanvasStats {
                width: self.grid.width,
                height: self.grid.height,
                elevation_min,
                elevation_max,
                patches_composited: self.composited,
            },
            elevation: self.elevation,
            color,
            alpha: self.alpha,
        }
    }
}
