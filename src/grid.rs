use std::fmt;
use std::str::FromStr;

use image::{imageops, ImageBuffer};
use serde::Deserialize;

use crate::error::{CanvasError, Result};
use crate::raster::{self, ElevationMap, Filter};

/// Default seam half-width in pixels.
pub const DEFAULT_BLEND_PX: u32 = 4;

/// How uniform tiles are arranged into columns and rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Most-square grid.
    #[default]
    #[serde(alias = "grid")]
    Auto,
    Horizontal,
    Vertical,
}

impl FromStr for Layout {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" | "grid" => Ok(Layout::Auto),
            "horizontal" => Ok(Layout::Horizontal),
            "vertical" => Ok(Layout::Vertical),
            other => Err(format!(
                "unknown layout '{}' (expected auto, grid, horizontal or vertical)",
                other
            )),
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layout::Auto => "auto",
            Layout::Horizontal => "horizontal",
            Layout::Vertical => "vertical",
        };
        f.write_str(name)
    }
}

/// Resolved column/row count for a tile set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub cols: u32,
    pub rows: u32,
}

impl GridShape {
    /// Columns and rows for `n` tiles.
    ///
    /// `Auto` scans columns ascending from 1 and keeps the first layout with
    /// the smallest |cols - rows|.
    pub fn solve(n: usize, layout: Layout) -> Result<Self> {
        if n == 0 {
            return Err(CanvasError::EmptyTileList);
        }
        let n = n as u32;
        let shape = match layout {
            Layout::Horizontal => Self { cols: n, rows: 1 },
            Layout::Vertical => Self { cols: 1, rows: n },
            Layout::Auto => {
                let mut best = Self { cols: n, rows: 1 };
                let mut best_diff = n - 1;
                for cols in 1..=n {
                    let rows = n.div_ceil(cols);
                    let diff = cols.abs_diff(rows);
                    if diff < best_diff {
                        best = Self { cols, rows };
                        best_diff = diff;
                    }
                }
                best
            }
        };
        Ok(shape)
    }

    pub fn cells(&self) -> usize {
        self.cols as usize * self.rows as usize
    }
}

/// Resample every tile to the largest width and height in the set.
pub fn harmonize(tiles: Vec<ElevationMap>, filter: Filter) -> Result<Vec<ElevationMap>> {
    let target_w = tiles.iter().map(|t| t.width()).max().unwrap_or(0);
    let target_h = tiles.iter().map(|t| t.height()).max().unwrap_or(0);
    if tiles.iter().all(|t| t.dimensions() == (target_w, target_h)) {
        return Ok(tiles);
    }

    tracing::warn!(
        "Tiles have different sizes, resampling to match the largest ({}x{})",
        target_w,
        target_h
    );
    tiles
        .into_iter()
        .map(|t| {
            if t.dimensions() == (target_w, target_h) {
                Ok(t)
            } else {
                raster::resample_elevation(&t, target_w, target_h, filter).map(|c| c.into_owned())
            }
        })
        .collect()
}

/// Place uniform tiles row-major into a `cols * tile_w` x `rows * tile_h`
/// canvas. Cells past the last tile stay zero.
pub fn stitch(tiles: &[ElevationMap], shape: GridShape) -> Result<ElevationMap> {
    let first = tiles.first().ok_or(CanvasError::EmptyTileList)?;
    let (tile_w, tile_h) = first.dimensions();
    let mut canvas: ElevationMap = ImageBuffer::new(shape.cols * tile_w, shape.rows * tile_h);

    for (idx, tile) in tiles.iter().take(shape.cells()).enumerate() {
        let col = idx as u32 % shape.cols;
        let row = idx as u32 / shape.cols;
        let (x0, y0) = (col * tile_w, row * tile_h);
        imageops::replace(&mut canvas, tile, x0 as i64, y0 as i64);
        tracing::debug!(
            "Placed tile {} at grid [{}, {}] pixel [{}:{}, {}:{}]",
            idx + 1,
            col,
            row,
            x0,
            x0 + tile_w,
            y0,
            y0 + tile_h
        );
    }
    Ok(canvas)
}

/// Cross-fade a `blend_px` band on each side of every internal seam.
///
/// Both passes read from the unblended canvas, so where a vertical and a
/// horizontal band cross, the horizontal pass wins.
pub fn blend_seams(
    canvas: &ElevationMap,
    tile_w: u32,
    tile_h: u32,
    shape: GridShape,
    blend_px: u32,
) -> ElevationMap {
    let mut out = canvas.clone();
    let (w, h) = canvas.dimensions();

    for col in 1..shape.cols {
        let x = col * tile_w;
        if x >= w {
            continue;
        }
        let left = x.saturating_sub(blend_px);
        let right = (x + blend_px).min(w - 1);
        let span = (right - left).max(1) as f32;
        for px in left..=right {
            let alpha = (px - left) as f32 / span;
            for y in 0..h {
                let a = canvas.get_pixel(left, y)[0];
                let b = canvas.get_pixel(right, y)[0];
                out.get_pixel_mut(px, y)[0] = (1.0 - alpha) * a + alpha * b;
            }
        }
    }

    for row in 1..shape.rows {
        let y = row * tile_h;
        if y >= h {
            continue;
        }
        let top = y.saturating_sub(blend_px);
        let bottom = (y + blend_px).min(h - 1);
        let span = (bottom - top).max(1) as f32;
        for py in top..=bottom {
            let alpha = (py - top) as f32 / span;
            for x in 0..w {
                let a = canvas.get_pixel(x, top)[0];
                let b = canvas.get_pixel(x, bottom)[0];
                out.get_pixel_mut(x, py)[0] = (1.0 - alpha) * a + alpha * b;
            }
        }
    }

    out
}
