use std::borrow::Cow;
use std::fmt;

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, RgbImage};
use serde::Deserialize;

use crate::error::{CanvasError, Result};

/// Elevation samples in real-world linear units (meters).
pub type ElevationMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Per-pixel opacity weights in [0,1].
pub type MaskMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// 8-bit RGB imagery.
pub type ColorMap = RgbImage;

/// Resampling filter, selectable per call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    Nearest,
    Bilinear,
    Lanczos,
}

impl Filter {
    fn filter_type(self) -> FilterType {
        match self {
            Filter::Nearest => FilterType::Nearest,
            Filter::Bilinear => FilterType::Triangle,
            Filter::Lanczos => FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Filter::Nearest => "nearest",
            Filter::Bilinear => "bilinear",
            Filter::Lanczos => "lanczos",
        };
        f.write_str(name)
    }
}

/// Filter choice for each buffer kind of a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filters {
    pub elevation: Filter,
    pub mask: Filter,
    pub color: Filter,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            elevation: Filter::Lanczos,
            mask: Filter::Bilinear,
            color: Filter::Lanczos,
        }
    }
}

/// Round a pixel coordinate half-to-even.
pub fn round_px(v: f64) -> i64 {
    v.round_ties_even() as i64
}

fn check_sizes(src: (u32, u32), width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(CanvasError::DegenerateTarget { width, height });
    }
    if src.0 == 0 || src.1 == 0 {
        return Err(CanvasError::EmptySource {
            width: src.0,
            height: src.1,
        });
    }
    Ok(())
}

/// Resample elevation to `width` x `height`.
///
/// `image` clamps float samples to [0,1] while filtering, so the buffer is
/// normalized to its own value range first and mapped back afterwards. Filter
/// overshoot therefore never leaves the source range.
pub fn resample_elevation(
    src: &ElevationMap,
    width: u32,
    height: u32,
    filter: Filter,
) -> Result<Cow<'_, ElevationMap>> {
    check_sizes(src.dimensions(), width, height)?;
    if src.dimensions() == (width, height) {
        return Ok(Cow::Borrowed(src));
    }

    let (lo, hi) = value_range(src);
    if !(hi > lo) {
        return Ok(Cow::Owned(ImageBuffer::from_pixel(width, height, Luma([lo]))));
    }
    let span = hi - lo;

    let unit: ElevationMap = ImageBuffer::from_fn(src.width(), src.height(), |x, y| {
        Luma([(src.get_pixel(x, y)[0] - lo) / span])
    });
    let mut out = imageops::resize(&unit, width, height, filter.filter_type());
    for p in out.pixels_mut() {
        p[0] = lo + p[0] * span;
    }
    Ok(Cow::Owned(out))
}

/// Resample a mask to `width` x `height`, clamping the result into [0,1].
pub fn resample_mask(
    src: &MaskMap,
    width: u32,
    height: u32,
    filter: Filter,
) -> Result<Cow<'_, MaskMap>> {
    check_sizes(src.dimensions(), width, height)?;
    if src.dimensions() == (width, height) {
        return Ok(Cow::Borrowed(src));
    }

    let mut out = imageops::resize(src, width, height, filter.filter_type());
    for p in out.pixels_mut() {
        p[0] = p[0].clamp(0.0, 1.0);
    }
    Ok(Cow::Owned(out))
}

/// Resample RGB imagery to `width` x `height`.
pub fn resample_color(
    src: &ColorMap,
    width: u32,
    height: u32,
    filter: Filter,
) -> Result<Cow<'_, ColorMap>> {
    check_sizes(src.dimensions(), width, height)?;
    if src.dimensions() == (width, height) {
        return Ok(Cow::Borrowed(src));
    }
    Ok(Cow::Owned(imageops::resize(
        src,
        width,
        height,
        filter.filter_type(),
    )))
}

/// Finite (min, max) of a scalar buffer, or (0, 0) if it has no finite sample.
pub fn value_range(buf: &ImageBuffer<Luma<f32>, Vec<f32>>) -> (f32, f32) {
    let (lo, hi) = buf
        .as_raw()
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if lo > hi {
        (0.0, 0.0)
    } else {
        (lo, hi)
    }
}
