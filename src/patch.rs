use image::Luma;

use crate::error::{CanvasError, Result};
use crate::raster::{round_px, ColorMap, ElevationMap, MaskMap};

/// Where a patch sits on the canvas and how it is scaled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub canvas_x: i64,
    pub canvas_y: i64,
    /// Multiplies native width/height to get the canvas-space extent.
    pub scale_xy: f64,
    /// Height exaggeration, applied once at load.
    pub scale_z: f64,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            canvas_x: 0,
            canvas_y: 0,
            scale_xy: 1.0,
            scale_z: 1.0,
        }
    }
}

impl Placement {
    pub fn at(canvas_x: i64, canvas_y: i64) -> Self {
        Self {
            canvas_x,
            canvas_y,
            ..Self::default()
        }
    }

    pub fn with_scale_xy(mut self, scale_xy: f64) -> Self {
        self.scale_xy = scale_xy;
        self
    }

    pub fn with_scale_z(mut self, scale_z: f64) -> Self {
        self.scale_z = scale_z;
        self
    }
}

/// One placed raster unit: native-resolution buffers plus placement.
#[derive(Debug, Clone)]
pub struct Patch {
    name: String,
    instance_id: String,
    elevation: ElevationMap,
    color: Option<ColorMap>,
    mask: MaskMap,
    placement: Placement,
    effective_w: u32,
    effective_h: u32,
}

impl Patch {
    /// Build a patch from native buffers.
    ///
    /// `scale_z` is multiplied into the elevation here. A missing mask means
    /// fully opaque.
    pub fn new(
        name: impl Into<String>,
        placement: Placement,
        mut elevation: ElevationMap,
        color: Option<ColorMap>,
        mask: Option<MaskMap>,
    ) -> Result<Self> {
        let name = name.into();
        let (w, h) = elevation.dimensions();
        if w == 0 || h == 0 {
            return Err(CanvasError::ZeroDimension {
                name,
                width: w,
                height: h,
            });
        }
        for (width, height) in color
            .as_ref()
            .map(|c| c.dimensions())
            .into_iter()
            .chain(mask.as_ref().map(|m| m.dimensions()))
        {
            if width == 0 || height == 0 {
                return Err(CanvasError::ZeroDimension {
                    name,
                    width,
                    height,
                });
            }
        }
        for (field, value) in [
            ("scale_xy", placement.scale_xy),
            ("scale_z", placement.scale_z),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(CanvasError::InvalidPlacement { name, field, value });
            }
        }

        if (placement.scale_z - 1.0).abs() > 1e-6 {
            let z = placement.scale_z as f32;
            for p in elevation.pixels_mut() {
                p[0] *= z;
            }
        }

        let mask = match mask {
            Some(mut m) => {
                for p in m.pixels_mut() {
                    p[0] = p[0].clamp(0.0, 1.0);
                }
                m
            }
            None => MaskMap::from_pixel(w, h, Luma([1.0])),
        };

        let extent =
            |native: u32| u32::try_from(round_px(native as f64 * placement.scale_xy).max(1)).ok();
        let (Some(effective_w), Some(effective_h)) = (extent(w), extent(h)) else {
            return Err(CanvasError::InvalidPlacement {
                name,
                field: "scale_xy",
                value: placement.scale_xy,
            });
        };

        Ok(Self {
            instance_id: name.clone(),
            name,
            elevation,
            color,
            mask,
            placement,
            effective_w,
            effective_h,
        })
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn elevation(&self) -> &ElevationMap {
        &self.elevation
    }

    pub fn color(&self) -> Option<&ColorMap> {
        self.color.as_ref()
    }

    pub fn mask(&self) -> &MaskMap {
        &self.mask
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Top-left corner in canvas space.
    pub fn origin(&self) -> (i64, i64) {
        (self.placement.canvas_x, self.placement.canvas_y)
    }

    pub fn native_size(&self) -> (u32, u32) {
        self.elevation.dimensions()
    }

    /// Canvas-space footprint after `scale_xy`.
    pub fn effective_size(&self) -> (u32, u32) {
        (self.effective_w, self.effective_h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageBuffer;

    fn flat(w: u32, h: u32, v: f32) -> ElevationMap {
        ImageBuffer::from_pixel(w, h, Luma([v]))
    }

    #[test]
    fn effective_extent_rounds_scaled_native_size() {
        let p = Patch::new(
            "a",
            Placement::at(3, -2).with_scale_xy(1.5),
            flat(10, 7, 0.0),
            None,
            None,
        )
        .unwrap();
        // 10*1.5 = 15, 7*1.5 = 10.5 -> 10 (half to even)
        assert_eq!(p.effective_size(), (15, 10));
        assert_eq!(p.native_size(), (10, 7));
        assert_eq!(p.origin(), (3, -2));
    }

    #[test]
    fn effective_extent_never_drops_below_one() {
        let p = Patch::new(
            "tiny",
            Placement::default().with_scale_xy(0.01),
            flat(4, 4, 0.0),
            None,
            None,
        )
        .unwrap();
        assert_eq!(p.effective_size(), (1, 1));
    }

    #[test]
    fn scale_z_is_applied_at_load() {
        let p = Patch::new(
            "z",
            Placement::default().with_scale_z(2.5),
            flat(2, 2, 100.0),
            None,
            None,
        )
        .unwrap();
        assert!(p.elevation().pixels().all(|px| px[0] == 250.0));
    }

    #[test]
    fn missing_mask_is_fully_opaque() {
        let p = Patch::new("m", Placement::default(), flat(3, 5, 1.0), None, None).unwrap();
        assert_eq!(p.mask().dimensions(), (3, 5));
        assert!(p.mask().pixels().all(|px| px[0] == 1.0));
        assert_eq!(p.instance_id(), "m");
        assert!(p.color().is_none());
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let err = Patch::new("empty", Placement::default(), flat(0, 5, 0.0), None, None)
            .unwrap_err();
        assert!(matches!(err, CanvasError::ZeroDimension { width: 0, .. }));
    }

    #[test]
    fn empty_color_or_mask_is_rejected() {
        let err = Patch::new(
            "no_color",
            Placement::default(),
            flat(4, 4, 0.0),
            Some(ColorMap::new(0, 0)),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, CanvasError::ZeroDimension { width: 0, height: 0, .. }));

        let err = Patch::new(
            "no_mask",
            Placement::default(),
            flat(4, 4, 0.0),
            None,
            Some(MaskMap::new(4, 0)),
        )
        .unwrap_err();
        assert!(matches!(err, CanvasError::ZeroDimension { width: 4, height: 0, .. }));
    }

    #[test]
    fn oversized_extent_is_rejected() {
        let err = Patch::new(
            "huge",
            Placement::default().with_scale_xy(1e12),
            flat(4, 4, 0.0),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CanvasError::InvalidPlacement {
                field: "scale_xy",
                ..
            }
        ));
    }

    #[test]
    fn non_positive_scale_is_rejected() {
        let err = Patch::new(
            "neg",
            Placement::default().with_scale_xy(-1.0),
            flat(2, 2, 0.0),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CanvasError::InvalidPlacement {
                field: "scale_xy",
                ..
            }
        ));

        assert!(Patch::new(
            "zero_z",
            Placement::default().with_scale_z(0.0),
            flat(2, 2, 0.0),
            None,
            None,
        )
        .is_err());
    }
}
