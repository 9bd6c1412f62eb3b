//! Project directory loader.
//!
//! Layout:
//!
//! ```text
//! <project>/project.json                  canvas.patches[] placements
//! <project>/patches/<name>/meta.json      width_px, height_px, mask_feather_px
//! <project>/patches/<name>/heightmap.exr  elevation (R channel, meters)
//! <project>/patches/<name>/imagery.png    optional RGB imagery
//! <project>/patches/<name>/mask.png       optional 8-bit opacity mask
//! <project>/exports/<export_name>/        composite outputs
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use image::{imageops, ImageBuffer, Luma};
use serde::Deserialize;

use crate::compositor::PatchSet;
use crate::error::{CanvasError, Result, SkippedPatch};
use crate::patch::{Patch, Placement};
use crate::raster::{ColorMap, ElevationMap, MaskMap};

#[derive(Debug, Default, Deserialize)]
struct ProjectFile {
    #[serde(default)]
    canvas: CanvasSection,
}

#[derive(Debug, Default, Deserialize)]
struct CanvasSection {
    #[serde(default)]
    patches: Vec<PlacedPatch>,
}

/// One entry of `canvas.patches` in project.json.
#[derive(Debug, Clone, Deserialize)]
pub struct PlacedPatch {
    #[serde(default)]
    pub patch_name: String,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub canvas_x: f64,
    #[serde(default)]
    pub canvas_y: f64,
    #[serde(default = "default_scale")]
    pub scale_xy: f64,
    #[serde(default = "default_scale")]
    pub scale_z: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl PlacedPatch {
    pub fn placement(&self) -> Placement {
        // integral offsets; fractional JSON values truncate toward zero
        Placement::at(self.canvas_x as i64, self.canvas_y as i64)
            .with_scale_xy(self.scale_xy)
            .with_scale_z(self.scale_z)
    }
}

/// Sizes may be written as floats; they truncate like placement offsets.
#[derive(Debug, Default, Deserialize)]
struct PatchMeta {
    #[serde(default)]
    width_px: f64,
    #[serde(default)]
    height_px: f64,
    #[serde(default)]
    mask_feather_px: f64,
}

impl PatchMeta {
    fn size(&self) -> (u32, u32) {
        (self.width_px as u32, self.height_px as u32)
    }

    fn feather_px(&self) -> u32 {
        self.mask_feather_px as u32
    }
}

/// An opened project directory.
#[derive(Debug)]
pub struct Project {
    root: PathBuf,
    placed: Vec<PlacedPatch>,
}

impl Project {
    /// Read project.json. Missing file or an empty canvas is fatal.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let path = root.join("project.json");
        if !path.exists() {
            return Err(CanvasError::MissingInput(path));
        }
        let file: ProjectFile = read_json(&path)?;
        if file.canvas.patches.is_empty() {
            return Err(CanvasError::NoPatches);
        }
        Ok(Self {
            root,
            placed: file.canvas.patches,
        })
    }

    pub fn exports_dir(&self, export_name: &str) -> PathBuf {
        self.root.join("exports").join(export_name)
    }

    /// Load every placed patch in order. Failures are recorded, not raised.
    pub fn load_patches(&self) -> PatchSet {
        let mut set = PatchSet::default();
        for placed in &self.placed {
            match self.load_patch(placed) {
                Ok(patch) => {
                    let (sw, sh) = patch.native_size();
                    let (ew, eh) = patch.effective_size();
                    let p = patch.placement();
                    tracing::info!(
                        "Loaded '{}' (src {}x{} px, canvas {}x{} px, scale_xy={}, scale_z={}, offset {},{})",
                        patch.name(),
                        sw,
                        sh,
                        ew,
                        eh,
                        p.scale_xy,
                        p.scale_z,
                        p.canvas_x,
                        p.canvas_y
                    );
                    set.patches.push(patch);
                }
                Err(reason) => set.skip(SkippedPatch::new(placed.patch_name.as_str(), reason)),
            }
        }
        set
    }

    fn load_patch(&self, placed: &PlacedPatch) -> std::result::Result<Patch, String> {
        let name = placed.patch_name.as_str();
        let dir = self.root.join("patches").join(name);

        let meta_path = dir.join("meta.json");
        if !meta_path.exists() {
            return Err("meta.json not found".to_string());
        }
        let meta: PatchMeta = read_json(&meta_path).map_err(|e| e.to_string())?;
        let (width, height) = meta.size();
        if width == 0 || height == 0 {
            return Err("width/height unknown in meta.json".to_string());
        }

        let heightmap = first_existing(&dir, &["heightmap.exr", "heightmap_000.exr"])
            .ok_or_else(|| "heightmap not found".to_string())?;
        let elevation = read_elevation(&heightmap).map_err(|e| e.to_string())?;

        let color = match first_existing(&dir, &["imagery.png", "imagery_000.png"]) {
            None => {
                tracing::warn!("Imagery not found for '{}'", name);
                None
            }
            Some(path) => match read_color(&path) {
                Ok(img) => Some(img),
                Err(e) => {
                    tracing::warn!("Could not load imagery for '{}': {}", name, e);
                    None
                }
            },
        };

        let mask_path = dir.join("mask.png");
        let mask = if mask_path.exists() {
            match read_mask(&mask_path, meta.feather_px()) {
                Ok(m) => Some(m),
                Err(e) => {
                    tracing::warn!("Could not load mask for '{}': {}", name, e);
                    None
                }
            }
        } else {
            None
        };

        let patch = Patch::new(name, placed.placement(), elevation, color, mask)
            .map_err(|e| e.to_string())?;
        Ok(match placed.instance_id {
            Some(ref id) => patch.with_instance_id(id.as_str()),
            None => patch,
        })
    }
}

fn first_existing(dir: &Path, names: &[&str]) -> Option<PathBuf> {
    names.iter().map(|n| dir.join(n)).find(|p| p.exists())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| CanvasError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn image_error(path: &Path) -> impl FnOnce(image::ImageError) -> CanvasError + '_ {
    move |source| CanvasError::Image {
        path: path.to_path_buf(),
        source,
    }
}

/// Decode a heightmap; the first channel holds elevation.
pub fn read_elevation(path: &Path) -> Result<ElevationMap> {
    let rgb = image::open(path).map_err(image_error(path))?.into_rgb32f();
    Ok(ImageBuffer::from_fn(rgb.width(), rgb.height(), |x, y| {
        Luma([rgb.get_pixel(x, y)[0]])
    }))
}

fn read_color(path: &Path) -> Result<ColorMap> {
    Ok(image::open(path).map_err(image_error(path))?.into_rgb8())
}

/// Decode an 8-bit mask into [0,1], Gaussian-feathered by `feather_px`.
fn read_mask(path: &Path, feather_px: u32) -> Result<MaskMap> {
    let mut gray = image::open(path).map_err(image_error(path))?.into_luma8();
    if feather_px > 0 {
        gray = imageops::blur(&gray, feather_px as f32);
    }
    Ok(ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([gray.get_pixel(x, y)[0] as f32 / 255.0])
    }))
}

/// Read a tile list: one heightmap path per line. Blank lines and paths that
/// do not exist are dropped.
pub fn read_tile_list(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(CanvasError::MissingInput(path.to_path_buf()));
    }
    let paths: Vec<PathBuf> = fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .filter(|p| {
            let exists = p.exists();
            if !exists {
                tracing::warn!("Tile not found, ignoring: {}", p.display());
            }
            exists
        })
        .collect();
    if paths.is_empty() {
        return Err(CanvasError::EmptyTileList);
    }
    Ok(paths)
}

/// Decode every tile, in list order.
pub fn read_tiles(paths: &[PathBuf]) -> Result<Vec<ElevationMap>> {
    paths
        .iter()
        .enumerate()
        .map(|(i, path)| {
            tracing::info!("[{}/{}] Reading: {}", i + 1, paths.len(), path.display());
            read_elevation(path)
        })
        .collect()
}
