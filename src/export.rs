use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageBuffer, Rgb, Rgb32FImage};
use serde::Serialize;

use crate::compositor::{GridOutput, PlacementOutput};
use crate::error::{CanvasError, Result, SkippedPatch};
use crate::raster::ElevationMap;

#[derive(Serialize)]
struct ExportMeta<'a> {
    export_name: &'a str,
    max_resolution: u32,
    output_width_px: u32,
    output_height_px: u32,
    canvas_width_px: u64,
    canvas_height_px: u64,
    patch_count: usize,
    patches_composited: usize,
    elev_min_m: f32,
    elev_max_m: f32,
    patches: Vec<ExportPatch<'a>>,
    skipped: &'a [SkippedPatch],
}

#[derive(Serialize)]
struct ExportPatch<'a> {
    instance_id: &'a str,
    name: &'a str,
    cx: i64,
    cy: i64,
    scale_xy: f64,
    scale_z: f64,
}

/// Files written by a placement export.
#[derive(Debug, Clone)]
pub struct PlacementFiles {
    pub heightmap: PathBuf,
    pub imagery: PathBuf,
    pub meta: PathBuf,
}

/// Write heightmap.exr, imagery.png and export_meta.json into `dir`.
pub fn write_placement(dir: &Path, export_name: &str, output: &PlacementOutput) -> Result<PlacementFiles> {
    fs::create_dir_all(dir)?;
    let canvas = &output.canvas;

    let heightmap = dir.join("heightmap.exr");
    write_exr(&heightmap, &canvas.elevation)?;
    tracing::info!("Saved: {}", heightmap.display());

    let imagery = dir.join("imagery.png");
    canvas.color.save(&imagery).map_err(|source| CanvasError::Image {
        path: imagery.clone(),
        source,
    })?;
    tracing::info!("Saved: {}", imagery.display());

    let meta = ExportMeta {
        export_name,
        max_resolution: output.max_resolution,
        output_width_px: canvas.stats.width,
        output_height_px: canvas.stats.height,
        canvas_width_px: canvas.bounds.width(),
        canvas_height_px: canvas.bounds.height(),
        patch_count: output.patches.len(),
        patches_composited: canvas.stats.patches_composited,
        elev_min_m: canvas.stats.elevation_min,
        elev_max_m: canvas.stats.elevation_max,
        patches: output
            .patches
            .iter()
            .map(|p| ExportPatch {
                instance_id: &p.instance_id,
                name: &p.name,
                cx: p.placement.canvas_x,
                cy: p.placement.canvas_y,
                scale_xy: p.placement.scale_xy,
                scale_z: p.placement.scale_z,
            })
            .collect(),
        skipped: &output.skipped,
    };
    let meta_path = dir.join("export_meta.json");
    let json = serde_json::to_string_pretty(&meta).map_err(|source| CanvasError::Json {
        path: meta_path.clone(),
        source,
    })?;
    fs::write(&meta_path, json)?;
    tracing::info!("Saved: {}", meta_path.display());

    Ok(PlacementFiles {
        heightmap,
        imagery,
        meta: meta_path,
    })
}

/// Write combined_heightmap.exr and its companion text summary into `dir`.
/// Returns the heightmap path.
pub fn write_grid(dir: &Path, tile_paths: &[PathBuf], output: &GridOutput) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let heightmap = dir.join("combined_heightmap.exr");
    write_exr(&heightmap, &output.elevation)?;
    tracing::info!("Saved: {}", heightmap.display());

    let meta_path = dir.join("combined_heightmap_meta.txt");
    fs::write(&meta_path, grid_summary(tile_paths, output))?;
    tracing::info!("Saved: {}", meta_path.display());

    Ok(heightmap)
}

/// Human-readable summary of a grid composite.
pub fn grid_summary(tile_paths: &[PathBuf], output: &GridOutput) -> String {
    let range = output.elevation_max - output.elevation_min;
    let mut s = String::new();
    let _ = writeln!(s, "Terrain Canvas - Combined Heightmap Metadata");
    let _ = writeln!(s, "{}", "=".repeat(40));
    let _ = writeln!(s, "Total tiles:   {}", tile_paths.len());
    let _ = writeln!(
        s,
        "Grid layout:   {} col(s) x {} row(s)",
        output.shape.cols, output.shape.rows
    );
    let _ = writeln!(
        s,
        "Tile size:     {} x {} px each",
        output.tile_width, output.tile_height
    );
    let _ = writeln!(
        s,
        "Canvas size:   {} x {} px total",
        output.width(),
        output.height()
    );
    let _ = writeln!(s, "Seam blend:    {} px", output.blend_px);
    let _ = writeln!(s, "Min elevation: {:.2} m", output.elevation_min);
    let _ = writeln!(s, "Max elevation: {:.2} m", output.elevation_max);
    let _ = writeln!(s, "Elev range:    {:.2} m", range);
    let _ = writeln!(s);
    let _ = writeln!(s, "Import notes:");
    let _ = writeln!(s, "  - EXR format: RGB 32-bit float, values in real meters");
    let _ = writeln!(s, "  - Height scale:  {:.1} (elevation range)", range);
    let _ = writeln!(s, "  - Height offset: {:.1} (minimum elevation)", output.elevation_min);
    let _ = writeln!(s);
    let _ = writeln!(s, "Tile order (left to right, top to bottom):");
    for (i, path) in tile_paths.iter().enumerate() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        let _ = writeln!(s, "  [{:>3}] {}", i + 1, name);
    }
    s
}

/// Write elevation as an RGB 32-bit float EXR with R = G = B.
pub fn write_exr(path: &Path, elevation: &ElevationMap) -> Result<()> {
    let rgb: Rgb32FImage = ImageBuffer::from_fn(elevation.width(), elevation.height(), |x, y| {
        let v = elevation.get_pixel(x, y)[0];
        Rgb([v, v, v])
    });
    rgb.save(path).map_err(|source| CanvasError::Image {
        path: path.to_path_buf(),
        source,
    })
}
