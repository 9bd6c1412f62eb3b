use std::fs;
use std::path::Path;

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use terrain_canvas::compositor::{compose_grid, compose_placement, GridSettings, PlacementSettings};
use terrain_canvas::export;
use terrain_canvas::grid::Layout;
use terrain_canvas::project::{self, Project};
use terrain_canvas::raster::{ElevationMap, Filter, Filters};

fn write_patch(root: &Path, name: &str, w: u32, h: u32, elev: f32, rgb: [u8; 3], mask: Option<u8>) {
    let dir = root.join("patches").join(name);
    fs::create_dir_all(&dir).expect("patch dir");
    fs::write(
        dir.join("meta.json"),
        format!(r#"{{"width_px": {}, "height_px": {}}}"#, w, h),
    )
    .expect("meta");
    let hm: ElevationMap = ImageBuffer::from_pixel(w, h, Luma([elev]));
    export::write_exr(&dir.join("heightmap.exr"), &hm).expect("heightmap");
    RgbImage::from_pixel(w, h, Rgb(rgb))
        .save(dir.join("imagery.png"))
        .expect("imagery");
    if let Some(v) = mask {
        GrayImage::from_pixel(w, h, Luma([v]))
            .save(dir.join("mask.png"))
            .expect("mask");
    }
}

fn exact() -> PlacementSettings {
    PlacementSettings {
        max_resolution: 8192,
        filters: Filters {
            elevation: Filter::Nearest,
            mask: Filter::Nearest,
            color: Filter::Nearest,
        },
    }
}

#[test]
fn project_composes_and_exports() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    write_patch(root, "west", 8, 8, 100.0, [200, 0, 0], None);
    write_patch(root, "east", 8, 8, 300.0, [0, 0, 200], Some(255));
    // legacy file names
    let legacy = root.join("patches").join("legacy");
    fs::create_dir_all(&legacy).expect("legacy dir");
    fs::write(legacy.join("meta.json"), r#"{"width_px": 4, "height_px": 4}"#).expect("meta");
    export::write_exr(
        &legacy.join("heightmap_000.exr"),
        &ImageBuffer::from_pixel(4, 4, Luma([50.0])),
    )
    .expect("legacy heightmap");
    // no heightmap at all
    let broken = root.join("patches").join("broken");
    fs::create_dir_all(&broken).expect("broken dir");
    fs::write(broken.join("meta.json"), r#"{"width_px": 4, "height_px": 4}"#).expect("meta");

    fs::write(
        root.join("project.json"),
        r#"{"canvas": {"patches": [
            {"patch_name": "west", "instance_id": "west-1", "canvas_x": 0, "canvas_y": 0},
            {"patch_name": "east", "canvas_x": 8, "canvas_y": 0, "scale_z": 2.0},
            {"patch_name": "broken", "canvas_x": 0, "canvas_y": 8},
            {"patch_name": "legacy", "canvas_x": 0, "canvas_y": 8, "scale_xy": 2.0},
            {"patch_name": "ghost"}
        ]}}"#,
    )
    .expect("project");

    let project = Project::open(root).expect("open");
    let set = project.load_patches();
    assert_eq!(set.patches.len(), 3);
    let skipped: Vec<&str> = set.skipped.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(skipped, ["broken", "ghost"]);
    assert!(set.skipped[0].reason.contains("heightmap"));
    assert!(set.skipped[1].reason.contains("meta.json"));

    let output = compose_placement(set, exact()).expect("compose");
    let canvas = &output.canvas;
    assert_eq!((canvas.stats.width, canvas.stats.height), (16, 16));
    assert_eq!(canvas.stats.patches_composited, 3);
    assert_eq!(canvas.elevation.get_pixel(2, 2)[0], 100.0);
    assert_eq!(canvas.color.get_pixel(2, 2).0, [200, 0, 0]);
    // scale_z doubled the east patch
    assert_eq!(canvas.elevation.get_pixel(12, 4)[0], 600.0);
    assert_eq!(canvas.color.get_pixel(12, 4).0, [0, 0, 200]);
    // legacy patch scaled 4 -> 8 px, no imagery
    assert_eq!(canvas.elevation.get_pixel(3, 12)[0], 50.0);
    assert_eq!(canvas.color.get_pixel(3, 12).0, [0, 0, 0]);
    // nothing placed here
    assert_eq!(canvas.alpha.get_pixel(12, 12)[0], 0.0);

    let out_dir = project.exports_dir("combined");
    let files = export::write_placement(&out_dir, "combined", &output).expect("export");
    assert!(files.heightmap.exists());
    assert!(files.imagery.exists());

    let meta: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&files.meta).expect("meta")).expect("json");
    assert_eq!(meta["export_name"], "combined");
    assert_eq!(meta["output_width_px"], 16);
    assert_eq!(meta["patch_count"], 3);
    assert_eq!(meta["elev_max_m"], 600.0);
    assert_eq!(meta["patches"][0]["instance_id"], "west-1");
    assert_eq!(meta["patches"][1]["instance_id"], "east");
    assert_eq!(meta["patches"][1]["scale_z"], 2.0);
    assert_eq!(meta["skipped"][0]["name"], "broken");

    let back = project::read_elevation(&files.heightmap).expect("reread");
    assert_eq!(back.as_raw(), canvas.elevation.as_raw());
}

#[test]
fn feathered_mask_softens_patch_edge() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    write_patch(root, "base", 16, 16, 10.0, [0, 0, 0], None);

    let overlay = root.join("patches").join("overlay");
    fs::create_dir_all(&overlay).expect("overlay dir");
    fs::write(
        overlay.join("meta.json"),
        r#"{"width_px": 16, "height_px": 16, "mask_feather_px": 2}"#,
    )
    .expect("meta");
    export::write_exr(
        &overlay.join("heightmap.exr"),
        &ImageBuffer::from_pixel(16, 16, Luma([20.0])),
    )
    .expect("heightmap");
    GrayImage::from_fn(16, 16, |x, _| Luma([if x < 8 { 0 } else { 255 }]))
        .save(overlay.join("mask.png"))
        .expect("mask");

    fs::write(
        root.join("project.json"),
        r#"{"canvas": {"patches": [
            {"patch_name": "base"},
            {"patch_name": "overlay"}
        ]}}"#,
    )
    .expect("project");

    let project = Project::open(root).expect("open");
    let output = compose_placement(project.load_patches(), exact()).expect("compose");
    let e = &output.canvas.elevation;
    // far left untouched by the overlay, far right mostly overlay
    assert!((e.get_pixel(0, 8)[0] - 10.0).abs() < 1e-3);
    assert!(e.get_pixel(15, 8)[0] > 14.0);
    // the feathered edge produces intermediate values
    let mid = e.get_pixel(8, 8)[0];
    assert!(mid > 10.0 && mid < 15.0, "{}", mid);
}

#[test]
fn tile_list_combines_into_grid() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    let mut lines = String::new();
    for i in 0..3 {
        let path = root.join(format!("tile_{}.exr", i));
        export::write_exr(
            &path,
            &ImageBuffer::from_pixel(16, 16, Luma([i as f32 * 100.0])),
        )
        .expect("tile");
        lines.push_str(&format!("{}\n", path.display()));
    }
    lines.push_str(&format!("{}\n", root.join("missing.exr").display()));
    let list = root.join("tiles.txt");
    fs::write(&list, lines).expect("list");

    let paths = project::read_tile_list(&list).expect("list");
    assert_eq!(paths.len(), 3);
    let tiles = project::read_tiles(&paths).expect("tiles");
    let settings = GridSettings {
        layout: Layout::Horizontal,
        ..GridSettings::default()
    };
    let output = compose_grid(tiles, settings).expect("combine");
    assert_eq!((output.width(), output.height()), (48, 16));
    assert_eq!(output.elevation.get_pixel(0, 0)[0], 0.0);
    assert_eq!(output.elevation.get_pixel(24, 5)[0], 100.0);
    assert_eq!(output.elevation.get_pixel(47, 15)[0], 200.0);
    // seam at x=16 blends 12..=20
    assert_eq!(output.elevation.get_pixel(16, 0)[0], 50.0);

    let out_dir = root.join("out");
    let heightmap = export::write_grid(&out_dir, &paths, &output).expect("write");
    assert!(heightmap.exists());
    let summary = fs::read_to_string(out_dir.join("combined_heightmap_meta.txt")).expect("summary");
    assert!(summary.contains("Grid layout:   3 col(s) x 1 row(s)"));
    assert!(summary.contains("tile_2.exr"));
}
