use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use terrain_canvas::compositor::Composite;
use terrain_canvas::config::Config;
use terrain_canvas::grid::Layout;
use terrain_canvas::project::{self, Project};
use terrain_canvas::{export, Composition};

#[derive(Parser)]
#[command(
    name = "terrain-canvas",
    version,
    about = "Composite placed heightmap/imagery patches into one terrain canvas"
)]
struct Cli {
    /// Path to config file (ignored if missing)
    #[arg(short, long, default_value = "terrain-canvas.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Composite every patch placed on a project's canvas
    Compose {
        /// Project directory containing project.json
        #[arg(long)]
        project_dir: PathBuf,

        /// Export name; outputs land in <project-dir>/exports/<name>/
        #[arg(long)]
        export_name: String,

        /// Maximum output size on the longer side
        #[arg(long)]
        max_resolution: Option<u32>,
    },
    /// Stitch uniform heightmap tiles into a grid and blend the seams
    Combine {
        /// Text file with one heightmap path per line
        #[arg(long)]
        tile_list: PathBuf,

        /// Output directory
        #[arg(long)]
        out_dir: PathBuf,

        /// auto, grid, horizontal or vertical
        #[arg(long)]
        layout: Option<Layout>,

        /// Seam blend width on each side, in pixels
        #[arg(long)]
        blend_px: Option<u32>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load_or_default(&cli.config)?;

    // Initialize logging with level from config
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.settings.log_level)),
        )
        .init();

    tracing::info!("terrain-canvas v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Compose {
            project_dir,
            export_name,
            max_resolution,
        } => {
            let mut settings = config.placement_settings();
            if let Some(max) = max_resolution {
                settings.max_resolution = max;
            }
            tracing::info!(
                "Filters: elevation={}, mask={}, color={}",
                settings.filters.elevation,
                settings.filters.mask,
                settings.filters.color
            );

            let project = Project::open(&project_dir)
                .with_context(|| format!("Failed to open project {}", project_dir.display()))?;
            let set = project.load_patches();

            let Composite::Placement(output) = Composition::placement(set, settings).compose()?
            else {
                anyhow::bail!("placement composition returned a non-placement result");
            };

            let dir = project.exports_dir(&export_name);
            let files = export::write_placement(&dir, &export_name, &output)
                .with_context(|| format!("Failed to write export to {}", dir.display()))?;

            let stats = output.canvas.stats;
            println!(
                "Composited {} patch{} ({} skipped) into {}x{} px, elevation {:.1}m - {:.1}m",
                stats.patches_composited,
                if stats.patches_composited == 1 { "" } else { "es" },
                output.skipped.len(),
                stats.width,
                stats.height,
                stats.elevation_min,
                stats.elevation_max
            );
            for skipped in &output.skipped {
                println!("  skipped {}", skipped);
            }
            println!("  {}", files.heightmap.display());
            println!("  {}", files.imagery.display());
            println!("  {}", files.meta.display());
        }
        Command::Combine {
            tile_list,
            out_dir,
            layout,
            blend_px,
        } => {
            let mut settings = config.grid_settings();
            if let Some(layout) = layout {
                settings.layout = layout;
            }
            if let Some(px) = blend_px {
                settings.blend_px = px;
            }

            let paths = project::read_tile_list(&tile_list)?;
            tracing::info!("Combining {} tile(s), layout {}", paths.len(), settings.layout);
            let tiles = project::read_tiles(&paths)?;

            let Composite::Grid(output) = Composition::grid(tiles, settings).compose()? else {
                anyhow::bail!("grid composition returned a non-grid result");
            };

            let heightmap = export::write_grid(&out_dir, &paths, &output)
                .with_context(|| format!("Failed to write output to {}", out_dir.display()))?;

            println!(
                "Combined {} tile{} as {}x{} grid into {}x{} px, elevation {:.1}m - {:.1}m",
                output.tile_count,
                if output.tile_count == 1 { "" } else { "s" },
                output.shape.cols,
                output.shape.rows,
                output.width(),
                output.height(),
                output.elevation_min,
                output.elevation_max
            );
            println!("  {}", heightmap.display());
        }
    }

    Ok(())
}
