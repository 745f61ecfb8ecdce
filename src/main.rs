use clap::{Parser, Subcommand};
use cloudless_mosaic::config::{self, MosaicConfig};
use cloudless_mosaic::mosaic::{self, RunOptions};
use cloudless_mosaic::output;
use cloudless_mosaic::raster::GeoTiffBackend;
use cloudless_mosaic::workspace::{self, Workspace};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "cloudless-mosaic")]
#[command(about = "Cloud-free satellite mosaics over a fixed lon/lat grid")]
#[command(long_about = "\
Cloud-free satellite mosaics over a fixed lon/lat grid

For each grid cell in the job description, the least cloudy candidate scene
is selected and its red, green and blue bands are cut to the cell. The cell
tiles are then merged into one GeoTIFF.

Workspace layout:

  workspace/
  ├── config.toml          # Optional runtime config
  ├── grid_num_<N>         # Total cell count, for progress polling
  ├── MERGE_COG.tif        # Final mosaic
  └── output/
      └── <col>_<row>/
          ├── tile.tif     # Cell tile
          └── done         # Completion marker

Sources are read from <endpoint>/<bucket>/<path>, where the endpoint is an
http(s) object store or a local directory.

Run 'cloudless-mosaic gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the mosaic described by a job description
    Run(RunArgs),
    /// Print the completed fraction of a running or finished job
    Progress {
        /// Workspace directory of the job
        #[arg(long)]
        workspace: PathBuf,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Object-store URL or local directory holding the scene buckets
    #[arg(long)]
    endpoint: Option<String>,

    /// Workspace directory for tiles, markers and the mosaic
    #[arg(long)]
    workspace: PathBuf,

    /// Job description JSON
    #[arg(long)]
    description: PathBuf,

    /// Number of cells processed in parallel
    #[arg(long)]
    workers: Option<usize>,

    /// Config file (default: <workspace>/config.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep cells already marked done by an earlier run
    #[arg(long)]
    resume: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            let config = load_config(args.config.as_deref(), &args.workspace)?;
            init_logging(&config.logging.level);

            let endpoint = args
                .endpoint
                .or_else(|| config.source.endpoint.clone())
                .ok_or("no endpoint: pass --endpoint or set source.endpoint in config.toml")?;
            let backend = GeoTiffBackend::new(&endpoint, config.source.timeout())?;
            let options = RunOptions::from_config(&config, args.workers, args.resume);
            let ws = Workspace::new(&args.workspace);

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    println!("{}", output::format_cell_event(&event));
                }
            });
            let result = mosaic::run(&args.description, &ws, &backend, &options, Some(tx));
            printer.join().ok();

            output::print_summary(&result?);
        }
        Command::Progress { workspace } => {
            println!("{}", output::format_progress(workspace::progress(&workspace)));
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Explicit `--config` file, else `<workspace>/config.toml`, else defaults.
fn load_config(explicit: Option<&Path>, workspace: &Path) -> Result<MosaicConfig, config::ConfigError> {
    match explicit {
        Some(path) => config::load_config_file(path),
        None => config::load_config(workspace),
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
