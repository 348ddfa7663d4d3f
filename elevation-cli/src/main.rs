use std::process::ExitCode;

use clap::{Parser, Subcommand};
use espa_elevation::{ElevationError, ErrorKind};

mod commands;

use commands::SceneArgs;

/// Build the elevation band of a Landsat scene
#[derive(Parser)]
#[command(name = "espa-elevation")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the elevation raster and record it in the scene metadata
    Build {
        #[command(flatten)]
        scene: SceneArgs,
    },

    /// Show the grid and source files a build would use, without running GDAL
    Plan {
        #[command(flatten)]
        scene: SceneArgs,

        /// Output the plan as JSON
        #[arg(short, long)]
        json: bool,
    },
}

fn init_logging(debug: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let default = if debug {
        "espa_elevation=debug,espa_elevation_cli=debug"
    } else {
        "espa_elevation=info,espa_elevation_cli=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Process exit status for a failed run, by the kind of library error
/// behind it. Anything else exits with 1.
fn exit_code(err: &anyhow::Error) -> u8 {
    let kind = err
        .chain()
        .find_map(|e| e.downcast_ref::<ElevationError>())
        .map(ElevationError::kind);
    match kind {
        None => 1,
        Some(ErrorKind::Configuration) => 3,
        Some(ErrorKind::Metadata) => 4,
        Some(ErrorKind::Extent) => 5,
        Some(ErrorKind::Resource) => 6,
        Some(ErrorKind::ExternalTool) => 7,
        Some(ErrorKind::Io) => 8,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let result = match cli.command {
        Commands::Build { scene } => commands::build::run(scene),
        Commands::Plan { scene, json } => commands::plan::run(scene, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:?}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}
