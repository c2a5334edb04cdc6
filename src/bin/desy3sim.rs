//! Command line entry point for the tile simulations.
//!
//! ```bash
//! # render every SE image of DES0003-3832 in r, i and z
//! RUST_LOG=info desy3sim galsim --tilename DES0003-3832 --bands riz \
//!     --output-desdata $OUT --seed 42 --config-file sim.yaml
//!
//! # only build and write the truth catalog
//! desy3sim truth --tilename DES0003-3832 --output-desdata $OUT --seed 42 \
//!     --config-file sim.yaml
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::info;

use desy3sim::config::SimConfig;
use desy3sim::files::FileLayout;
use desy3sim::simulation::Simulation;

#[derive(Parser)]
#[command(author, version, about = "Run simple DES Y3 end-to-end simulations.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TileArgs {
    /// the coadd tile to simulate
    #[arg(long)]
    tilename: String,
    /// bands as a concatenated string (e.g. "riz"); defaults to every band
    /// with a band-info file
    #[arg(long)]
    bands: Option<String>,
    /// the output DESDATA directory
    #[arg(long)]
    output_desdata: PathBuf,
    /// the base RNG seed
    #[arg(long)]
    seed: u64,
    /// the YAML config file
    #[arg(long)]
    config_file: PathBuf,
    /// inputs staged under this directory are written to the output
    /// directory; defaults to $TMPDIR
    #[arg(long)]
    tmp_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render every single-epoch image of a tile
    Galsim(TileArgs),
    /// Build and write only the truth catalog
    Truth(TileArgs),
}

fn build(args: &TileArgs) -> desy3sim::Result<Simulation> {
    let config = SimConfig::from_yaml(&args.config_file)?;
    let layout = FileLayout::new(&args.output_desdata);
    let bands: Vec<String> = match &args.bands {
        Some(bands) => bands.chars().map(String::from).collect(),
        None => layout.discover_bands(&args.tilename)?,
    };
    info!(" bands {:?}", bands);
    let sim = Simulation::new(args.seed, layout, &args.tilename, &bands, config)?;
    Ok(match &args.tmp_dir {
        Some(dir) => sim.with_tmp_dir(Some(dir)),
        None => sim,
    })
}

fn main() -> desy3sim::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Galsim(args) => {
            let truth = build(&args)?.run()?;
            info!(" simulated {} objects", truth.len());
        }
        Commands::Truth(args) => {
            let (_, truth) = build(&args)?.run_truth()?;
            info!(" wrote {} truth objects", truth.len());
        }
    }
    Ok(())
}
