use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use roi::{
    hash_distance, Fingerprint, ImageHandle, MaskOptions, MaskOrRegions, MaskSpec, RegionFilterSpec, SaveOptions,
    SortKey, ThresholdMethod,
};
use roi_cli::{job_schema, Job};
use strum::VariantNames;
use tracing::info;
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every task of a job file
    Run {
        /// Path to the TOML or JSON job file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Build a mask and save it
    Mask {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Threshold method name
        #[arg(long, default_value = "Default")]
        method: String,
        /// Channel derivation name (hue, red, edge, ...)
        #[arg(long)]
        filter: Option<String>,
        /// Foreground is darker than the background
        #[arg(long)]
        light_background: bool,
        /// Mask rendering: red, b/w or original
        #[arg(long)]
        mask_color: Option<String>,
    },
    /// Print region statistics as JSON
    Analyze {
        #[arg(short, long)]
        input: PathBuf,
        /// Threshold method name
        #[arg(long, default_value = "Default")]
        method: String,
        #[arg(long)]
        min_surface: Option<f64>,
        #[arg(long)]
        max_surface: Option<f64>,
        /// x, y, xy, length or surface
        #[arg(long)]
        sort_by: Option<SortKey>,
    },
    /// Print the perceptual hash of an image
    Hash {
        input: PathBuf,
    },
    /// Hamming distance between the hashes of two images
    Distance {
        first: PathBuf,
        second: PathBuf,
    },
    /// Print the JSON schema of job files
    Schema,
    /// List the threshold method names
    Methods,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let job = Job::from_file(&config)?;
            info!("Loaded job from {}", config.display());
            job.run()?;
        }
        Commands::Mask {
            input,
            output,
            method,
            filter,
            light_background,
            mask_color,
        } => {
            let options = MaskOptions {
                method: Some(method),
                dark_background: Some(!light_background),
                mask_color,
                image_filter: filter,
            };
            let image = ImageHandle::load(&input)?;
            let mask = image.create_mask_with(&options)?;
            mask.save(&output, &SaveOptions::default())?;
            info!("Mask written to {}", output.display());
        }
        Commands::Analyze {
            input,
            method,
            min_surface,
            max_surface,
            sort_by,
        } => {
            let method: ThresholdMethod = method
                .parse()
                .map_err(|_| eyre!("unknown threshold method '{method}', try one of {:?}", ThresholdMethod::VARIANTS))?;
            let image = ImageHandle::load(&input)?;
            let mask = image.create_mask(&MaskSpec {
                threshold_method: method,
                ..Default::default()
            })?;
            let filter = RegionFilterSpec {
                min_surface,
                max_surface,
                sort_by,
                ..Default::default()
            };
            let stats = image.analyze(MaskOrRegions::Mask(&mask), &filter)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Hash { input } => {
            let fingerprint = ImageHandle::load(&input)?.hash()?;
            println!("{fingerprint}");
        }
        Commands::Distance { first, second } => {
            let a: Fingerprint = ImageHandle::load(&first)?.hash()?;
            let b: Fingerprint = ImageHandle::load(&second)?.hash()?;
            println!("{}", hash_distance(a.bits(), b.bits()));
        }
        Commands::Schema => println!("{}", job_schema()?),
        Commands::Methods => {
            for name in ThresholdMethod::VARIANTS {
                println!("{name}");
            }
        }
    }

    Ok(())
}
