use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use manifest_harvester::harvest::{synthesize, SynthesisParams};
use manifest_harvester::index::CatalogIndex;
use manifest_harvester::{HarvestConfig, HarvestQueue, Identity, ProtocolGeneration};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "manifest-harvester")]
#[command(about = "Harvests device catalog records into driver manifests")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sweep a range of catalog IDs and write manifests plus an index
    Harvest {
        #[arg(long)]
        first_id: Option<u32>,
        #[arg(long)]
        last_id: Option<u32>,
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Only keep records for this frequency region, e.g. "Europe"
        #[arg(long)]
        region: Option<String>,
    },
    /// Turn one saved catalog record into a manifest on stdout
    Synthesize {
        /// File containing the raw catalog JSON
        input: PathBuf,
        #[arg(long, default_value = "driver_id_placeholder")]
        driver_id: String,
        #[arg(long, default_value = "driver_class_placeholder")]
        driver_class: String,
        /// Comma separated list of capabilities
        #[arg(long, value_delimiter = ',')]
        capabilities: Vec<String>,
        #[arg(long, default_value_t = 2)]
        sdk_version: u8,
        /// Catalog ID the record was fetched with
        #[arg(long, default_value_t = 0)]
        source_id: u32,
    },
    /// Find the catalog ID of a device in a previously written index
    Lookup {
        #[arg(long)]
        manufacturer_id: u64,
        #[arg(long)]
        product_type_id: u64,
        #[arg(long)]
        product_id: u64,
        /// Index file, defaults to the configured output location
        #[arg(long)]
        index: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = HarvestConfig::load_or_default(cli.config.as_deref())
        .context("loading configuration")?;

    match cli.command {
        Commands::Harvest {
            first_id,
            last_id,
            concurrency,
            output_dir,
            region,
        } => {
            let sweep = &mut config.harvest;
            sweep.first_id = first_id.unwrap_or(sweep.first_id);
            sweep.last_id = last_id.unwrap_or(sweep.last_id);
            sweep.concurrency = concurrency.unwrap_or(sweep.concurrency);
            if let Some(output_dir) = output_dir {
                sweep.output_dir = output_dir;
            }
            if region.is_some() {
                sweep.region = region;
            }
            config.validate().context("validating configuration")?;

            let queue = HarvestQueue::from_config(&config).context("building HTTP client")?;
            let report = queue
                .run(config.harvest.id_range())
                .await
                .context("harvest run did not complete")?;

            println!(
                "harvest complete: attempted={} persisted={} dropped={} index={}",
                report.attempted,
                report.persisted,
                report.dropped_total(),
                report.index_path.display()
            );
        }
        Commands::Synthesize {
            input,
            driver_id,
            driver_class,
            capabilities,
            sdk_version,
            source_id,
        } => {
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let params = SynthesisParams::new(driver_id, driver_class, source_id)
                .with_capabilities(capabilities)
                .with_generation(ProtocolGeneration::from_sdk_version(sdk_version));

            let manifest = synthesize(&raw, &params)
                .with_context(|| format!("synthesizing {}", input.display()))?;
            info!(id = %manifest.id, settings = manifest.settings.len(), "Created manifest");
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
        Commands::Lookup {
            manufacturer_id,
            product_type_id,
            product_id,
            index,
        } => {
            let path = index
                .unwrap_or_else(|| config.harvest.output_dir.join(&config.harvest.index_file));
            let catalog = CatalogIndex::load(&path)?;
            let identity = Identity {
                manufacturer_id,
                product_type_id,
                product_id,
            };

            match catalog.find_source_id(&identity) {
                Some(source_id) => println!("{source_id}"),
                None => bail!(
                    "no device {manufacturer_id}/{product_type_id}/{product_id} in {}",
                    path.display()
                ),
            }
        }
    }

    Ok(())
}
