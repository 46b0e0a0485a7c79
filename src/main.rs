use anyhow::Context;
use clap::{Parser, Subcommand};
use pip_worker::config::WorkerConfig;
use pip_worker::logging::init_logging;
use pip_worker::protocol::LoadRequest;
use pip_worker::session::{self, LoadJob};
use std::path::{Path, PathBuf};
use tokio::io::BufReader;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the worker protocol over stdin/stdout
    Run {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Directory for the wof-<layer>-data.json side table
        #[arg(long, value_name = "DIR")]
        side_table_dir: Option<PathBuf>,
    },
    /// Load one layer and print the properties of the polygon containing a point
    Lookup {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        #[arg(long, value_name = "DIR")]
        side_table_dir: Option<PathBuf>,
        #[arg(long)]
        layer: String,
        #[arg(long, value_name = "PATH")]
        datapath: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
    },
}

fn load_config(
    path: Option<&Path>,
    side_table_dir: Option<PathBuf>,
) -> anyhow::Result<WorkerConfig> {
    let mut config = WorkerConfig::load_or_default(path)?;
    if let Some(dir) = side_table_dir {
        config.store.side_table_dir = dir;
    }
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            side_table_dir,
        } => {
            let config = load_config(config.as_deref(), side_table_dir)?;
            tracing::info!(
                side_table_dir = %config.store.side_table_dir.display(),
                "worker started, waiting for load"
            );

            let stdin = BufReader::new(tokio::io::stdin());
            session::serve(config, stdin, tokio::io::stdout())
                .await
                .context("Worker channel failed")?;
        }
        Commands::Lookup {
            config,
            side_table_dir,
            layer,
            datapath,
            lon,
            lat,
        } => {
            let config = load_config(config.as_deref(), side_table_dir)?;
            let request = LoadRequest {
                layer: layer.clone(),
                datapath,
                localized_admin_names: None,
            };

            let loaded = LoadJob::new(request, config.store)
                .run()
                .with_context(|| format!("Failed to load layer {}", layer))?;
            tracing::info!(
                layer = %layer,
                features = loaded.lookup.len(),
                side_table = %loaded.side_table.display(),
                "layer loaded"
            );

            let results = loaded.lookup.search(lon, lat);
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
    }

    Ok(())
}
