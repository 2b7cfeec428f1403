use anyhow::{bail, Context};
use apartment_pricer::config::Config;
use apartment_pricer::logging;
use apartment_pricer::metrics;
use apartment_pricer::model::{ModelFamily, ScoringCriterion};
use apartment_pricer::pipeline::{extract, CsvHistoryStore, HistoryStore, NormalizationPipeline};
use apartment_pricer::predictor::ListingFeatures;
use apartment_pricer::server;
use apartment_pricer::service::PricingService;
use apartment_pricer::table::Table;
use apartment_pricer::training::{run_benchmark, BenchmarkOptions, BenchmarkReport};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "apartment_pricer")]
#[command(about = "Apartment price estimation: ingest listings, retrain, predict")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Overrides the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Ingest a .csv or .xlsx batch, retrain and persist the model
    Ingest {
        file: PathBuf,
    },
    /// Estimate the price of one apartment with the persisted model
    Predict {
        #[arg(long)]
        area: f64,
        #[arg(long)]
        bedrooms: i64,
        #[arg(long)]
        bathrooms: i64,
        #[arg(long)]
        parking_spaces: i64,
        #[arg(long)]
        neighborhood: String,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        latitude: f64,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        longitude: f64,
        #[arg(long)]
        created_date: Option<i64>,
    },
    /// Compare model families with k-fold cross-validation (nothing is persisted)
    Benchmark {
        /// Raw batch to normalize and evaluate; defaults to the historical table
        #[arg(long)]
        dataset: Option<PathBuf>,
        /// Tune hyperparameters with an inner grid search on every fold
        #[arg(long)]
        grid_search: bool,
        /// Candidate families (comma-separated): LR, RFR, GBT
        #[arg(long, default_value = "GBT,RFR")]
        models: String,
        /// r2, neg_mean_absolute_error or neg_root_mean_squared_error
        #[arg(long, default_value = "r2")]
        criterion: String,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load().context("loading configuration")?;

    logging::init_logging(&config.logging.dir);
    if config.metrics.enabled {
        metrics::init_metrics();
    }

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            let service = Arc::new(PricingService::from_config(&config));
            server::start_server(service, &config.server, config.metrics.enabled).await?;
        }
        Commands::Ingest { file } => {
            let bytes =
                std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let service = PricingService::from_config(&config);
            let summary = service.ingest(&filename, &bytes).await?;
            println!("Rows in history: {}", summary.rows_in_history);
            println!("In-sample R²:    {:.4}", summary.r2);
            println!("Artifact:        {}", summary.artifact_id);
        }
        Commands::Predict {
            area,
            bedrooms,
            bathrooms,
            parking_spaces,
            neighborhood,
            latitude,
            longitude,
            created_date,
        } => {
            let service = PricingService::from_config(&config);
            let estimate = service.predict(&ListingFeatures {
                area,
                bedrooms,
                bathrooms,
                parking_spaces,
                neighborhood,
                latitude,
                longitude,
                created_date,
            })?;
            println!("{}: {:.2}", estimate.neighborhood, estimate.estimated_price);
        }
        Commands::Benchmark {
            dataset,
            grid_search,
            models,
            criterion,
            json,
        } => {
            let table = match dataset {
                Some(path) => {
                    let bytes = std::fs::read(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    let raw = Table::from_upload(&path.to_string_lossy(), &bytes)?;
                    NormalizationPipeline::standard().run(&raw)?.table
                }
                None => match CsvHistoryStore::new(&config.storage.history_path).load()? {
                    Some(t) => t,
                    None => bail!(
                        "no historical table at {}; pass --dataset",
                        config.storage.history_path.display()
                    ),
                },
            };

            let options = BenchmarkOptions {
                models: models
                    .split(',')
                    .filter(|m| !m.trim().is_empty())
                    .map(|m| m.parse::<ModelFamily>())
                    .collect::<Result<_, _>>()?,
                grid_search,
                criterion: criterion.parse::<ScoringCriterion>()?,
                ..Default::default()
            };
            info!(rows = table.height(), "Benchmarking");
            let settings = config.training.model_settings();
            let report = run_benchmark(&extract(&table)?, &settings, &options)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
    }

    Ok(())
}

fn print_report(report: &BenchmarkReport) {
    println!(
        "{} rows, criterion {}, grid search {}",
        report.rows,
        report.criterion,
        if report.grid_search { "on" } else { "off" }
    );
    for candidate in &report.candidates {
        println!("\n== {} ==", candidate.family);
        if let Some(err) = &candidate.error {
            println!("  failed: {}", err);
            continue;
        }
        for fold in &candidate.folds {
            let params: Vec<String> = fold
                .best_params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            println!(
                "  fold {}: r2={:.4} mae={:.2} rmse={:.2}  [{}]",
                fold.fold,
                fold.scores.r2,
                fold.scores.mae,
                fold.scores.rmse,
                params.join(", ")
            );
        }
        if let Some(mean) = &candidate.mean {
            println!("  mean:   r2={:.4} mae={:.2} rmse={:.2}", mean.r2, mean.mae, mean.rmse);
        }
    }
    match report.champion_report().and_then(|c| c.mean.map(|m| (c.family, m))) {
        Some((family, mean)) => println!("\nChampion: {} (mean r2 {:.4})", family, mean.r2),
        None => println!("\nNo champion"),
    }
}
