//! Main entry point for the weather forecaster
//!
//! This binary provides a unified CLI interface to all functionality:
//! - Sequence preparation from a processed observation table
//! - Model training
//! - Single predictions
//! - The HTTP forecast service

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

use weather_lstm::service::{self, AppContext};
use weather_lstm::training::{Checkpoint, CheckpointMeta, StopReason};
use weather_lstm::utils::{level_for_verbosity, setup_logging, Config};
use weather_lstm::{
    ComputeBackend, FeatureEngineer, ObservationTable, Predictor, SequenceArtifacts, Trainer,
};

const SUMMARY_FILE: &str = "training_summary.json";

#[derive(Parser)]
#[command(name = "weather-lstm")]
#[command(version)]
#[command(about = "LSTM temperature forecasting from gridded weather observations", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build train/validation sequences from a processed table
    Prepare {
        /// Processed observation table (CSV)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output directory for sequences and scaler
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Timesteps per input window
        #[arg(long)]
        sequence_length: Option<usize>,

        /// Steps ahead of the window's last row
        #[arg(long)]
        forecast_horizon: Option<usize>,
    },

    /// Train the forecaster on prepared sequences
    Train {
        /// Directory written by `prepare`
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Checkpoint output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        hidden_size: Option<usize>,

        #[arg(long)]
        num_layers: Option<usize>,

        #[arg(long)]
        dropout: Option<f64>,

        #[arg(long)]
        batch_size: Option<usize>,

        /// Number of epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Learning rate
        #[arg(long)]
        lr: Option<f64>,

        /// Early stopping patience
        #[arg(long)]
        patience: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Predict from the latest rows of a processed table
    Predict {
        /// Processed observation table (CSV)
        #[arg(short, long)]
        table: Option<PathBuf>,

        /// Checkpoint directory
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Scaler file
        #[arg(short, long)]
        scaler: Option<PathBuf>,
    },

    /// Run the HTTP forecast service
    Serve {
        /// Address to bind, e.g. 127.0.0.1:8000
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Show configuration, backends and checkpoint details
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)?;

    setup_logging(level_for_verbosity(cli.verbose, &config.logging.level))?;
    if cli.config.exists() {
        info!("Loaded configuration from {}", cli.config.display());
    } else {
        info!("No config at {}, using defaults", cli.config.display());
    }

    match cli.command {
        Commands::Prepare {
            input,
            output,
            sequence_length,
            forecast_horizon,
        } => {
            if let Some(l) = sequence_length {
                config.data.sequence_length = l;
            }
            if let Some(h) = forecast_horizon {
                config.data.forecast_horizon = h;
            }
            config.validate()?;
            let input = input.unwrap_or_else(|| config.paths.table.clone());
            let output = output.unwrap_or_else(|| config.paths.sequences.clone());
            prepare(&config, &input, &output)?;
        }

        Commands::Train {
            data,
            output,
            hidden_size,
            num_layers,
            dropout,
            batch_size,
            epochs,
            lr,
            patience,
            seed,
        } => {
            let t = &mut config.training;
            t.batch_size = batch_size.unwrap_or(t.batch_size);
            t.epochs = epochs.unwrap_or(t.epochs);
            t.learning_rate = lr.unwrap_or(t.learning_rate);
            t.patience = patience.unwrap_or(t.patience);
            t.seed = seed.or(t.seed);
            let m = &mut config.model;
            m.hidden_size = hidden_size.unwrap_or(m.hidden_size);
            m.num_layers = num_layers.unwrap_or(m.num_layers);
            m.dropout = dropout.unwrap_or(m.dropout);
            config.validate()?;

            let data = data.unwrap_or_else(|| config.paths.sequences.clone());
            let output = output.unwrap_or_else(|| config.paths.checkpoint.clone());
            train(&config, &data, &output)?;
        }

        Commands::Predict {
            table,
            model,
            scaler,
        } => {
            let table = table.unwrap_or_else(|| config.paths.table.clone());
            let model = model.unwrap_or_else(|| config.paths.checkpoint.clone());
            let scaler = scaler.unwrap_or_else(|| config.scaler_path());
            predict(&config, &table, &model, &scaler)?;
        }

        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let addr: SocketAddr = bind
                .parse()
                .with_context(|| format!("invalid bind address '{}'", bind))?;
            let ctx = AppContext::from_config(&config);
            service::serve(ctx, addr).await?;
        }

        Commands::Info => {
            show_info(&config);
        }
    }

    Ok(())
}

fn prepare(config: &Config, input: &Path, output: &Path) -> Result<()> {
    info!("Loading observations from {}", input.display());
    let table = ObservationTable::from_csv(input)?;
    info!("Loaded {} rows with columns {:?}", table.len(), table.column_names());

    let mut engineer =
        FeatureEngineer::new(config.data.sequence_length, config.data.forecast_horizon)
            .with_target(config.data.target_column.clone());
    let prepared = engineer.prepare(table)?;
    let sequences = SequenceArtifacts::build(&mut engineer, &prepared, config.data.train_split)
        .context("cannot create sequences")?;
    sequences.save(output)?;

    println!("Train samples: {}", sequences.metadata.train_samples);
    println!("Val samples:   {}", sequences.metadata.val_samples);
    println!("Features:      {:?}", sequences.metadata.feature_columns);
    println!("Saved to:      {}", output.display());
    Ok(())
}

fn train(config: &Config, data: &Path, output: &Path) -> Result<()> {
    info!("Loading sequences from {}", data.display());
    let sequences = SequenceArtifacts::load(data)?;
    info!(
        "Train samples: {}, val samples: {}, input shape: {:?}",
        sequences.metadata.train_samples,
        sequences.metadata.val_samples,
        sequences.x_train.dim()
    );

    let backend = ComputeBackend::probe(&config.inference.backends)?;
    let trainer = Trainer::new(config.training.clone(), backend.device());
    let checkpoint = Checkpoint::new(output);
    let summary = trainer.train(
        &sequences,
        config.model.model_config(sequences.metadata.n_features),
        &checkpoint,
    )?;

    let summary_path = output.join(SUMMARY_FILE);
    std::fs::create_dir_all(output)?;
    std::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)?;

    println!();
    match summary.stop_reason {
        StopReason::EarlyStopping { epoch } => println!("Early stopping after {} epochs", epoch),
        StopReason::EpochLimit => println!("Ran all {} epochs", summary.epochs.len()),
    }
    println!("Best validation loss: {:.6}", summary.best_val_loss);
    match summary.best_epoch {
        Some(epoch) => println!("Model saved to: {} (epoch {})", output.display(), epoch),
        None => println!("No epoch improved on the initial loss; no checkpoint written"),
    }
    Ok(())
}

fn predict(config: &Config, table: &Path, model: &Path, scaler: &Path) -> Result<()> {
    let predictor = Predictor::load(model, scaler, &config.inference.backends)?;
    let observations = ObservationTable::from_csv(table)?;
    let prepared = predictor.engineer()?.prepare(observations)?;
    let result = predictor.predict_from_table(&prepared)?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn show_info(config: &Config) {
    println!("\nWeather LSTM");
    println!("═══════════════════════════════════════════════════════════════\n");

    println!("[DATA]");
    println!("  Sequence length:  {}", config.data.sequence_length);
    println!("  Forecast horizon: {}", config.data.forecast_horizon);
    println!("  Train split:      {}", config.data.train_split);
    println!("  Target:           {}", config.data.target_column);

    println!("\n[MODEL]");
    println!("  Hidden size: {}", config.model.hidden_size);
    println!("  Layers:      {}", config.model.num_layers);
    println!("  Dropout:     {}", config.model.dropout);

    println!("\n[BACKENDS]");
    for backend in &config.inference.backends {
        let status = if backend.is_available() { "available" } else { "unavailable" };
        println!("  {:<5} {}", backend.to_string(), status);
    }

    println!("\n[CHECKPOINT] {}", config.paths.checkpoint.display());
    let checkpoint = Checkpoint::new(&config.paths.checkpoint);
    println!("  Complete:   {}", if checkpoint.exists() { "yes" } else { "no" });
    match CheckpointMeta::load(&config.paths.checkpoint) {
        Ok(meta) => {
            println!("  Epoch:      {}", meta.epoch);
            println!("  Train loss: {:.6}", meta.train_loss);
            println!("  Val loss:   {:.6}", meta.val_loss);
            println!("  Features:   {:?}", meta.metadata.feature_columns);
        }
        Err(e) => println!("  not available: {}", e),
    }
    println!();
}
