//! Crop Advisor
//!
//! Recommends crops from a soil analysis and works out the fertilizer
//! top-up against the standard prescription.

mod advisor;
mod classifier;
mod config;
mod db;
mod interactive;
mod models;
mod report;
mod table;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;

use crate::advisor::Advisor;
use crate::classifier::Classifier;
use crate::config::AdvisorConfig;
use crate::models::{Drainage, SoilSample, parse_measurement};
use crate::table::FertilizerTable;

#[derive(Parser)]
#[command(name = "crop-advisor")]
#[command(about = "Soil-analysis crop recommender with standard fertilizer prescriptions")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "CROP_ADVISOR_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the SQLite database (overrides config)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Path to the classifier model (overrides config)
    #[arg(short, long)]
    model: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Import a fertilizer prescription CSV
    LoadTable {
        /// Path to the CSV file
        csv: PathBuf,

        /// Clear existing prescriptions before import
        #[arg(long)]
        clear: bool,
    },

    /// Load sample prescriptions for testing (without a reference sheet)
    LoadSample,

    /// List all crops in the fertilizer table
    ListCrops,

    /// Show the standard prescription for one crop
    Crop {
        /// Crop name as it appears in the table
        name: String,
    },

    /// Describe the loaded classifier
    ModelInfo,

    /// Recommend crops for one soil sample
    Recommend {
        #[command(flatten)]
        soil: SoilArgs,

        /// Crop to prescribe for (must be on the shortlist)
        #[arg(long)]
        crop: Option<String>,
    },

    /// Interactive soil form
    Session,
}

/// Soil measurements; anything left out comes from the configured defaults
#[derive(Args)]
struct SoilArgs {
    #[arg(long, value_parser = |s: &str| parse_measurement("ph", s))]
    ph: Option<f64>,

    /// Organic matter (g/kg)
    #[arg(long, value_parser = |s: &str| parse_measurement("organic_matter", s))]
    organic_matter: Option<f64>,

    /// Cation exchange capacity (cmol+/kg)
    #[arg(long, value_parser = |s: &str| parse_measurement("cation_exchange_capacity", s))]
    cec: Option<f64>,

    /// Exchangeable calcium
    #[arg(long, value_parser = |s: &str| parse_measurement("calcium", s))]
    ca: Option<f64>,

    /// Exchangeable magnesium
    #[arg(long, value_parser = |s: &str| parse_measurement("magnesium", s))]
    mg: Option<f64>,

    /// Available phosphate (mg/kg)
    #[arg(long, value_parser = |s: &str| parse_measurement("available_phosphate", s))]
    phosphate: Option<f64>,

    /// Electrical conductivity (dS/m)
    #[arg(long, value_parser = |s: &str| parse_measurement("electrical_conductivity", s))]
    ec: Option<f64>,

    /// Exchangeable potassium (cmol+/kg)
    #[arg(short, long, value_parser = |s: &str| parse_measurement("potassium", s))]
    k: Option<f64>,

    /// good, poor or moderate
    #[arg(long, value_parser = |s: &str| s.parse::<Drainage>())]
    drainage: Option<Drainage>,
}

impl SoilArgs {
    fn into_sample(self, defaults: &SoilSample) -> SoilSample {
        SoilSample {
            ph: self.ph.unwrap_or(defaults.ph),
            organic_matter: self.organic_matter.unwrap_or(defaults.organic_matter),
            cation_exchange_capacity: self.cec.unwrap_or(defaults.cation_exchange_capacity),
            calcium: self.ca.unwrap_or(defaults.calcium),
            magnesium: self.mg.unwrap_or(defaults.magnesium),
            available_phosphate: self.phosphate.unwrap_or(defaults.available_phosphate),
            electrical_conductivity: self.ec.unwrap_or(defaults.electrical_conductivity),
            potassium: self.k.unwrap_or(defaults.potassium),
            drainage: self.drainage.unwrap_or(defaults.drainage),
        }
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AdvisorConfig::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.data.database = database;
    }
    if let Some(model) = cli.model {
        config.data.model = model;
    }

    let conn = Connection::open(&config.data.database)
        .with_context(|| format!("Failed to open {}", config.data.database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", config.data.database.display());
        }

        Commands::LoadTable { csv, clear } => {
            let stats = table::import_csv(&conn, &csv, clear)?;
            println!("{}", stats);
        }

        Commands::LoadSample => {
            let rows = table::sample_rows();
            table::replace_rows(&conn, &rows, true)?;
            println!("Loaded {} sample prescriptions", rows.len());
        }

        Commands::ListCrops => {
            let rows = db::list_prescriptions(&conn)?;
            if rows.is_empty() {
                println!("No crops in database. Run 'load-table' or 'load-sample' first.");
            } else {
                print!("{}", report::format_table(&rows));
            }
        }

        Commands::Crop { name } => match db::get_prescription(&conn, &name)? {
            Some(a) => {
                println!("Crop: {}", name);
                println!("  Nitrogen (N):     {} kg/10a", a.nitrogen);
                println!("  Phosphate (P2O5): {} kg/10a", a.phosphate);
                println!("  Potash (K2O):     {} kg/10a", a.potash);
            }
            None => println!("Crop '{}' not found", name),
        },

        Commands::ModelInfo => {
            let model = classifier::load_model(&config.data.model)?;
            println!("Model: {}", config.data.model.display());
            println!("  Type: {}", model.describe());
            println!("  Features: {}", model.features.join(", "));
            println!("  Classes: {}", model.classes().join(", "));
        }

        Commands::Recommend { soil, crop } => {
            let model = classifier::load_model(&config.data.model)?;
            let fertilizer = FertilizerTable::load(&conn)?;
            if fertilizer.is_empty() {
                tracing::warn!("fertilizer table is empty; run 'load-table' or 'load-sample'");
            }
            let advisor = Advisor::new(&model, &fertilizer);
            let sample = soil.into_sample(&config.defaults);
            let ok = interactive::recommend_once(
                &advisor,
                &sample,
                crop.as_deref(),
                io::stdout(),
                io::stderr(),
            )?;
            if !ok {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Session => {
            let model = classifier::load_model(&config.data.model)?;
            let fertilizer = FertilizerTable::load(&conn)?;
            let advisor = Advisor::new(&model, &fertilizer);
            interactive::run(
                &advisor,
                config.defaults.clone(),
                io::stdin().lock(),
                io::stdout(),
            )?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
