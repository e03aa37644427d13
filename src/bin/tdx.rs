//! Query front-end for a terradex artifact directory.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};

use terradex::metadata;
use terradex::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "tdx", version, about = "Query a terradex artifact directory")]
struct Cli {
    /// Artifact directory; defaults to $TERRADEX_DATA_DIR
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the instruments found in the artifact directory
    Instruments,

    /// Print metadata records matching all conditions, as JSON
    Query {
        instrument: String,
        /// A condition like 'corner1_latitude>-0.5' (repeatable)
        #[arg(short = 'w', long = "where")]
        conditions: Vec<String>,
    },

    /// Print metadata records of the given observation ids, as JSON
    ById {
        instrument: String,
        observation_ids: Vec<String>,
    },

    /// Print ids of observations covering a point, one per line
    Latlon {
        instrument: String,
        lat: f64,
        lon: f64,
        /// Query tolerance in meters
        #[arg(default_value_t = 0.)]
        radius: f64,
    },

    /// Print ids of observations of another instrument overlapping the
    /// given observation
    Overlap {
        instrument: String,
        observation_id: String,
        other_instrument: String,
    },
}

// 'column<=value' with the value typed by what it parses as
fn parse_condition(text: &str) -> Result<Predicate> {
    for op in ["<=", ">=", "=", "<", ">"] {
        if let Some((column, value)) = text.split_once(op) {
            return Ok(Predicate::new(column.trim(), op, parse_value(value.trim()))?);
        }
    }
    bail!("no comparator in condition '{text}'");
}

fn parse_value(text: &str) -> Value {
    if let Ok(number) = text.parse::<i64>() {
        return Value::Int(number);
    }
    if let Ok(number) = text.parse::<f64>() {
        return Value::Real(number);
    }
    if let Ok(timestamp) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Value::Timestamp(timestamp);
    }
    Value::Text(text.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    let catalog = Catalog::open(cli.data_dir.as_deref()).context("opening the catalog")?;

    match cli.command {
        Command::Instruments => {
            for instrument in catalog.instruments() {
                println!("{instrument}");
            }
        }

        Command::Query {
            instrument,
            conditions,
        } => {
            let predicates = conditions
                .iter()
                .map(|text| parse_condition(text))
                .collect::<Result<Vec<_>>>()?;
            let records = catalog.query(&instrument, &predicates)?;
            println!("{}", metadata::to_json(&records)?);
        }

        Command::ById {
            instrument,
            observation_ids,
        } => {
            let ids: Vec<&str> = observation_ids.iter().map(String::as_str).collect();
            let records = catalog.query_by_observation_id(&instrument, &ids)?;
            println!("{}", metadata::to_json(&records)?);
        }

        Command::Latlon {
            instrument,
            lat,
            lon,
            radius,
        } => {
            for id in catalog.find_observations_of_latlon(&instrument, lat, lon, radius)? {
                println!("{id}");
            }
        }

        Command::Overlap {
            instrument,
            observation_id,
            other_instrument,
        } => {
            let ids = catalog.find_overlapping_observations(
                &instrument,
                &observation_id,
                &other_instrument,
            )?;
            for id in ids {
                println!("{id}");
            }
        }
    }

    Ok(())
}
