#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for inspecting and validating Tethys archives.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tethys_cli::{
    RecordKind, dataset_table, describe_key, key_params, parse_geometry, read_record_file,
    validate_bytes,
};
use tethys_geometry::Geometry;
use tethys_identity::{ChunkCoords, IdHasher};
use tethys_keys::{KeyRegistry, Role};
use tethys_storage::{S3Store, TethysClient, load_remote};

#[derive(Parser)]
#[command(name = "tethys", about = "Tethys archive metadata tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive a station id from a point or a GeoJSON geometry
    StationId {
        /// Longitude of a point station
        #[arg(long, requires = "lat", conflicts_with = "geometry")]
        lon: Option<f64>,
        /// Latitude of a point station
        #[arg(long, requires = "lon")]
        lat: Option<f64>,
        /// GeoJSON geometry object (e.g. `{"type":"Point","coordinates":[1,2]}`)
        #[arg(long)]
        geometry: Option<String>,
    },
    /// Derive a dataset id from the eight identity fields
    DatasetId {
        #[arg(long)]
        feature: String,
        #[arg(long)]
        parameter: String,
        #[arg(long)]
        method: String,
        #[arg(long)]
        product_code: String,
        #[arg(long)]
        owner: String,
        #[arg(long)]
        aggregation_statistic: String,
        #[arg(long)]
        frequency_interval: String,
        #[arg(long)]
        utc_offset: String,
    },
    /// Derive a chunk id from chunk coordinates
    ChunkId {
        /// Height in millimetres
        #[arg(long, allow_hyphen_values = true)]
        height: Option<i64>,
        /// Days since 1970-01-01 of the chunk's first day
        #[arg(long, allow_hyphen_values = true)]
        chunk_day: Option<i32>,
        /// Band index
        #[arg(long)]
        band: Option<i64>,
    },
    /// Render or parse object-storage keys
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },
    /// Validate a record file (`.zst` files are decompressed first)
    Validate {
        /// Record type of the file
        #[arg(long, value_enum)]
        kind: RecordKind,
        /// Path to the JSON file
        path: PathBuf,
    },
    /// List the datasets of a remote archive
    Datasets {
        /// TOML file describing the remote
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Render the key of a role
    Render {
        /// Schema version (defaults to the newest)
        #[arg(long)]
        version: Option<u32>,
        /// Object role (e.g. `station`, `results`)
        role: Role,
        /// Placeholder values as `name=value`
        params: Vec<String>,
    },
    /// Recover the version, role and parameters of a key
    Parse {
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::StationId { lon, lat, geometry } => {
            let geometry = match (lon, lat, geometry) {
                (Some(lon), Some(lat), _) => Geometry::point(lon, lat),
                (_, _, Some(text)) => parse_geometry(&text)?,
                _ => return Err("pass --lon and --lat, or --geometry".into()),
            };
            println!("{}", tethys_identity::station_id(&geometry)?);
        }
        Commands::DatasetId {
            feature,
            parameter,
            method,
            product_code,
            owner,
            aggregation_statistic,
            frequency_interval,
            utc_offset,
        } => {
            let id = tethys_identity::dataset_id([
                feature.as_str(),
                parameter.as_str(),
                method.as_str(),
                product_code.as_str(),
                owner.as_str(),
                aggregation_statistic.as_str(),
                frequency_interval.as_str(),
                utc_offset.as_str(),
            ])?;
            println!("{id}");
        }
        Commands::ChunkId {
            height,
            chunk_day,
            band,
        } => {
            let coords = ChunkCoords {
                height,
                chunk_day,
                band,
            };
            println!("{}", IdHasher::default().chunk_id(&coords)?);
        }
        Commands::Key { command } => {
            let registry = KeyRegistry::builtin();
            match command {
                KeyCommands::Render {
                    version,
                    role,
                    params,
                } => {
                    let version = version
                        .or_else(|| registry.latest_version())
                        .ok_or("no layouts registered")?;
                    let params = key_params(params.iter().map(String::as_str))?;
                    println!("{}", registry.render(version, role, &params)?);
                }
                KeyCommands::Parse { key } => {
                    print!("{}", describe_key(&registry.parse(&key)?));
                }
            }
        }
        Commands::Validate { kind, path } => {
            let bytes = read_record_file(&path)?;
            match validate_bytes(kind, &bytes) {
                Ok(count) => println!("{}: {count} valid record(s)", path.display()),
                Err(e) => {
                    log::error!("{} is invalid", path.display());
                    return Err(e.into());
                }
            }
        }
        Commands::Datasets { config } => {
            let remote = load_remote(&config)?;
            log::info!("Reading datasets of bucket {}", remote.bucket);
            let store = S3Store::from_remote(&remote)?;
            let client = TethysClient::new(store, remote.version)?;
            let datasets = client.get_datasets().await?;
            for row in dataset_table(&datasets) {
                println!("{row}");
            }
        }
    }

    Ok(())
}
