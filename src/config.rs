use std::path::PathBuf;

use clap::{arg, value_parser, ArgMatches, Command};
use sea_orm::Iterable;

use crate::entities::venue;
use crate::error::LoadError;
use crate::source::Format;

pub const DEFAULT_DB_URI: &str = "sqlite://venues.db?mode=rwc";

/// Bind parameters PostgreSQL accepts in one statement.
const MAX_BIND_PARAMS: usize = 65535;

/// Largest batch whose multi-row INSERT stays within the bind limit.
pub fn max_batch_size() -> usize {
    MAX_BIND_PARAMS / venue::Column::iter().count()
}

pub fn cli() -> Command {
    Command::new("sailing-venue-loader")
        .about("Loads OSM-derived sailing venues (marinas, yacht clubs, harbours, slipways) into the sailing_venues table.\nReads SQL seed batches or OSM XML extracts; with no INPUT, reads stdin.\nRe-loading a venue only refreshes its coordinates.")
        .arg(arg!(--db <DATABASE_URI>).env("DATABASE_URL").default_value(DEFAULT_DB_URI))
        .arg(arg!(--format <FORMAT> "auto, sql or osm").default_value("auto").value_parser(value_parser!(Format)))
        .arg(arg!(--"batch-size" <N> "rows per INSERT statement").env("VENUE_BATCH_SIZE").default_value("500").value_parser(value_parser!(usize)))
        .arg(arg!(--workers <N> "concurrent writer tasks").env("VENUE_WORKERS").default_value("4").value_parser(value_parser!(usize)))
        .arg(arg!(--"max-retries" <N> "retries for transient connection failures").default_value("5").value_parser(value_parser!(u32)))
        .arg(arg!(--fresh "drop and recreate the table before loading"))
        .arg(arg!([INPUT] ... "seed .sql or .osm files").value_parser(value_parser!(PathBuf)))
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoaderConfig {
    pub db_uri: String,
    pub format: Format,
    pub batch_size: usize,
    pub workers: usize,
    pub max_retries: u32,
    pub fresh: bool,
    pub inputs: Vec<PathBuf>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            db_uri: DEFAULT_DB_URI.to_string(),
            format: Format::Auto,
            batch_size: 500,
            workers: 4,
            max_retries: 5,
            fresh: false,
            inputs: vec![],
        }
    }
}

impl LoaderConfig {
    pub fn from_matches(matches: &ArgMatches) -> Result<LoaderConfig, LoadError> {
        let config = LoaderConfig {
            db_uri: matches.get_one::<String>("db").cloned().unwrap_or_else(|| DEFAULT_DB_URI.to_string()),
            format: matches.get_one::<Format>("format").copied().unwrap_or(Format::Auto),
            batch_size: matches.get_one::<usize>("batch-size").copied().unwrap_or(500),
            workers: matches.get_one::<usize>("workers").copied().unwrap_or(4),
            max_retries: matches.get_one::<u32>("max-retries").copied().unwrap_or(5),
            fresh: matches.get_flag("fresh"),
            inputs: matches.get_many::<PathBuf>("INPUT").map(|paths| paths.cloned().collect()).unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        if self.batch_size == 0 {
            return Err(LoadError::Config("batch size must be at least 1".into()));
        }
        if self.batch_size > max_batch_size() {
            return Err(LoadError::Config(format!(
                "batch size {} exceeds {} rows per statement",
                self.batch_size,
                max_batch_size()
            )));
        }
        if self.workers == 0 {
            return Err(LoadError::Config("at least one writer is required".into()));
        }
        Ok(())
    }
}
