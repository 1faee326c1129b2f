//! Readers turning input files into [`VenueDraft`]s.

use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::venue::VenueDraft;

pub mod osm_xml;
pub mod seed_sql;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("xml error: {0}")]
    Xml(#[from] xml::reader::Error),
    #[error("cannot infer input format of {0}, pass --format")]
    UnknownFormat(String),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Format {
    Auto,
    Sql,
    Osm,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Format::Auto),
            "sql" => Ok(Format::Sql),
            "osm" | "xml" => Ok(Format::Osm),
            other => Err(format!("unknown format `{other}`")),
        }
    }
}

impl Format {
    /// Resolves `Auto` against a file name. Stdin (`None`) defaults to SQL.
    pub fn resolve(self, path: Option<&Path>) -> Result<Format, SourceError> {
        if self != Format::Auto {
            return Ok(self);
        }

        let Some(path) = path else {
            return Ok(Format::Sql);
        };

        match path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("sql") => Ok(Format::Sql),
            Some("osm") | Some("xml") => Ok(Format::Osm),
            _ => Err(SourceError::UnknownFormat(path.display().to_string())),
        }
    }
}

/// Reads every draft from `input` in the given (resolved) format.
pub fn read_drafts<R: Read>(input: R, format: Format) -> Result<Vec<VenueDraft>, SourceError> {
    match format {
        Format::Osm => osm_xml::read_venues(io::BufReader::new(input)),
        Format::Sql | Format::Auto => {
            let mut text = String::new();
            io::BufReader::new(input).read_to_string(&mut text)?;
            seed_sql::parse_seed(&text)
        }
    }
}
