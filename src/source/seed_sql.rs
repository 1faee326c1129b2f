//! Reader for the SQL seed batches the dataset ships as:
//!
//! ```sql
//! INSERT INTO sailing_venues (id, name, coordinates_lat, ...)
//! VALUES ('osm-node-4903043121', 'Marina Tarará', 23.177492, ...)
//! ON CONFLICT (id) DO UPDATE SET coordinates_lat = EXCLUDED.coordinates_lat, ...;
//! ```
//!
//! Only the column list and the value tuples are read. The conflict clause is
//! skipped; the loader applies its own.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use super::SourceError;
use crate::entities::venue::TABLE_NAME;
use crate::venue::VenueDraft;

fn insert_header() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| {
        Regex::new(r#"(?is)^INSERT\s+INTO\s+(?:"?\w+"?\.)?"?(\w+)"?\s*\(([^)]*)\)\s*VALUES\s*"#)
            .expect("insert header pattern is valid")
    })
}

#[derive(Clone, Debug, PartialEq)]
enum SqlValue {
    Text(String),
    /// Raw lexeme, so large ids keep every digit.
    Number(String),
    Bool(bool),
    Null,
}

struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Scanner { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    /// 1-based line of a byte offset. Only called when reporting, it scans
    /// from the start of the text.
    fn line_at(&self, offset: usize) -> usize {
        self.text[..offset].bytes().filter(|b| *b == b'\n').count() + 1
    }

    fn line(&self) -> usize {
        self.line_at(self.pos)
    }

    fn error(&self, message: impl Into<String>) -> SourceError {
        SourceError::Syntax { line: self.line(), message: message.into() }
    }

    /// Skips whitespace, `--` and `/* */` comments.
    fn skip_trivia(&mut self) -> Result<(), SourceError> {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();

            if trimmed.starts_with("--") {
                self.pos += trimmed.find('\n').unwrap_or(trimmed.len());
            } else if trimmed.starts_with("/*") {
                match trimmed.find("*/") {
                    Some(end) => self.pos += end + 2,
                    None => return Err(self.error("unterminated block comment")),
                }
            } else {
                return Ok(());
            }
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), SourceError> {
        self.skip_trivia()?;
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected `{}`", byte as char)))
        }
    }

    /// Advances past the next `;` outside string literals, or to the end.
    fn skip_statement(&mut self) -> Result<(), SourceError> {
        while let Some(byte) = self.peek() {
            match byte {
                b'\'' => {
                    self.string()?;
                }
                b'-' | b'/' if self.rest().starts_with("--") || self.rest().starts_with("/*") => {
                    self.skip_trivia()?;
                }
                b';' => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => self.pos += 1,
            }
        }
        Ok(())
    }

    fn string(&mut self) -> Result<String, SourceError> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();

        loop {
            let rest = self.rest();
            let Some(quote) = rest.find('\'') else {
                return Err(SourceError::Syntax { line: self.line_at(start), message: "unterminated string literal".into() });
            };
            out.push_str(&rest[..quote]);
            self.pos += quote + 1;

            if self.peek() == Some(b'\'') {
                out.push('\'');
                self.pos += 1;
            } else {
                return Ok(out);
            }
        }
    }

    fn value(&mut self) -> Result<SqlValue, SourceError> {
        self.skip_trivia()?;

        match self.peek() {
            Some(b'\'') => self.string().map(SqlValue::Text),
            Some(b) if b == b'-' || b == b'+' || b == b'.' || b.is_ascii_digit() => {
                let rest = self.rest();
                let len = rest
                    .bytes()
                    .position(|b| !(b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E')))
                    .unwrap_or(rest.len());
                self.pos += len;
                Ok(SqlValue::Number(rest[..len].to_string()))
            }
            Some(b) if b.is_ascii_alphabetic() => {
                let rest = self.rest();
                let len = rest
                    .bytes()
                    .position(|b| !b.is_ascii_alphanumeric() && b != b'_')
                    .unwrap_or(rest.len());
                let word = &rest[..len];
                let value = match word.to_ascii_uppercase().as_str() {
                    "TRUE" => SqlValue::Bool(true),
                    "FALSE" => SqlValue::Bool(false),
                    "NULL" => SqlValue::Null,
                    _ => return Err(self.error(format!("unsupported literal `{word}`"))),
                };
                self.pos += len;
                Ok(value)
            }
            Some(b) => Err(self.error(format!("unexpected `{}`", b as char))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn tuple(&mut self, arity: usize) -> Result<Vec<SqlValue>, SourceError> {
        self.expect(b'(')?;
        let mut values = Vec::with_capacity(arity);

        loop {
            values.push(self.value()?);
            self.skip_trivia()?;
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b')') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.error("expected `,` or `)` in value list")),
            }
        }

        if values.len() != arity {
            return Err(self.error(format!("{} values for {} columns", values.len(), arity)));
        }

        Ok(values)
    }
}

/// Parses a whole batch file into drafts, one per value tuple.
pub fn parse_seed(text: &str) -> Result<Vec<VenueDraft>, SourceError> {
    let mut scanner = Scanner::new(text);
    let mut drafts = vec![];

    loop {
        scanner.skip_trivia()?;
        if scanner.peek().is_none() {
            break;
        }

        let start = scanner.pos;
        let Some(header) = insert_header().captures(scanner.rest()) else {
            scanner.skip_statement()?;
            debug!(line = scanner.line_at(start), "skipping non-insert statement");
            continue;
        };

        let table = header[1].to_string();
        let columns: Vec<String> = header[2]
            .split(',')
            .map(|c| c.trim().trim_matches('"').to_ascii_lowercase())
            .collect();
        scanner.pos += header[0].len();

        if !table.eq_ignore_ascii_case(TABLE_NAME) {
            warn!(line = scanner.line_at(start), %table, "skipping insert into unexpected table");
            scanner.skip_statement()?;
            continue;
        }

        loop {
            let values = scanner.tuple(columns.len())?;
            drafts.push(draft_from_row(&columns, values));

            scanner.skip_trivia()?;
            if scanner.peek() == Some(b',') {
                scanner.pos += 1;
            } else {
                break;
            }
        }

        // Whatever follows (ON CONFLICT ..., RETURNING ...) up to `;`.
        scanner.skip_statement()?;
    }

    Ok(drafts)
}

fn draft_from_row(columns: &[String], values: Vec<SqlValue>) -> VenueDraft {
    let mut draft = VenueDraft::default();

    for (column, value) in columns.iter().zip(values) {
        match column.as_str() {
            "id" => draft.id = text(value, "id", &mut draft.type_error),
            "name" => draft.name = text(value, "name", &mut draft.type_error),
            "coordinates_lat" => draft.coordinates_lat = float(value, "coordinates_lat", &mut draft.type_error),
            "coordinates_lng" => draft.coordinates_lng = float(value, "coordinates_lng", &mut draft.type_error),
            "country" => draft.country = text(value, "country", &mut draft.type_error),
            "region" => draft.region = text(value, "region", &mut draft.type_error),
            "venue_type" => draft.venue_type = text(value, "venue_type", &mut draft.type_error),
            "time_zone" => draft.time_zone = text(value, "time_zone", &mut draft.type_error),
            "data_quality" => draft.data_quality = text(value, "data_quality", &mut draft.type_error),
            "osm_id" => draft.osm_id = text(value, "osm_id", &mut draft.type_error),
            "osm_type" => draft.osm_type = text(value, "osm_type", &mut draft.type_error),
            "data_source" => draft.data_source = text(value, "data_source", &mut draft.type_error),
            "verified" => draft.verified = boolean(value, "verified", &mut draft.type_error),
            other => debug!(column = other, "ignoring unknown column"),
        }
    }

    draft
}

fn flag(type_error: &mut Option<&'static str>, field: &'static str) {
    type_error.get_or_insert(field);
}

fn text(value: SqlValue, field: &'static str, type_error: &mut Option<&'static str>) -> Option<String> {
    match value {
        SqlValue::Text(s) | SqlValue::Number(s) => Some(s),
        SqlValue::Null => None,
        SqlValue::Bool(_) => {
            flag(type_error, field);
            None
        }
    }
}

fn float(value: SqlValue, field: &'static str, type_error: &mut Option<&'static str>) -> Option<f64> {
    match value {
        SqlValue::Number(s) | SqlValue::Text(s) => match s.trim().parse() {
            Ok(v) => Some(v),
            Err(_) => {
                flag(type_error, field);
                None
            }
        },
        SqlValue::Null => None,
        SqlValue::Bool(_) => {
            flag(type_error, field);
            None
        }
    }
}

fn boolean(value: SqlValue, field: &'static str, type_error: &mut Option<&'static str>) -> Option<bool> {
    match value {
        SqlValue::Bool(b) => Some(b),
        SqlValue::Number(s) if s == "0" => Some(false),
        SqlValue::Number(s) if s == "1" => Some(true),
        SqlValue::Null => None,
        _ => {
            flag(type_error, field);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BATCH: &str = r#"-- Batch 1 of 4
INSERT INTO sailing_venues (id, name, coordinates_lat, coordinates_lng, country, region, venue_type, time_zone, data_quality, osm_id, osm_type, data_source, verified)
VALUES ('osm-node-4903043121', 'Marina Tarará', 23.177492, -82.2121141, 'Unknown', 'Unknown', 'regional', 'UTC', 'osm', '4903043121', 'node', 'osm', false)
ON CONFLICT (id) DO UPDATE SET coordinates_lat = EXCLUDED.coordinates_lat, coordinates_lng = EXCLUDED.coordinates_lng;
INSERT INTO sailing_venues (id, name, coordinates_lat, coordinates_lng, country, region, venue_type, time_zone, data_quality, osm_id, osm_type, data_source, verified)
VALUES ('osm-relation-539354', 'Cap Sante Marina; Anacortes', 48.5132677, -122.6061523, 'Unknown', 'Unknown', 'regional', 'UTC', 'osm', '539354', 'relation', 'osm', false)
ON CONFLICT (id) DO UPDATE SET coordinates_lat = EXCLUDED.coordinates_lat, coordinates_lng = EXCLUDED.coordinates_lng;

-- Import complete: 5000 marinas
-- Remaining: 15444 marinas
"#;

    #[test]
    fn parses_batch_statements() {
        let drafts = parse_seed(BATCH).unwrap();
        assert_eq!(drafts.len(), 2);

        let first = &drafts[0];
        assert_eq!(first.id.as_deref(), Some("osm-node-4903043121"));
        assert_eq!(first.name.as_deref(), Some("Marina Tarará"));
        assert_eq!(first.coordinates_lat, Some(23.177492));
        assert_eq!(first.coordinates_lng, Some(-82.2121141));
        assert_eq!(first.verified, Some(false));
        assert_eq!(first.type_error, None);

        assert_eq!(drafts[1].name.as_deref(), Some("Cap Sante Marina; Anacortes"));
        assert!(drafts[1].clone().validate().is_ok());
    }

    #[test]
    fn unescapes_apostrophes() {
        let sql = "INSERT INTO sailing_venues (id, name) VALUES ('osm-way-1', 'Skipper''s Landing');";
        let drafts = parse_seed(sql).unwrap();
        assert_eq!(drafts[0].name.as_deref(), Some("Skipper's Landing"));
    }

    #[test]
    fn reads_multi_row_values_and_skips_other_statements() {
        let sql = "BEGIN;\n\
            insert into public.sailing_venues (id, osm_id, verified) values ('osm-way-1359451849', 1359451849, TRUE), ('osm-way-1359713055', '1359713055', 0);\n\
            INSERT INTO harbours (id) VALUES ('x; y');\n\
            COMMIT;";
        let drafts = parse_seed(sql).unwrap();

        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].osm_id.as_deref(), Some("1359451849"));
        assert_eq!(drafts[0].verified, Some(true));
        assert_eq!(drafts[1].id.as_deref(), Some("osm-way-1359713055"));
        assert_eq!(drafts[1].verified, Some(false));
    }

    #[test]
    fn flags_wrong_types() {
        let sql = "INSERT INTO sailing_venues (id, coordinates_lat) VALUES ('osm-node-1', 'north');";
        let drafts = parse_seed(sql).unwrap();
        assert_eq!(drafts[0].type_error, Some("coordinates_lat"));
        assert_eq!(drafts[0].coordinates_lat, None);
    }

    #[test]
    fn reports_arity_mismatch_with_line() {
        let sql = "-- header\n\nINSERT INTO sailing_venues (id, name) VALUES ('osm-node-1');";
        match parse_seed(sql) {
            Err(SourceError::Syntax { line, message }) => {
                assert_eq!(line, 3);
                assert!(message.contains("1 values for 2 columns"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_a_full_size_batch_in_linear_time() {
        let mut sql = String::from("-- Batch 7\n");
        for i in 0..6000u64 {
            sql.push_str(&format!(
                "INSERT INTO sailing_venues (id, name, coordinates_lat, coordinates_lng, country, region, venue_type, time_zone, data_quality, osm_id, osm_type, data_source, verified)\n\
                 VALUES ('osm-node-{i}', 'Marina {i}', 12.5, -45.25, 'Unknown', 'Unknown', 'regional', 'UTC', 'osm', '{i}', 'node', 'osm', false)\n\
                 ON CONFLICT (id) DO UPDATE SET coordinates_lat = EXCLUDED.coordinates_lat, coordinates_lng = EXCLUDED.coordinates_lng;\n"
            ));
        }
        sql.push_str("-- Import complete: 6000 marinas\n");

        let started = std::time::Instant::now();
        let drafts = parse_seed(&sql).unwrap();

        assert_eq!(drafts.len(), 6000);
        assert_eq!(drafts[5999].id.as_deref(), Some("osm-node-5999"));
        assert!(started.elapsed() < std::time::Duration::from_secs(5), "took {:?}", started.elapsed());
    }

    #[test]
    fn reports_line_of_unterminated_string_after_many_rows() {
        let mut sql = String::new();
        for i in 0..50 {
            sql.push_str(&format!("INSERT INTO sailing_venues (id) VALUES ('osm-node-{i}');\n"));
        }
        sql.push_str("INSERT INTO sailing_venues (id) VALUES ('osm-node-50);\n");

        assert!(matches!(parse_seed(&sql), Err(SourceError::Syntax { line: 51, .. })));
    }

    #[test]
    fn reports_unterminated_string() {
        let sql = "INSERT INTO sailing_venues (id) VALUES ('osm-node-1);";
        assert!(matches!(parse_seed(sql), Err(SourceError::Syntax { line: 1, .. })));
    }
}
