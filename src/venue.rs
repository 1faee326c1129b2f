//! Venue records as they arrive from a source, and the checks a record must
//! pass before it is handed to the store.

use std::fmt;
use std::str::FromStr;

use sea_orm::ActiveValue;
use thiserror::Error;

use crate::entities::venue;

pub const UNKNOWN: &str = "Unknown";
pub const DEFAULT_VENUE_TYPE: &str = "regional";
pub const DEFAULT_TIME_ZONE: &str = "UTC";
pub const OSM_PROVENANCE: &str = "osm";

/// OSM element kind, see https://wiki.openstreetmap.org/wiki/Elements
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OsmType {
    Node,
    Way,
    Relation,
}

impl OsmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsmType::Node => "node",
            OsmType::Way => "way",
            OsmType::Relation => "relation",
        }
    }
}

impl fmt::Display for OsmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OsmType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(OsmType::Node),
            "way" => Ok(OsmType::Way),
            "relation" => Ok(OsmType::Relation),
            _ => Err(()),
        }
    }
}

/// Builds the `osm-<type>-<osm_id>` key.
pub fn venue_id(osm_type: OsmType, osm_id: &str) -> String {
    format!("osm-{osm_type}-{osm_id}")
}

/// Splits `osm-<type>-<osm_id>` into its parts. The numeric segment must be
/// all ASCII digits.
pub fn parse_venue_id(id: &str) -> Option<(OsmType, &str)> {
    let rest = id.strip_prefix("osm-")?;
    let (kind, osm_id) = rest.split_once('-')?;
    let kind = kind.parse().ok()?;

    if osm_id.is_empty() || !osm_id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    Some((kind, osm_id))
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VenueError {
    #[error("venue {}: missing required field `{field}`", display_id(.id))]
    MissingField {
        id: Option<String>,
        field: &'static str,
    },
    #[error("venue {id}: latitude {lat} outside [-90, 90]")]
    LatitudeOutOfRange { id: String, lat: f64 },
    #[error("venue {id}: longitude {lng} outside [-180, 180]")]
    LongitudeOutOfRange { id: String, lng: f64 },
    #[error("venue {id}: id is not of the form osm-<node|way|relation>-<digits>")]
    MalformedId { id: String },
    #[error("venue {id}: unknown osm_type `{value}`")]
    UnknownOsmType { id: String, value: String },
    #[error("venue {id}: id does not match osm_type `{osm_type}` / osm_id `{osm_id}`")]
    IdMismatch {
        id: String,
        osm_type: String,
        osm_id: String,
    },
    #[error("venue {id}: field `{field}` has the wrong type")]
    WrongType { id: String, field: &'static str },
}

fn display_id(id: &Option<String>) -> &str {
    id.as_deref().unwrap_or("<no id>")
}

impl VenueError {
    /// Id of the offending record, when the record had one.
    pub fn id(&self) -> Option<&str> {
        match self {
            VenueError::MissingField { id, .. } => id.as_deref(),
            VenueError::LatitudeOutOfRange { id, .. }
            | VenueError::LongitudeOutOfRange { id, .. }
            | VenueError::MalformedId { id }
            | VenueError::UnknownOsmType { id, .. }
            | VenueError::IdMismatch { id, .. }
            | VenueError::WrongType { id, .. } => Some(id),
        }
    }
}

/// A record as read from a source: every field optional until validated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VenueDraft {
    pub id: Option<String>,
    pub name: Option<String>,
    pub coordinates_lat: Option<f64>,
    pub coordinates_lng: Option<f64>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub venue_type: Option<String>,
    pub time_zone: Option<String>,
    pub data_quality: Option<String>,
    pub osm_id: Option<String>,
    pub osm_type: Option<String>,
    pub data_source: Option<String>,
    pub verified: Option<bool>,
    /// Set by sources that saw a value they could not coerce.
    pub type_error: Option<&'static str>,
}

/// A validated venue.
#[derive(Clone, Debug, PartialEq)]
pub struct Venue {
    pub id: String,
    pub name: String,
    pub coordinates_lat: f64,
    pub coordinates_lng: f64,
    pub country: String,
    pub region: String,
    pub venue_type: String,
    pub time_zone: String,
    pub data_quality: String,
    pub osm_id: String,
    pub osm_type: OsmType,
    pub data_source: String,
    pub verified: bool,
}

impl VenueDraft {
    pub fn validate(self) -> Result<Venue, VenueError> {
        let id = self.id.ok_or(VenueError::MissingField { id: None, field: "id" })?;

        if let Some(field) = self.type_error {
            return Err(VenueError::WrongType { id, field });
        }

        // Draft fields are named after their `sailing_venues` columns, so the
        // field name doubles as the column name in the error.
        macro_rules! required {
            ($field:ident) => {
                match self.$field {
                    Some(value) => value,
                    None => {
                        return Err(VenueError::MissingField {
                            id: Some(id),
                            field: stringify!($field),
                        })
                    }
                }
            };
        }

        let name = required!(name);
        let coordinates_lat = required!(coordinates_lat);
        let coordinates_lng = required!(coordinates_lng);
        let country = required!(country);
        let region = required!(region);
        let venue_type = required!(venue_type);
        let time_zone = required!(time_zone);
        let data_quality = required!(data_quality);
        let osm_id = required!(osm_id);
        let osm_type = required!(osm_type);
        let data_source = required!(data_source);
        let verified = required!(verified);

        // NaN fails both range checks.
        if !(-90.0..=90.0).contains(&coordinates_lat) {
            return Err(VenueError::LatitudeOutOfRange { id, lat: coordinates_lat });
        }
        if !(-180.0..=180.0).contains(&coordinates_lng) {
            return Err(VenueError::LongitudeOutOfRange { id, lng: coordinates_lng });
        }

        let Some((id_type, id_osm_id)) = parse_venue_id(&id) else {
            return Err(VenueError::MalformedId { id });
        };
        let Ok(kind) = osm_type.parse::<OsmType>() else {
            return Err(VenueError::UnknownOsmType { id, value: osm_type });
        };
        if id_type != kind || id_osm_id != osm_id {
            return Err(VenueError::IdMismatch { id, osm_type, osm_id });
        }

        Ok(Venue {
            id,
            name,
            coordinates_lat,
            coordinates_lng,
            country,
            region,
            venue_type,
            time_zone,
            data_quality,
            osm_id,
            osm_type: kind,
            data_source,
            verified,
        })
    }
}

impl From<Venue> for venue::ActiveModel {
    fn from(v: Venue) -> Self {
        venue::ActiveModel {
            id: ActiveValue::Set(v.id),
            name: ActiveValue::Set(v.name),
            coordinates_lat: ActiveValue::Set(v.coordinates_lat),
            coordinates_lng: ActiveValue::Set(v.coordinates_lng),
            country: ActiveValue::Set(v.country),
            region: ActiveValue::Set(v.region),
            venue_type: ActiveValue::Set(v.venue_type),
            time_zone: ActiveValue::Set(v.time_zone),
            data_quality: ActiveValue::Set(v.data_quality),
            osm_id: ActiveValue::Set(v.osm_id),
            osm_type: ActiveValue::Set(v.osm_type.as_str().to_string()),
            data_source: ActiveValue::Set(v.data_source),
            verified: ActiveValue::Set(v.verified),
        }
    }
}
