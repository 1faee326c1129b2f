//! Idempotent loader for OSM-derived sailing venues.
//!
//! Venues are keyed by `osm-<node|way|relation>-<osm_id>`. A venue seen for
//! the first time is inserted verbatim; a venue already in the store only has
//! its coordinates refreshed.

pub mod batch_insert;
pub mod config;
pub mod entities;
pub mod error;
pub mod loader;
pub mod migrator;
pub mod source;
pub mod venue;

pub use config::LoaderConfig;
pub use error::LoadError;
pub use loader::{build_db, LoadReport, Loader, Rejection};
pub use venue::{OsmType, Venue, VenueDraft, VenueError};
