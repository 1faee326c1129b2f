//! Reader for OSM XML extracts, including Overpass `out center` output where
//! ways and relations carry a `<center lat=".." lon=".."/>` child.

use std::collections::HashMap;
use std::io::BufRead;

use tracing::debug;
use xml::attribute::OwnedAttribute;
use xml::reader::{EventReader, XmlEvent};

use super::SourceError;
use crate::venue::{
    venue_id, OsmType, VenueDraft, DEFAULT_TIME_ZONE, DEFAULT_VENUE_TYPE, OSM_PROVENANCE, UNKNOWN,
};

fn find_attr<'a>(name: &str, attributes: &'a [OwnedAttribute]) -> Option<&'a str> {
    attributes.iter()
        .find(|attr| attr.name.local_name == name)
        .map(|attr| attr.value.as_str())
}

/// See https://wiki.openstreetmap.org/wiki/Key:leisure and
/// https://wiki.openstreetmap.org/wiki/Key:harbour
pub fn is_sailing_venue(tags: &HashMap<String, String>) -> bool {
    let tag = |k: &str| tags.get(k).map(String::as_str);

    matches!(tag("leisure"), Some("marina" | "slipway" | "sailing_club"))
        || matches!(tag("harbour"), Some(v) if v != "no")
        || matches!(tag("seamark:type"), Some("harbour" | "marina"))
        || tag("club") == Some("sailing")
        || tag("sport") == Some("sailing")
}

struct Element {
    kind: OsmType,
    id: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    tags: HashMap<String, String>,
}

impl Element {
    fn start(kind: OsmType, attributes: &[OwnedAttribute]) -> Element {
        Element {
            kind,
            id: find_attr("id", attributes).map(str::to_string),
            lat: find_attr("lat", attributes).and_then(|v| v.parse().ok()),
            lon: find_attr("lon", attributes).and_then(|v| v.parse().ok()),
            tags: HashMap::new(),
        }
    }

    fn into_draft(mut self) -> Option<VenueDraft> {
        let kind = self.kind;
        let osm_id = self.id?;

        if !is_sailing_venue(&self.tags) {
            return None;
        }

        let (Some(lat), Some(lon)) = (self.lat, self.lon) else {
            debug!(osm_type = %kind, %osm_id, "skipping venue without coordinates");
            return None;
        };
        let Some(name) = self.tags.remove("name") else {
            debug!(osm_type = %kind, %osm_id, "skipping unnamed venue");
            return None;
        };

        Some(VenueDraft {
            id: Some(venue_id(kind, &osm_id)),
            name: Some(name),
            coordinates_lat: Some(lat),
            coordinates_lng: Some(lon),
            country: Some(self.tags.remove("addr:country").unwrap_or_else(|| UNKNOWN.to_string())),
            region: Some(self.tags.remove("addr:state").unwrap_or_else(|| UNKNOWN.to_string())),
            venue_type: Some(DEFAULT_VENUE_TYPE.to_string()),
            time_zone: Some(DEFAULT_TIME_ZONE.to_string()),
            data_quality: Some(OSM_PROVENANCE.to_string()),
            osm_id: Some(osm_id),
            osm_type: Some(kind.as_str().to_string()),
            data_source: Some(OSM_PROVENANCE.to_string()),
            verified: Some(false),
            type_error: None,
        })
    }
}

fn element_kind(name: &str) -> Option<OsmType> {
    match name {
        "node" => Some(OsmType::Node),
        "way" => Some(OsmType::Way),
        "relation" => Some(OsmType::Relation),
        _ => None,
    }
}

/// Streams the document and returns a draft for every tagged sailing venue.
pub fn read_venues<R: BufRead>(input: R) -> Result<Vec<VenueDraft>, SourceError> {
    let parser = EventReader::new(input);
    let mut current: Option<Element> = None;
    let mut drafts = vec![];

    for e in parser {
        match e? {
            XmlEvent::StartElement { name, attributes, .. } => {
                let local = name.local_name.as_str();

                match current.as_mut() {
                    None => {
                        if let Some(kind) = element_kind(local) {
                            current = Some(Element::start(kind, &attributes));
                        }
                    }
                    Some(element) => match local {
                        "center" => {
                            element.lat = find_attr("lat", &attributes).and_then(|v| v.parse().ok());
                            element.lon = find_attr("lon", &attributes).and_then(|v| v.parse().ok());
                        }
                        "tag" => {
                            if let (Some(k), Some(v)) = (find_attr("k", &attributes), find_attr("v", &attributes)) {
                                element.tags.insert(k.to_string(), v.to_string());
                            }
                        }
                        _ => {}
                    },
                }
            }
            XmlEvent::EndElement { name } => {
                let closes_current = current
                    .as_ref()
                    .map(|element| element.kind)
                    .is_some_and(|kind| kind.as_str() == name.local_name);

                if closes_current {
                    if let Some(draft) = current.take().and_then(Element::into_draft) {
                        drafts.push(draft);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(drafts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTRACT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="Overpass API">
  <node id="4903043121" lat="23.177492" lon="-82.2121141">
    <tag k="leisure" v="marina"/>
    <tag k="name" v="Marina Tarará"/>
    <tag k="addr:country" v="CU"/>
  </node>
  <node id="42" lat="10.0" lon="10.0">
    <tag k="amenity" v="cafe"/>
    <tag k="name" v="Dockside Coffee"/>
  </node>
  <node id="43" lat="10.0" lon="10.0">
    <tag k="leisure" v="slipway"/>
  </node>
  <way id="1359451849">
    <center lat="51.5" lon="-0.12"/>
    <nd ref="1"/>
    <nd ref="2"/>
    <tag k="club" v="sailing"/>
    <tag k="name" v="Royal Thames &amp; District Yacht Club"/>
    <tag k="addr:state" v="England"/>
  </way>
  <way id="77">
    <nd ref="1"/>
    <tag k="leisure" v="marina"/>
    <tag k="name" v="No Center Marina"/>
  </way>
  <relation id="539354">
    <member type="way" ref="1" role="outer"/>
    <center lat="48.5132677" lon="-122.6061523"/>
    <tag k="harbour" v="yes"/>
    <tag k="name" v="Cap Sante Marina"/>
  </relation>
</osm>"#;

    #[test]
    fn extracts_named_sailing_venues() {
        let drafts = read_venues(EXTRACT.as_bytes()).unwrap();
        let ids: Vec<_> = drafts.iter().filter_map(|d| d.id.as_deref()).collect();
        assert_eq!(ids, vec!["osm-node-4903043121", "osm-way-1359451849", "osm-relation-539354"]);

        let node = &drafts[0];
        assert_eq!(node.name.as_deref(), Some("Marina Tarará"));
        assert_eq!(node.country.as_deref(), Some("CU"));
        assert_eq!(node.region.as_deref(), Some(UNKNOWN));
        assert_eq!(node.venue_type.as_deref(), Some(DEFAULT_VENUE_TYPE));

        let way = &drafts[1];
        assert_eq!(way.name.as_deref(), Some("Royal Thames & District Yacht Club"));
        assert_eq!(way.region.as_deref(), Some("England"));
        assert_eq!(way.coordinates_lat, Some(51.5));

        let relation = drafts[2].clone().validate().unwrap();
        assert_eq!(relation.osm_type, OsmType::Relation);
        assert_eq!(relation.osm_id, "539354");
        assert_eq!(relation.coordinates_lng, -122.6061523);
    }

    #[test]
    fn matches_venue_tags() {
        let tags = |pairs: &[(&str, &str)]| -> HashMap<String, String> {
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
        };

        assert!(is_sailing_venue(&tags(&[("seamark:type", "harbour")])));
        assert!(is_sailing_venue(&tags(&[("sport", "sailing")])));
        assert!(!is_sailing_venue(&tags(&[("harbour", "no")])));
        assert!(!is_sailing_venue(&tags(&[("leisure", "park")])));
    }

    #[test]
    fn surfaces_malformed_xml() {
        assert!(matches!(read_venues("<osm><node id=\"1\">".as_bytes()), Err(SourceError::Xml(_))));
    }
}
