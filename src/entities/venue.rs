use sea_orm::entity::prelude::*;

pub const TABLE_NAME: &str = "sailing_venues";

/// One row of `sailing_venues`. The primary key carries the OSM provenance,
/// see https://wiki.openstreetmap.org/wiki/Elements
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sailing_venues")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    #[sea_orm(column_type = "Double")]
    pub coordinates_lat: f64,
    #[sea_orm(column_type = "Double")]
    pub coordinates_lng: f64,
    pub country: String,
    pub region: String,
    pub venue_type: String,
    pub time_zone: String,
    pub data_quality: String,
    pub osm_id: String,
    pub osm_type: String,
    pub data_source: String,
    pub verified: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
