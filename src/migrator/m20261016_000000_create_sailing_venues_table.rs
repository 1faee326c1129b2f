use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20261016_000000_create_sailing_venues_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(Table::create()
            .table(SailingVenues::Table)
            .if_not_exists()
            .col(
                ColumnDef::new(SailingVenues::Id)
                    .string()
                    .not_null()
                    .primary_key(),
            )
            .col(ColumnDef::new(SailingVenues::Name).string().not_null())
            .col(ColumnDef::new(SailingVenues::CoordinatesLat).double().not_null())
            .col(ColumnDef::new(SailingVenues::CoordinatesLng).double().not_null())
            .col(ColumnDef::new(SailingVenues::Country).string().not_null())
            .col(ColumnDef::new(SailingVenues::Region).string().not_null())
            .col(ColumnDef::new(SailingVenues::VenueType).string().not_null())
            .col(ColumnDef::new(SailingVenues::TimeZone).string().not_null())
            .col(ColumnDef::new(SailingVenues::DataQuality).string().not_null())
            .col(ColumnDef::new(SailingVenues::OsmId).string().not_null())
            .col(ColumnDef::new(SailingVenues::OsmType).string().not_null())
            .col(ColumnDef::new(SailingVenues::DataSource).string().not_null())
            .col(ColumnDef::new(SailingVenues::Verified).boolean().not_null())
            .to_owned()).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SailingVenues::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum SailingVenues {
    Table,
    Id,
    Name,
    CoordinatesLat,
    CoordinatesLng,
    Country,
    Region,
    VenueType,
    TimeZone,
    DataQuality,
    OsmId,
    OsmType,
    DataSource,
    Verified,
}
