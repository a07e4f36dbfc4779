use sea_orm_migration::prelude::*;

pub use sea_orm_migration::MigratorTrait;

mod m20240301_000001_create_ratings_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20240301_000001_create_ratings_table::Migration)]
    }
}

/// Common table and column identifiers
#[derive(Iden)]
pub enum Ratings {
    Table,
    Id,
    UserId,
    RelatedType,
    RelatedId,
    Rating,
    Metadata,
    CreatedAt,
    UpdatedAt,
}
