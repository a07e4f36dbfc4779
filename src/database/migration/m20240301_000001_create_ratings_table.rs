use super::Ratings;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Ratings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Ratings::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Ratings::UserId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Ratings::RelatedType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Ratings::RelatedId).big_integer().not_null())
                    .col(ColumnDef::new(Ratings::Rating).integer().not_null())
                    .col(ColumnDef::new(Ratings::Metadata).text().null())
                    .col(
                        ColumnDef::new(Ratings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Ratings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // One rating per user per entity
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_ratings_user_related_unique")
                    .table(Ratings::Table)
                    .col(Ratings::UserId)
                    .col(Ratings::RelatedType)
                    .col(Ratings::RelatedId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Aggregation lookups filter on the related entity
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_ratings_related")
                    .table(Ratings::Table)
                    .col(Ratings::RelatedType)
                    .col(Ratings::RelatedId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Ratings::Table).to_owned())
            .await
    }
}
