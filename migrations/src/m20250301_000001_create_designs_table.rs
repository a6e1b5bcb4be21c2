use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000001_create_designs_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Designs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Designs::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Designs::UserId).string_len(64).not_null())
                    .col(ColumnDef::new(Designs::Name).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Designs::CartStatus)
                            .string_len(20)
                            .not_null()
                            .default("saved"),
                    )
                    .col(
                        ColumnDef::new(Designs::ExternalCartId)
                            .string_len(255)
                            .null(),
                    )
                    .col(ColumnDef::new(Designs::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Designs::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_designs_user_id")
                    .table(Designs::Table)
                    .col(Designs::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Designs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Designs {
    Table,
    Id,
    UserId,
    Name,
    CartStatus,
    ExternalCartId,
    CreatedAt,
    UpdatedAt,
}
