use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000002_create_purchase_audit_logs_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PurchaseAuditLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PurchaseAuditLogs::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PurchaseAuditLogs::UserId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PurchaseAuditLogs::DesignId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PurchaseAuditLogs::OutboundRequest)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PurchaseAuditLogs::OutboundResponse)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PurchaseAuditLogs::PayloadDigest)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PurchaseAuditLogs::Status)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(ColumnDef::new(PurchaseAuditLogs::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(PurchaseAuditLogs::ExternalCartId)
                            .string_len(255)
                            .null(),
                    )
                    .col(ColumnDef::new(PurchaseAuditLogs::RedirectUrl).text().null())
                    .col(
                        ColumnDef::new(PurchaseAuditLogs::AttemptCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PurchaseAuditLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PurchaseAuditLogs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PurchaseAuditLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PurchaseAuditLogs {
    Table,
    Id,
    UserId,
    DesignId,
    OutboundRequest,
    OutboundResponse,
    PayloadDigest,
    Status,
    ErrorMessage,
    ExternalCartId,
    RedirectUrl,
    AttemptCount,
    CreatedAt,
    UpdatedAt,
}
