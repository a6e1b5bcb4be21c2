use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Owner lookups on the retry path
        manager
            .create_index(
                Index::create()
                    .name("idx_purchase_audit_logs_user_created")
                    .table(PurchaseAuditLogs::Table)
                    .col(PurchaseAuditLogs::UserId)
                    .col((PurchaseAuditLogs::CreatedAt, IndexOrder::Desc))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_purchase_audit_logs_design_status")
                    .table(PurchaseAuditLogs::Table)
                    .col(PurchaseAuditLogs::DesignId)
                    .col(PurchaseAuditLogs::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_purchase_audit_logs_design_status")
                    .table(PurchaseAuditLogs::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_purchase_audit_logs_user_created")
                    .table(PurchaseAuditLogs::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum PurchaseAuditLogs {
    Table,
    DesignId,
    Status,
    UserId,
    CreatedAt,
}
