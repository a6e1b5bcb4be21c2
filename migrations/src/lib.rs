pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_designs_table;
mod m20250301_000002_create_purchase_audit_logs_table;
mod m20250415_000003_add_audit_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_designs_table::Migration),
            Box::new(m20250301_000002_create_purchase_audit_logs_table::Migration),
            Box::new(m20250415_000003_add_audit_indexes::Migration),
        ]
    }
}
