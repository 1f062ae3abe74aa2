use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_receptions_table::Migration),
            Box::new(m20240601_000002_create_quality_checks_table::Migration),
            Box::new(m20240601_000003_create_warehouse_product_table::Migration),
            Box::new(m20240601_000004_create_inventory_table::Migration),
            Box::new(m20240601_000005_create_returns_table::Migration),
            Box::new(m20240601_000006_create_locations_table::Migration),
        ]
    }
}

mod m20240601_000001_create_receptions_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_receptions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Receptions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Receptions::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Receptions::Supplier).string().not_null())
                        .col(ColumnDef::new(Receptions::Status).string_len(32).not_null())
                        .col(ColumnDef::new(Receptions::Notes).text().null())
                        .col(
                            ColumnDef::new(Receptions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Receptions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Receptions {
        Table,
        Id,
        Supplier,
        Status,
        Notes,
        CreatedAt,
    }
}

mod m20240601_000002_create_quality_checks_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_quality_checks_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(QualityChecks::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(QualityChecks::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(QualityChecks::ReceptionId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(QualityChecks::ProductName)
                                .string_len(255)
                                .not_null(),
                        )
                        .col(ColumnDef::new(QualityChecks::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(QualityChecks::Status)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(QualityChecks::Notes)
                                .text()
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(QualityChecks::ReconciliationStatus)
                                .string_len(16)
                                .not_null()
                                .default("PENDING"),
                        )
                        .col(
                            ColumnDef::new(QualityChecks::ReconciliationError)
                                .text()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(QualityChecks::CheckedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_quality_checks_reception_id")
                        .table(QualityChecks::Table)
                        .col(QualityChecks::ReceptionId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_quality_checks_reconciliation_status")
                        .table(QualityChecks::Table)
                        .col(QualityChecks::ReconciliationStatus)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(QualityChecks::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum QualityChecks {
        Table,
        Id,
        ReceptionId,
        ProductName,
        Quantity,
        Status,
        Notes,
        ReconciliationStatus,
        ReconciliationError,
        CheckedAt,
    }
}

mod m20240601_000003_create_warehouse_product_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_warehouse_product_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(WarehouseProduct::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WarehouseProduct::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(WarehouseProduct::Name)
                                .string_len(255)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WarehouseProduct::Sku)
                                .string_len(300)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WarehouseProduct::CategoryId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(WarehouseProduct::Description).text().null())
                        .col(
                            ColumnDef::new(WarehouseProduct::Price)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(WarehouseProduct::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // product names are the natural key used by ON CONFLICT (name)
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_warehouse_product_name")
                        .table(WarehouseProduct::Table)
                        .col(WarehouseProduct::Name)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WarehouseProduct::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum WarehouseProduct {
        Table,
        Id,
        Name,
        Sku,
        CategoryId,
        Description,
        Price,
        CreatedAt,
    }
}

mod m20240601_000004_create_inventory_table {
    use super::m20240601_000003_create_warehouse_product_table::WarehouseProduct;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_inventory_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Inventory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Inventory::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Inventory::ProductId).integer().not_null())
                        .col(
                            ColumnDef::new(Inventory::ProductName)
                                .string_len(255)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Inventory::Quantity)
                                .integer()
                                .not_null()
                                .default(0)
                                .check(Expr::col(Inventory::Quantity).gte(0)),
                        )
                        .col(
                            ColumnDef::new(Inventory::MinStock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Inventory::LocationId).integer().not_null())
                        .col(
                            ColumnDef::new(Inventory::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_product_id")
                                .from(Inventory::Table, Inventory::ProductId)
                                .to(WarehouseProduct::Table, WarehouseProduct::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_inventory_product_id")
                        .table(Inventory::Table)
                        .col(Inventory::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Inventory::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Inventory {
        Table,
        Id,
        ProductId,
        ProductName,
        Quantity,
        MinStock,
        LocationId,
        UpdatedAt,
    }
}

mod m20240601_000005_create_returns_table {
    use super::m20240601_000002_create_quality_checks_table::QualityChecks;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000005_create_returns_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Returns::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Returns::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Returns::QualityCheckId).integer().null())
                        .col(ColumnDef::new(Returns::ReceptionId).integer().not_null())
                        .col(
                            ColumnDef::new(Returns::ProductName)
                                .string_len(255)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Returns::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(Returns::Reason)
                                .text()
                                .not_null()
                                .default(""),
                        )
                        .col(ColumnDef::new(Returns::ReturnType).string_len(32).not_null())
                        .col(ColumnDef::new(Returns::Status).string_len(16).not_null())
                        .col(
                            ColumnDef::new(Returns::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Returns::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_returns_quality_check_id")
                                .from(Returns::Table, Returns::QualityCheckId)
                                .to(QualityChecks::Table, QualityChecks::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            // one return per quality check; manually entered returns have no check
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_returns_quality_check_id")
                        .table(Returns::Table)
                        .col(Returns::QualityCheckId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_returns_status")
                        .table(Returns::Table)
                        .col(Returns::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Returns::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Returns {
        Table,
        Id,
        QualityCheckId,
        ReceptionId,
        ProductName,
        Quantity,
        Reason,
        ReturnType,
        Status,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000006_create_locations_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000006_create_locations_table"
        }
    }

    const DEFAULT_LOCATION_NAME: &str = "Main Warehouse";

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Locations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Locations::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Locations::Name)
                                .string_len(255)
                                .not_null()
                                .unique_key(),
                        )
                        .to_owned(),
                )
                .await?;

            // first row of a fresh table gets id 1, the default stock location
            let mut seed = Query::insert();
            seed.into_table(Locations::Table)
                .columns([Locations::Name])
                .values([DEFAULT_LOCATION_NAME.into()])
                .map_err(|e| DbErr::Migration(e.to_string()))?;
            manager.exec_stmt(seed).await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Locations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Locations {
        Table,
        Id,
        Name,
    }
}
