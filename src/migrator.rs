use sea_orm::DbBackend;
use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_stock_ledger_tables::Migration),
            Box::new(m20250301_000002_create_sales_pipeline_tables::Migration),
        ]
    }
}

/// Quantity and money columns. SQLite has no exact decimal storage, so it gets
/// a REAL column that round-trips through `Decimal`.
fn amount_column<T: IntoIden>(manager: &SchemaManager, column: T) -> ColumnDef {
    let mut def = ColumnDef::new(column);
    match manager.get_database_backend() {
        DbBackend::Sqlite => def.double(),
        _ => def.decimal_len(19, 4),
    };
    def.not_null().default(0);
    def
}

// Migration implementations

mod m20250301_000001_create_stock_ledger_tables {
    use super::amount_column;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000001_create_stock_ledger_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(RawMaterials::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(RawMaterials::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(RawMaterials::Name).string().not_null())
                        .col(ColumnDef::new(RawMaterials::Unit).string().not_null())
                        .col(&mut amount_column(manager, RawMaterials::CurrentQuantity))
                        .col(
                            ColumnDef::new(RawMaterials::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(RawMaterials::Version)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(RawMaterials::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RawMaterials::UpdatedAt)
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
                        .name("idx_raw_materials_name")
                        .table(RawMaterials::Table)
                        .col(RawMaterials::Name)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::CategoryId).uuid().null())
                        .col(&mut amount_column(manager, Products::StockQuantity))
                        .col(&mut amount_column(manager, Products::Price))
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::Version)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ManufacturingLogs::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ManufacturingLogs::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ManufacturingLogs::ProductId).uuid().not_null())
                        .col(ColumnDef::new(ManufacturingLogs::MaterialId).uuid().not_null())
                        .col(&mut amount_column(manager, ManufacturingLogs::QuantityUsed))
                        .col(&mut amount_column(manager, ManufacturingLogs::ManufacturedQty))
                        .col(
                            ColumnDef::new(ManufacturingLogs::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ManufacturingLogs::CreatedBy).uuid().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_manufacturing_logs_product")
                                .from(ManufacturingLogs::Table, ManufacturingLogs::ProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_manufacturing_logs_material")
                                .from(ManufacturingLogs::Table, ManufacturingLogs::MaterialId)
                                .to(RawMaterials::Table, RawMaterials::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_manufacturing_logs_created_at")
                        .table(ManufacturingLogs::Table)
                        .col(ManufacturingLogs::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ManufacturingReversals::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ManufacturingReversals::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ManufacturingReversals::LogId).uuid().not_null())
                        .col(
                            ColumnDef::new(ManufacturingReversals::ReversedBy)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ManufacturingReversals::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_manufacturing_reversals_log")
                                .from(ManufacturingReversals::Table, ManufacturingReversals::LogId)
                                .to(ManufacturingLogs::Table, ManufacturingLogs::Id),
                        )
                        .to_owned(),
                )
                .await?;

            // A log can be reversed at most once
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_manufacturing_reversals_log_id")
                        .table(ManufacturingReversals::Table)
                        .col(ManufacturingReversals::LogId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ManufacturingReversals::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ManufacturingLogs::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(RawMaterials::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum RawMaterials {
        Table,
        Id,
        Name,
        Unit,
        CurrentQuantity,
        IsActive,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Name,
        CategoryId,
        StockQuantity,
        Price,
        IsActive,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum ManufacturingLogs {
        Table,
        Id,
        ProductId,
        MaterialId,
        QuantityUsed,
        ManufacturedQty,
        CreatedAt,
        CreatedBy,
    }

    #[derive(DeriveIden)]
    pub(super) enum ManufacturingReversals {
        Table,
        Id,
        LogId,
        ReversedBy,
        CreatedAt,
    }
}

mod m20250301_000002_create_sales_pipeline_tables {
    use super::amount_column;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000002_create_sales_pipeline_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Leads::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Leads::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Leads::FullName).string().not_null())
                        .col(ColumnDef::new(Leads::Phone).string().null())
                        .col(ColumnDef::new(Leads::Email).string().null())
                        .col(ColumnDef::new(Leads::Company).string().null())
                        .col(ColumnDef::new(Leads::LeadStatus).string().not_null())
                        .col(ColumnDef::new(Leads::AssignedTo).uuid().null())
                        .col(
                            ColumnDef::new(Leads::Converted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Leads::ConvertedBy).uuid().null())
                        .col(
                            ColumnDef::new(Leads::ConvertedDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Leads::Remarks).json().not_null())
                        .col(ColumnDef::new(Leads::CreatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(Leads::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Leads::UpdatedAt)
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
                        .name("idx_leads_assigned_to")
                        .table(Leads::Table)
                        .col(Leads::AssignedTo)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(B2bRecords::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(B2bRecords::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(B2bRecords::LeadId).uuid().null())
                        .col(ColumnDef::new(B2bRecords::SrNo).big_integer().not_null())
                        .col(ColumnDef::new(B2bRecords::ClientName).string().not_null())
                        .col(ColumnDef::new(B2bRecords::Mobile).string().null())
                        .col(ColumnDef::new(B2bRecords::Email).string().null())
                        .col(ColumnDef::new(B2bRecords::Company).string().null())
                        .col(ColumnDef::new(B2bRecords::OrderDate).date().null())
                        .col(ColumnDef::new(B2bRecords::OrderDetails).text().null())
                        .col(&mut amount_column(manager, B2bRecords::TotalOrderValue))
                        .col(&mut amount_column(manager, B2bRecords::AmountReceived))
                        .col(&mut amount_column(manager, B2bRecords::AmountPending))
                        .col(ColumnDef::new(B2bRecords::LastReceiptDate).date().null())
                        .col(
                            ColumnDef::new(B2bRecords::OrderStatus)
                                .string_len(16)
                                .not_null()
                                .default("OPEN"),
                        )
                        .col(ColumnDef::new(B2bRecords::ConvertedBy).uuid().null())
                        .col(ColumnDef::new(B2bRecords::CreatedBy).uuid().not_null())
                        .col(ColumnDef::new(B2bRecords::AdditionalRemarks).text().null())
                        .col(
                            ColumnDef::new(B2bRecords::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(B2bRecords::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_b2b_records_lead")
                                .from(B2bRecords::Table, B2bRecords::LeadId)
                                .to(Leads::Table, Leads::Id),
                        )
                        .to_owned(),
                )
                .await?;

            // One record per lead. This index, not the lookup in the
            // conversion path, is what prevents duplicates.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_b2b_records_lead_id")
                        .table(B2bRecords::Table)
                        .col(B2bRecords::LeadId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_b2b_records_sr_no")
                        .table(B2bRecords::Table)
                        .col(B2bRecords::SrNo)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_b2b_records_converted_by")
                        .table(B2bRecords::Table)
                        .col(B2bRecords::ConvertedBy)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(B2bRecords::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Leads::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Leads {
        Table,
        Id,
        FullName,
        Phone,
        Email,
        Company,
        LeadStatus,
        AssignedTo,
        Converted,
        ConvertedBy,
        ConvertedDate,
        Remarks,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum B2bRecords {
        Table,
        Id,
        LeadId,
        SrNo,
        ClientName,
        Mobile,
        Email,
        Company,
        OrderDate,
        OrderDetails,
        TotalOrderValue,
        AmountReceived,
        AmountPending,
        LastReceiptDate,
        OrderStatus,
        ConvertedBy,
        CreatedBy,
        AdditionalRemarks,
        CreatedAt,
        UpdatedAt,
    }
}
