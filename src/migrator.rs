use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20240601_000001_create_categories_table::Migration)]
    }
}

// Migration implementations

mod m20240601_000001_create_categories_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_categories_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Flat nested-set table aligned with entities::category Model
            manager
                .create_table(
                    Table::create()
                        .table(Categories::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Categories::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Categories::Name).string().not_null())
                        .col(
                            ColumnDef::new(Categories::Slug)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Categories::Description).text().null())
                        .col(ColumnDef::new(Categories::ParentId).uuid().null())
                        .col(ColumnDef::new(Categories::Lft).integer().not_null())
                        .col(ColumnDef::new(Categories::Rgt).integer().not_null())
                        .col(
                            ColumnDef::new(Categories::Level)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Categories::Path).text().not_null())
                        .col(
                            ColumnDef::new(Categories::SortOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Categories::IsVisible)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Categories::ShowInMenu)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Categories::IsFeatured)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Categories::MetaTitle).string().null())
                        .col(ColumnDef::new(Categories::MetaDescription).text().null())
                        .col(
                            ColumnDef::new(Categories::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Categories::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Categories::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Categories::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Range scans drive every tree query
            for (name, column) in [
                ("idx_categories_lft", Categories::Lft),
                ("idx_categories_rgt", Categories::Rgt),
                ("idx_categories_parent_id", Categories::ParentId),
                ("idx_categories_deleted_at", Categories::DeletedAt),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .name(name)
                            .table(Categories::Table)
                            .col(column)
                            .if_not_exists()
                            .to_owned(),
                    )
                    .await?;
            }

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Categories::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Categories {
        Table,
        Id,
        Name,
        Slug,
        Description,
        ParentId,
        Lft,
        Rgt,
        Level,
        Path,
        SortOrder,
        IsVisible,
        ShowInMenu,
        IsFeatured,
        MetaTitle,
        MetaDescription,
        Version,
        CreatedAt,
        UpdatedAt,
        DeletedAt,
    }
}
