use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000003_create_order_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Orders::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Orders::OrderNumber)
                            .string_len(12)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                    .col(
                        ColumnDef::new(Orders::ShippingMethod)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Orders::PaymentMethod)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Orders::CustomerName)
                            .string_len(200)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Orders::CustomerEmail)
                            .string_len(254)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Orders::CustomerPhone)
                            .string_len(15)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Orders::Region).string_len(100).null())
                    .col(ColumnDef::new(Orders::City).string_len(100).null())
                    .col(ColumnDef::new(Orders::Commune).string_len(100).null())
                    .col(ColumnDef::new(Orders::ShippingAddress).text().null())
                    .col(ColumnDef::new(Orders::Subtotal).big_integer().not_null())
                    .col(
                        ColumnDef::new(Orders::DiscountTotal)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Orders::TaxTotal).big_integer().not_null())
                    .col(
                        ColumnDef::new(Orders::ShippingTotal)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Orders::TotalAmount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Orders::GatewayToken).string_len(100).null())
                    .col(ColumnDef::new(Orders::PaymentUrl).string_len(300).null())
                    .col(ColumnDef::new(Orders::CartId).uuid().null())
                    .col(ColumnDef::new(Orders::Notes).text().null())
                    .col(
                        ColumnDef::new(Orders::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Orders::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_gateway_token")
                    .table(Orders::Table)
                    .col(Orders::GatewayToken)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OrderItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OrderItems::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                    .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                    .col(
                        ColumnDef::new(OrderItems::ProductName)
                            .string_len(200)
                            .not_null(),
                    )
                    .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                    .col(
                        ColumnDef::new(OrderItems::UnitPrice)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OrderItems::LineTotal)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OrderItems::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_order_items_order")
                            .from(OrderItems::Table, OrderItems::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_order_items_product")
                            .from(OrderItems::Table, OrderItems::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OrderTracking::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OrderTracking::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OrderTracking::OrderId).uuid().not_null())
                    .col(
                        ColumnDef::new(OrderTracking::Status)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(ColumnDef::new(OrderTracking::Note).text().null())
                    .col(
                        ColumnDef::new(OrderTracking::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_order_tracking_order")
                            .from(OrderTracking::Table, OrderTracking::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FlowCredentials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FlowCredentials::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FlowCredentials::Label)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FlowCredentials::ApiKey)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FlowCredentials::SecretKey)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FlowCredentials::IsSandbox)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(FlowCredentials::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(FlowCredentials::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FlowCredentials::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FlowCredentials::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OrderTracking::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OrderItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Orders {
    Table,
    Id,
    OrderNumber,
    Status,
    ShippingMethod,
    PaymentMethod,
    CustomerName,
    CustomerEmail,
    CustomerPhone,
    Region,
    City,
    Commune,
    ShippingAddress,
    Subtotal,
    DiscountTotal,
    TaxTotal,
    ShippingTotal,
    TotalAmount,
    GatewayToken,
    PaymentUrl,
    CartId,
    Notes,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum OrderItems {
    Table,
    Id,
    OrderId,
    ProductId,
    ProductName,
    Quantity,
    UnitPrice,
    LineTotal,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OrderTracking {
    Table,
    Id,
    OrderId,
    Status,
    Note,
    CreatedAt,
}

#[derive(DeriveIden)]
enum FlowCredentials {
    Table,
    Id,
    Label,
    ApiKey,
    SecretKey,
    IsSandbox,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
}
