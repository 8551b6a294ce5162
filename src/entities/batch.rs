use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A priced, dated lot of a single product.
///
/// `delivered_on` is copied from the owning supply at creation and, together
/// with the monotone `id`, forms the FIFO ordering key
/// `(delivered_on ASC, id ASC)`. `remaining_quantity` is mutated exclusively
/// by the consumption allocator; `0 <= remaining_quantity <= initial_quantity`
/// holds after every committed transaction.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "batches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i64,
    pub product_id: i64,
    pub supply_id: i64,
    pub delivered_on: NaiveDate,
    pub initial_quantity: i32,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub unit_price: rust_decimal::Decimal,
    pub remaining_quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(
        belongs_to = "super::supply::Entity",
        from = "Column::SupplyId",
        to = "super::supply::Column::Id"
    )]
    Supply,
    #[sea_orm(has_many = "super::stock_movement::Entity")]
    StockMovements,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::supply::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Supply.def()
    }
}

impl Related<super::stock_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockMovements.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// True once the allocator has drained the lot. Exhausted batches stay in
    /// the ledger for audit display but are never selected again.
    pub fn is_exhausted(&self) -> bool {
        self.remaining_quantity == 0
    }
}
