use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "checkouts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    #[sea_orm(unique)]
    pub cart_id: Uuid,
    pub status: String,
    pub payment_method: String,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub discount_percent: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub shipping: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub total: Decimal,
    pub full_name: String,
    pub email: String,
    pub country: String,
    pub city: String,
    pub home_city: String,
    pub zip_code: String,
    pub phone: String,
    #[sea_orm(column_type = "Text")]
    pub address: String,
    pub payment: bool,
    pub payment_id: Option<String>,
    pub invoice_no: Option<String>,
    pub tracking_no: Option<String>,
    pub external_payment_id: Option<String>,
    pub paid_at: Option<DateTimeWithTimeZone>,
    pub shipping_date: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::carts::Entity",
        from = "Column::CartId",
        to = "super::carts::Column::Id",
        on_delete = "Cascade"
    )]
    Carts,
    #[sea_orm(has_many = "super::checkout_items::Entity")]
    CheckoutItems,
}

impl Related<super::carts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Carts.def()
    }
}

impl Related<super::checkout_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CheckoutItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
