#![allow(dead_code)]

use cart_checkout_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    entity::{products::ActiveModel as ProductActive, variants::ActiveModel as VariantActive},
    middleware::auth::AuthUser,
    state::AppState,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use tokio::sync::OnceCell;
use uuid::Uuid;

static MIGRATED: OnceCell<()> = OnceCell::const_new();

/// Connects to the test database, or returns `None` when none is configured
/// so the calling test can skip.
pub async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run flow tests.");
            return Ok(None);
        }
    };

    let orm = create_orm_conn(&database_url).await?;
    MIGRATED
        .get_or_try_init(|| async { run_migrations(&orm).await })
        .await?;

    let config = AppConfig {
        database_url,
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: "test-secret".into(),
        payment_webhook_secret: "test-webhook".into(),
    };
    Ok(Some(AppState::new(orm, config)))
}

pub fn user() -> AuthUser {
    AuthUser {
        user_id: Uuid::new_v4(),
        role: "user".into(),
    }
}

pub fn admin() -> AuthUser {
    AuthUser {
        user_id: Uuid::new_v4(),
        role: "admin".into(),
    }
}

pub async fn create_product(state: &AppState, price: i64, stock: i32) -> anyhow::Result<Uuid> {
    create_priced_product(state, Decimal::from(price), stock).await
}

pub async fn create_priced_product(
    state: &AppState,
    price: Decimal,
    stock: i32,
) -> anyhow::Result<Uuid> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        title: Set(format!("Test product {}", Uuid::new_v4().simple())),
        price: Set(price),
        in_stock_max: Set(stock),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(product.id)
}

/// Variant with a fresh size id; returns `(variant_id, size_id)`.
pub async fn create_variant(
    state: &AppState,
    product_id: Uuid,
    price: Option<i64>,
    quantity: i32,
) -> anyhow::Result<(Uuid, Uuid)> {
    let size_id = Uuid::new_v4();
    let variant = VariantActive {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        size_id: Set(Some(size_id)),
        color_id: Set(None),
        price: Set(price.map(Decimal::from)),
        quantity: Set(quantity),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok((variant.id, size_id))
}

pub async fn product_stock(state: &AppState, product_id: Uuid) -> anyhow::Result<i32> {
    let product = cart_checkout_api::entity::Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("product {product_id} missing"))?;
    Ok(product.in_stock_max)
}

pub async fn delete_product(state: &AppState, product_id: Uuid) -> anyhow::Result<()> {
    cart_checkout_api::entity::Products::delete_by_id(product_id)
        .exec(&state.orm)
        .await?;
    Ok(())
}

/// Makes sure `code` exists as an active percentage coupon.
pub async fn upsert_coupon(
    state: &AppState,
    code: &str,
    discount: i64,
    minimum_amount: i64,
) -> anyhow::Result<()> {
    let now = Utc::now();
    upsert_coupon_window(
        state,
        code,
        Decimal::from(discount),
        Decimal::from(minimum_amount),
        now - Duration::days(1),
        now + Duration::days(30),
    )
    .await
}

pub async fn upsert_coupon_window(
    state: &AppState,
    code: &str,
    discount: Decimal,
    minimum_amount: Decimal,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO coupons (id, code, discount, minimum_amount, is_expired, start_date, end_date)
        VALUES ($1, $2, $3, $4, FALSE, $5, $6)
        ON CONFLICT (code) DO UPDATE
        SET discount = EXCLUDED.discount,
            minimum_amount = EXCLUDED.minimum_amount,
            is_expired = FALSE,
            start_date = EXCLUDED.start_date,
            end_date = EXCLUDED.end_date
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(code)
    .bind(discount)
    .bind(minimum_amount)
    .bind(start_date)
    .bind(end_date)
    .execute(state.pool())
    .await?;
    Ok(())
}
