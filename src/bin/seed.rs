use cart_checkout_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    dto::auth::Claims,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use rust_decimal::Decimal;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;
    let pool = orm.get_postgres_connection_pool();

    seed_catalog(pool).await?;
    seed_coupons(pool).await?;

    // users live in the identity service; mint local tokens to exercise the API
    let user_token = dev_token(&config, Uuid::new_v4(), "user")?;
    let admin_token = dev_token(&config, Uuid::new_v4(), "admin")?;
    println!("Seed completed.");
    println!("User token:  {user_token}");
    println!("Admin token: {admin_token}");
    Ok(())
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let products = [
        ("Basic Tee", Decimal::new(50000, 2), 10),
        ("Denim Jacket", Decimal::new(245000, 2), 4),
        ("Canvas Tote", Decimal::new(35050, 2), 25),
    ];

    for (title, price, stock) in products {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO products (id, title, price, in_stock_max)
            SELECT $1, $2, $3, $4
            WHERE NOT EXISTS (SELECT 1 FROM products WHERE title = $2)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(title)
        .bind(price)
        .bind(stock)
        .fetch_optional(pool)
        .await?;

        // sized variants for the tee, priced above the base product for XL
        if let (Some((product_id,)), "Basic Tee") = (row, title) {
            for (price, quantity) in [(None, 6), (Some(Decimal::new(55000, 2)), 2)] {
                sqlx::query(
                    "INSERT INTO variants (id, product_id, size_id, color_id, price, quantity) VALUES ($1, $2, $3, NULL, $4, $5)",
                )
                .bind(Uuid::new_v4())
                .bind(product_id)
                .bind(Uuid::new_v4())
                .bind(price)
                .bind(quantity)
                .execute(pool)
                .await?;
            }
        }
    }
    Ok(())
}

async fn seed_coupons(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let now = Utc::now();
    let coupons = [
        ("SAVE10", Decimal::from(10), Decimal::ZERO, false),
        ("BIG25", Decimal::from(25), Decimal::from(2000), false),
        ("OLD50", Decimal::from(50), Decimal::ZERO, true),
    ];

    for (code, discount, minimum_amount, is_expired) in coupons {
        sqlx::query(
            r#"
            INSERT INTO coupons (id, code, discount, minimum_amount, is_expired, start_date, end_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(discount)
        .bind(minimum_amount)
        .bind(is_expired)
        .bind(now - Duration::days(1))
        .bind(now + Duration::days(90))
        .execute(pool)
        .await?;
    }
    Ok(())
}

fn dev_token(config: &AppConfig, user_id: Uuid, role: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: (Utc::now() + Duration::days(7)).timestamp() as usize,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?)
}
