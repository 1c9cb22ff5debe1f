//! Demo data seed script.
//!
//! Seeds a fresh database with a usable mess setup:
//! - 1 super-admin and 1 mess-staff admin account
//! - 2 student accounts with a starting wallet balance
//! - 6 thalis with realistic limits and prices
//! - A published menu for the current week (all 7 days, all 3 meals)
//!
//! Usage: DATABASE_URL=... seed-demo [--password Demo2024!]

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, Utc};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "seed-demo", about = "Seed the MessMate database with demo data")]
struct Args {
    /// Password for all demo accounts
    #[arg(long, default_value = "Demo2024!")]
    password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL environment variable not set")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("Failed to connect to database")?;

    messmate_api::db::run_migrations(&pool).await?;

    let password_hash = bcrypt::hash(&args.password, bcrypt::DEFAULT_COST)?;

    tracing::info!("Seeding accounts...");
    let accounts: [(&str, &str, &str, Option<&str>, i64); 4] = [
        ("Mess Office", "admin@messmate.local", "super_admin", None, 0),
        ("Scan Desk", "staff@messmate.local", "admin", None, 0),
        ("Asha Rao", "asha@messmate.local", "student", Some("A-114"), 50_000),
        ("Vikram Shetty", "vikram@messmate.local", "student", Some("B-220"), 50_000),
    ];
    for (name, email, role, room_no, balance) in accounts {
        sqlx::query(
            r#"INSERT INTO users (name, email, password_hash, room_no, role, wallet_balance_paise)
               VALUES ($1, $2, $3, $4, $5::user_role, $6)
               ON CONFLICT (email) DO NOTHING"#,
        )
        .bind(name)
        .bind(email)
        .bind(&password_hash)
        .bind(room_no)
        .bind(role)
        .bind(balance)
        .execute(&pool)
        .await?;
    }

    tracing::info!("Seeding thalis...");
    let thalis: [(&str, &str, i32, i32, i32, i64); 6] = [
        ("Veg Thali", "Dal, sabzi, rice, roti, curd", 15, 7, 30, 0),
        ("Rice-Chicken Thali", "Chicken curry, rice, salad", 25, 2, 8, 4500),
        ("Paneer Special", "Paneer butter masala, naan, pulao", 20, 2, 8, 4000),
        ("Fish Curry Meal", "Fish curry, rice, rasam", 25, 1, 4, 5500),
        ("South Indian Combo", "Dosa, idli, sambar, chutney", 15, 4, 15, 2500),
        ("Biryani Special", "Hyderabadi biryani, raita", 30, 1, 4, 6000),
    ];
    let mut thali_ids: Vec<Uuid> = Vec::new();
    for (name, description, prep, weekly, monthly, price) in thalis {
        let id: Uuid = sqlx::query_scalar(
            r#"INSERT INTO menu_items
                   (name, description, estimated_prep_minutes, weekly_limit, monthly_limit, extra_price_paise)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT (name) DO UPDATE SET description = EXCLUDED.description
               RETURNING id"#,
        )
        .bind(name)
        .bind(description)
        .bind(prep)
        .bind(weekly)
        .bind(monthly)
        .bind(price)
        .fetch_one(&pool)
        .await?;
        thali_ids.push(id);
    }

    tracing::info!("Publishing this week's menu...");
    let today = Utc::now().date_naive();
    let week_start = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    for day in 0i16..7 {
        for (meal, offered) in [
            ("breakfast", vec![thali_ids[0], thali_ids[4]]),
            ("lunch", thali_ids.clone()),
            ("dinner", vec![thali_ids[0], thali_ids[1], thali_ids[2], thali_ids[5]]),
        ] {
            for item_id in offered {
                sqlx::query(
                    r#"INSERT INTO weekly_menus (week_start_date, day_of_week, meal_type, menu_item_id)
                       VALUES ($1, $2, $3::meal_type, $4)
                       ON CONFLICT (week_start_date, day_of_week, meal_type, menu_item_id) DO NOTHING"#,
                )
                .bind(week_start)
                .bind(day)
                .bind(meal)
                .bind(item_id)
                .execute(&pool)
                .await?;
            }
        }
    }

    tracing::info!(
        "Done. Demo accounts use password '{}'; the default thali id is {} (set DEFAULT_THALI_ID).",
        args.password,
        thali_ids[0]
    );
    Ok(())
}
