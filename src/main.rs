use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use redis::Client as RedisClient;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use messmate_api::{
    config::Config,
    db,
    middleware::auth::JwtSecret,
    routes,
    services::{cron, email::EmailService, payments::PaymentService},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let config = Arc::new(config);

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let redis_client = RedisClient::open(config.redis_url.as_str())?;
    let redis_conn = redis_client.get_multiplexed_async_connection().await?;
    info!("Redis connected");

    let email = EmailService::new(&config).map(Arc::new);
    if email.is_some() {
        info!("SMTP email service configured");
    } else {
        info!("SMTP not configured — OTP emails disabled (codes returned in responses)");
    }

    let payments = PaymentService::new(&config).map(Arc::new);
    if payments.is_some() {
        info!("Payment gateway configured");
    } else {
        info!("Payment gateway not configured — gateway recharges disabled");
    }

    let state = AppState {
        db: pool.clone(),
        redis: redis_conn,
        redis_client: redis_client.clone(),
        config: config.clone(),
        email,
        payments,
    };

    // Background jobs: default-menu assignment and token backfill.
    cron::start(pool, config.clone());

    // CORS: allow the configured app origin; localhost is always allowed
    // for development.
    let base_url = config.app_base_url.clone();
    let cors_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let o = match origin.to_str() {
            Ok(s) => s,
            Err(_) => return false,
        };
        o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") || o == base_url
    });

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(cors_origin);

    let jwt_secret = JwtSecret(config.jwt_secret.clone());

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        // Auth
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/guest/request-otp", post(routes::auth::guest_request_otp))
        .route("/auth/guest/verify-otp", post(routes::auth::guest_verify_otp))
        // Menus
        .route("/menus", get(routes::menu::get_week))
        .route("/guest/menu", get(routes::menu::guest_week))
        // Weekly selections
        .route("/selections", get(routes::selections::get_current_week).post(routes::selections::submit))
        .route("/selections/preview", post(routes::selections::preview))
        .route("/selections/qr", get(routes::selections::generate_meal_qr))
        // Guest orders
        .route("/guest/orders", get(routes::orders::list_orders).post(routes::orders::place_order))
        // Wallet
        .route("/wallet", get(routes::wallet::get_wallet))
        .route("/wallet/transactions", get(routes::wallet::list_transactions))
        .route("/wallet/recharge/order", post(routes::wallet::create_recharge_order))
        .route("/usage-stats", get(routes::wallet::usage_stats))
        // Payments
        .route("/payments/confirm", post(routes::wallet::confirm_payment))
        .route("/payments/webhook", post(routes::wallet::payment_webhook))
        // Redemption (staff)
        .route("/redeem", post(routes::redemption::redeem_meal))
        // Admin
        .route("/admin/dashboard", get(routes::admin::dashboard))
        .route("/admin/weekly-menu", put(routes::admin::set_weekly_menu))
        .route("/admin/menu-items", get(routes::admin::list_menu_items).post(routes::admin::create_menu_item))
        .route("/admin/menu-items/{id}", put(routes::admin::update_menu_item).delete(routes::admin::delete_menu_item))
        .route("/admin/wallet/recharge", post(routes::admin::recharge_wallet))
        .route("/admin/users", get(routes::admin::list_users))
        .route("/admin/users/{id}", get(routes::admin::get_user).delete(routes::admin::delete_user))
        .layer(axum::Extension(jwt_secret))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // JSON bodies only — 1 MB is plenty.
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("MessMate API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
