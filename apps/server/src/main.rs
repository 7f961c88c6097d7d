mod auth;
mod availability;
mod calendar;
mod error;
mod gateway;
mod handlers;
mod kst;
mod models;
mod notify;
mod rate_limit;
mod settings_store;
mod sheets;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use calendar::GoogleCalendarClient;
use gateway::ReservationGateway;
use notify::Notifier;
use rate_limit::{rate_limit, RateLimiter, Tier};
use settings_store::SettingsStore;
use sheets::GoogleSheetsClient;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub settings: SettingsStore,
    pub gateway: ReservationGateway<GoogleCalendarClient, GoogleSheetsClient>,
    pub notifier: Notifier,
    pub content_path: PathBuf,
    pub admin_password: String,
    pub session_secret: String,
    pub started_at: Instant,
}

/// Rate limit cleanup interval (seconds).
const RATE_LIMIT_CLEANUP_SECS: u64 = 300;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();

    // ── Required env vars ──
    let calendar_id = std::env::var("GOOGLE_CALENDAR_ID").expect("GOOGLE_CALENDAR_ID must be set");
    let sheet_id = std::env::var("GOOGLE_SHEET_ID").expect("GOOGLE_SHEET_ID must be set");
    let google_token = std::env::var("GOOGLE_API_TOKEN").expect("GOOGLE_API_TOKEN must be set");
    let admin_password = std::env::var("ADMIN_PASSWORD").expect("ADMIN_PASSWORD must be set");
    let session_secret = std::env::var("SESSION_SECRET").expect("SESSION_SECRET must be set");

    // ── Optional env vars ──
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());
    let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
    let chat_id = std::env::var("TELEGRAM_CHAT_ID").unwrap_or_default();
    let webapp_url =
        std::env::var("WEBAPP_URL").unwrap_or_else(|_| "https://example.com".into());
    let settings_path =
        std::env::var("SETTINGS_PATH").unwrap_or_else(|_| "data/settings.json".into());
    let content_path =
        std::env::var("CONTENT_PATH").unwrap_or_else(|_| "data/intro-content.json".into());

    if bot_token.is_empty() || chat_id.is_empty() {
        tracing::warn!("TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID not set — notifications disabled");
    }

    // ── Settings store ──
    // A crash can leave the advisory lock behind; clear it before serving.
    let settings = SettingsStore::new(&settings_path);
    settings.clear_stale_lock();
    settings.load()?;

    let state = Arc::new(AppState {
        settings,
        gateway: ReservationGateway::new(
            GoogleCalendarClient::new(calendar_id, google_token.clone()),
            GoogleSheetsClient::new(sheet_id, google_token),
        ),
        notifier: Notifier::new(bot_token, chat_id),
        content_path: PathBuf::from(content_path),
        admin_password,
        session_secret,
        started_at: Instant::now(),
    });

    // ── Rate limiter + cleanup task ──
    let limiter = RateLimiter::new();
    let cleanup_limiter = limiter.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(RATE_LIMIT_CLEANUP_SECS));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup();
        }
    });

    // ── CORS: whitelist WEBAPP_URL when configured, otherwise allow any ──
    let cors = if webapp_url != "https://example.com" {
        let origins: Vec<axum::http::HeaderValue> = vec![
            webapp_url.parse().expect("WEBAPP_URL must be a valid URL"),
            "http://localhost:3001".parse().unwrap(), // frontend dev server
        ];
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // ── Router (tiered groups sharing one limiter) ──

    // 1. No-limit: health checks
    let no_limit_routes = Router::new().route("/api/health", get(handlers::health::health));

    // 2. Public reads (60 req/min)
    let public_routes = Router::new()
        .route("/api/settings", get(handlers::settings::get_settings))
        .route("/api/reservations", get(handlers::reservations::list))
        .route(
            "/api/available-times",
            get(handlers::reservations::available_times),
        )
        .route("/api/intro-content", get(handlers::content::get_content))
        .layer(from_fn_with_state((limiter.clone(), Tier::Public), rate_limit));

    // 3. Booking create/change: strictest limit (5 req/5min)
    let booking_routes = Router::new()
        .route(
            "/api/reservations",
            post(handlers::reservations::create).put(handlers::reservations::reschedule),
        )
        .layer(from_fn_with_state((limiter.clone(), Tier::Booking), rate_limit));

    // 4. Auth: password attempts (10 req/min)
    let auth_routes = Router::new()
        .route("/api/auth/verify-admin", post(handlers::auth::verify_admin))
        .route("/api/auth/check-auth", get(handlers::auth::check_auth))
        .layer(from_fn_with_state((limiter.clone(), Tier::Auth), rate_limit));

    // 5. Admin writes (120 req/min; session enforced in the handlers)
    let admin_routes = Router::new()
        .route("/api/settings", post(handlers::settings::save_settings))
        .route("/api/intro-content", post(handlers::content::save_content))
        .layer(from_fn_with_state((limiter.clone(), Tier::Admin), rate_limit));

    let app = Router::new()
        .merge(no_limit_routes)
        .merge(public_routes)
        .merge(booking_routes)
        .merge(auth_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    tracing::info!("PT Studio server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
