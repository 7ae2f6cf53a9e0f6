//! Khidmat server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::get,
};
use khidmat_api::{middleware::AppState, router as api_router};
use khidmat_common::{Config, config::CorsConfig, set_expose_error_details};
use khidmat_core::{
    AuthService, DutyChartService, FinanceService, LogMailer, Mailer, MiqaatService,
    NotificationService, SmtpMailer, UserService,
};
use khidmat_db::repositories::{
    DutyChartRepository, MiqaatRepository, NotificationRepository, PaymentRepository,
    UserRepository,
};
use serde_json::json;
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "khidmat=debug,tower_http=debug".into());

    if config.server.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .init();
    }
}

/// Cross-origin policy: configured origins, plus preview deployments when enabled.
fn cors_layer(cors: CorsConfig) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .is_ok_and(|origin| cors.is_origin_allowed(origin))
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

fn build_mailer(config: &Config) -> Result<Arc<dyn Mailer>, Box<dyn std::error::Error>> {
    match &config.email {
        Some(email) => {
            let mailer = SmtpMailer::new(email)?;
            info!(host = %email.smtp_host, "SMTP mailer configured");
            Ok(Arc::new(mailer))
        }
        None => {
            info!("No email configuration, outgoing mail will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    init_tracing(&config);
    info!(environment = %config.server.environment, "Starting khidmat server...");

    set_expose_error_details(!config.server.is_production());

    // Connect to database
    let db = Arc::new(khidmat_db::init(&config).await?);
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    khidmat_db::migrate(&db).await?;
    info!("Migrations completed");

    // Initialize repositories
    let user_repo = UserRepository::new(Arc::clone(&db));
    let duty_chart_repo = DutyChartRepository::new(Arc::clone(&db));
    let miqaat_repo = MiqaatRepository::new(Arc::clone(&db));
    let notification_repo = NotificationRepository::new(Arc::clone(&db));
    let payment_repo = PaymentRepository::new(Arc::clone(&db));

    // Initialize services
    let mailer = build_mailer(&config)?;
    let login_url = config.email.as_ref().and_then(|e| e.login_url.clone());
    let auth_service = AuthService::new(&config.auth);
    let user_service =
        UserService::new(user_repo.clone(), auth_service.clone(), mailer, login_url);
    let notification_service = NotificationService::new(notification_repo, user_repo.clone());
    let duty_chart_service = DutyChartService::new(
        duty_chart_repo,
        user_repo.clone(),
        notification_service.clone(),
    );
    let miqaat_service = MiqaatService::new(
        miqaat_repo,
        user_repo.clone(),
        notification_service.clone(),
    );
    let finance_service =
        FinanceService::new(payment_repo, user_repo, config.finance.clone());

    let state = AppState {
        auth_service,
        user_service,
        duty_chart_service,
        miqaat_service,
        notification_service,
        finance_service,
    };

    // Build router
    let app = Router::new()
        .route(
            "/health",
            get(|| async { Json(json!({ "success": true, "status": "ok" })) }),
        )
        .nest("/api", api_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            khidmat_api::middleware::auth_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config.cors.clone()))
        .with_state(state);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
