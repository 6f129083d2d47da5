use std::net::SocketAddr;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod error;
mod extract;
mod middleware;
mod routes;
mod state;
mod store;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stride API",
        version = "0.1.0",
        description = "Backend for the Stride productivity tracker: tasks, focus sessions, and XP/streak progress."
    ),
    paths(
        routes::health::health_check,
        routes::auth::register,
        routes::tasks::create_task,
        routes::tasks::list_tasks,
        routes::tasks::update_task,
        routes::tasks::delete_task,
        routes::tasks::complete_task,
        routes::completions::create_completion,
        routes::completions::list_completions,
        routes::progress::get_progress,
        routes::progress::reset_progress,
    ),
    components(schemas(
        routes::health::HealthResponse,
        routes::auth::RegisterRequest,
        routes::auth::RegisterResponse,
        routes::tasks::Task,
        routes::tasks::CreateTaskRequest,
        routes::tasks::UpdateTaskRequest,
        routes::tasks::CompleteTaskRequest,
        routes::tasks::CompleteTaskResponse,
        routes::progress::ProgressResponse,
        stride_core::error::ApiError,
        stride_core::events::Completion,
        stride_core::events::CompletionMetadata,
        stride_core::events::CreateCompletionRequest,
        stride_core::events::CompletionResponse,
        stride_core::events::PaginatedResponse<stride_core::events::Completion>,
        stride_core::progress::CompletionEvent,
        stride_core::progress::CompletionKind,
        stride_core::progress::DailyStat,
        stride_core::progress::HistoryEntry,
        stride_core::progress::ProgressSummary,
        stride_core::progress::UserProgress,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
    }
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stride_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Database connection
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let app_state = state::AppState { db: pool };

    // CORS
    let cors_layer = middleware::cors::build_cors_layer();

    // Router with per-endpoint rate limiting on auth and write routes
    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::auth::register_router().layer(middleware::rate_limit::register_layer()))
        .merge(routes::tasks::write_router().layer(middleware::rate_limit::write_layer()))
        .merge(routes::tasks::read_router().layer(middleware::rate_limit::read_layer()))
        .merge(routes::completions::write_router().layer(middleware::rate_limit::write_layer()))
        .merge(routes::completions::read_router().layer(middleware::rate_limit::read_layer()))
        .merge(routes::progress::write_router().layer(middleware::rate_limit::write_layer()))
        .merge(routes::progress::read_router().layer(middleware::rate_limit::read_layer()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Stride API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
