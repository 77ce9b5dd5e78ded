mod catalog;
mod config;
mod dateranges;
mod error;
mod handlers;
mod query_params;
mod responses;
mod state;
mod stores;

use std::sync::Arc;

use axum::Router;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use catalog::LinesCatalog;
use config::Config;
use error::{ApiError, ErrorResponse};
use state::AppState;
use stores::{PgAlertStore, PgTimetableStore};

/// Serves the read-only HTTP query surface over the alert store built by
/// `alerts-ingester`. Mirrors `web_server.py`'s `serve -c <config>`.
#[derive(Parser, Debug)]
#[command(name = "alerts-query-api")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    Serve {
        #[arg(short, long)]
        config: String,
    },
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Transit Alerts Query API", version = "0.1.0"),
    paths(
        handlers::alerts::all_alerts,
        handlers::alerts::single_alert,
        handlers::route_changes::get_route_changes,
        handlers::lines::all_lines,
        handlers::lines::single_line,
        handlers::health::health,
    ),
    components(schemas(
        responses::AlertView,
        responses::AllAlertsResponse,
        responses::SingleAlertResponse,
        responses::LineView,
        responses::AllLinesResponse,
        responses::SingleLineResponse,
        handlers::health::HealthResponse,
        ErrorResponse,
    )),
    tags(
        (name = "alerts", description = "Alert listing and lookup"),
        (name = "lines", description = "Static timetable line catalog"),
        (name = "health", description = "Service health check")
    )
)]
struct ApiDoc;

async fn run(cfg_path: &str) -> Result<(), ApiError> {
    let cfg = Config::load(cfg_path)?;
    tracing::info!(bind_addr = %cfg.http.bind_addr, "loaded configuration");

    let cors_layer = if cfg.http.cors_permissive {
        tracing::warn!("CORS: permissive mode enabled (all origins allowed) - do not use in production");
        CorsLayer::permissive()
    } else if !cfg.http.cors_origins.is_empty() {
        tracing::info!(origins = ?cfg.http.cors_origins, "CORS: restricting to configured origins");
        let origins: Vec<_> = cfg.http.cors_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([axum::http::Method::GET])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        panic!("CORS configuration error: set 'cors_origins' or 'cors_permissive: true' for development");
    };

    let gtfs_pool = PgPoolOptions::new().connect(&cfg.postgres.gtfs_dsn).await?;
    let alerts_pool = PgPoolOptions::new().connect(&cfg.postgres.alerts_dsn).await?;

    let timetable = Arc::new(PgTimetableStore::new(gtfs_pool));
    let alert_store = Arc::new(PgAlertStore::new(alerts_pool));

    let routes = timetable.all_routes().await?;
    let lines_catalog = LinesCatalog::build(routes);
    tracing::info!(routes = lines_catalog.len(), "built lines catalog");

    let state = Arc::new(AppState::new(timetable, alert_store, lines_catalog));

    let app: Router<()> = handlers::router()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    let listener = tokio::net::TcpListener::bind(&cfg.http.bind_addr).await?;
    tracing::info!(addr = %cfg.http.bind_addr, "server listening");
    tracing::info!("Swagger UI: http://{}/swagger-ui", cfg.http.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info,sqlx=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let Command::Serve { config } = cli.command;

    if let Err(e) = run(&config).await {
        tracing::error!(error = %e, "server exited");
        std::process::exit(1);
    }
}
