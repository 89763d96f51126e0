use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

use pelorus::config::Config;
use pelorus::services::linking::{CandidateFinder, LinkingLadder, VendorAffinityCache};
use pelorus::services::{HttpEmbeddingClient, PgSearchDatabase, SearchDatabase, SearchService};
use pelorus::{AppState, db, handlers, models};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::search::search,
        handlers::links::suggest_links,
        handlers::links::record_decision,
        handlers::links::list_links,
        handlers::system::health,
    ),
    components(
        schemas(
            models::SearchRequest,
            models::SearchResponse,
            models::EntityParam,
            models::ResultRowDto,
            models::SearchStats,
            models::InboundEmailRequest,
            models::AttachmentMeta,
            models::LadderResponse,
            models::LinkSuggestionDto,
            models::LinkDecisionRequest,
            models::StoredLinkDto,
        )
    ),
    tags(
        (name = "Search", description = "Federated PMS search"),
        (name = "Links", description = "Email linking ladder"),
        (name = "System", description = "Service health"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    init_tracing(&config);

    tracing::info!("Starting pelorus v{}", env!("CARGO_PKG_VERSION"));

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let database: Arc<dyn SearchDatabase> = Arc::new(PgSearchDatabase::new(pool));
    let embedder = Arc::new(HttpEmbeddingClient::new(config.embedding.clone()));
    let affinity = Arc::new(VendorAffinityCache::new());

    let search_service =
        Arc::new(SearchService::new(Arc::clone(&database), config.clone()));
    let finder = CandidateFinder::new(
        Arc::clone(&database),
        config.search.clone(),
        config.linking.clone(),
    );
    let linking_ladder = Arc::new(LinkingLadder::new(
        Arc::clone(&database),
        finder,
        embedder,
        affinity,
        config.linking.clone(),
    ));

    let state = Arc::new(AppState {
        config: config.clone(),
        db: database,
        search_service,
        linking_ladder,
    });

    let app = Router::new()
        .route("/api/search", post(handlers::search::search))
        .route("/api/links/suggest", post(handlers::links::suggest_links))
        .route("/api/links/decision", post(handlers::links::record_decision))
        .route("/api/links/:thread_id", get(handlers::links::list_links))
        .route("/api/health", get(handlers::system::health))
        .route(
            "/api/openapi.json",
            get(|| async { axum::Json(ApiDoc::openapi()) }),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));

    match &config.logging.file {
        Some(path) => {
            let directory = std::path::Path::new(path)
                .parent()
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = std::path::Path::new(path)
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "pelorus.log".to_string());
            let appender = tracing_appender::rolling::daily(directory, file_name);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(appender))
                .init();
        },
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        },
    }
}
