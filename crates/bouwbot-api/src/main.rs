use std::env;
use std::sync::Arc;

use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bouwbot_api::router::create_router;
use bouwbot_api::state::AppState;
use bouwbot_core::config::EngineConfig;
use bouwbot_engine::{tool_catalog, BufferQueryEngine, Geocoder, StoreCache, ToolRouter};
use bouwbot_llm::OpenAiChat;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bouwbot_api=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port: u16 = env::var("BOUWBOT_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(3001);

    let api_key = match bouwbot_core::config::require_env("OPENAI_API_KEY") {
        Ok(key) => key,
        Err(e) => {
            tracing::error!("{}", e);
            tracing::error!(
                "Remediation:\n\
                1. Create an API key for an OpenAI-compatible chat endpoint\n\
                2. export OPENAI_API_KEY=<key>\n\
                3. Optionally set BOUWBOT_OPENAI_BASE_URL and BOUWBOT_CHAT_MODEL"
            );
            std::process::exit(1);
        }
    };

    let base_url = env::var("BOUWBOT_OPENAI_BASE_URL")
        .unwrap_or_else(|_| "https://api.openai.com".to_string());
    let model = env::var("BOUWBOT_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

    // Layered config: defaults < optional TOML file < environment
    let mut config = EngineConfig::with_defaults();
    if let Ok(path) = env::var("BOUWBOT_CONFIG") {
        config = match config.load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(path = %path, error = %e, "Failed to load config file");
                std::process::exit(1);
            }
        };
    }
    let config = config.load_from_env();

    tracing::info!(port, model = %model, "Starting BouwBot API server");

    // The dataset is loaded once, before the server accepts traffic, so a
    // broken data path fails loudly instead of on the first query.
    let cache = StoreCache::new();
    let store = match cache.get_or_load(&config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to load building dataset: {}", e);
            tracing::error!(
                "Remediation:\n\
                1. Check BOUWBOT_BUILDINGS_PATH and BOUWBOT_BOUNDARY_PATH\n\
                2. Both layers must be GeoJSON with a declared CRS\n\
                3. The building layer must contain at least one feature"
            );
            std::process::exit(1);
        }
    };

    let engine = Arc::new(BufferQueryEngine::new(store, &config));
    let geocoder = Arc::new(Geocoder::default());
    let tools = ToolRouter::new(engine, geocoder);
    let provider = Arc::new(OpenAiChat::new(base_url, api_key, model));

    let state = Arc::new(AppState::new(
        provider,
        tools,
        tool_catalog(),
        config.default_center.value,
        config.default_zoom.value,
        config.output_dir.value.clone(),
    ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let app = create_router(state).layer(TraceLayer::new_for_http()).layer(cors);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await.unwrap();
}
