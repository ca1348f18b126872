use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod chain;
mod config;
mod constants;
mod db;
mod error;
mod models;
mod operations;
mod pipeline;
mod utils;

use chain::EvmChainClient;
use config::{Config, StoreBackend};
use constants::API_VERSION;
use db::{Database, MemoryRecordStore, RecordStore};
use pipeline::{
    sweep::spawn_expiry_sweep, Dispatcher, MemoryPipelineStore, PipelineRegistry, PipelineRunner,
    PipelineService, PipelineSettings, PipelineStore, RedisPipelineStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chain_pipeline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting chain pipeline server");
    tracing::info!("Environment: {}", config.environment);
    tracing::info!("API Version: {}", API_VERSION);
    tracing::info!(
        "Chain id {} via {} (testnet: {})",
        config.chain_id,
        config.chain_rpc_url,
        config.is_testnet()
    );

    // Pipeline store
    let store: Arc<dyn PipelineStore> = match config.pipeline_store {
        StoreBackend::Memory => Arc::new(MemoryPipelineStore::new()),
        StoreBackend::Redis => {
            tracing::info!("Connecting pipeline store to Redis...");
            Arc::new(RedisPipelineStore::connect(&config.redis_url).await?)
        }
    };
    let registry = Arc::new(PipelineRegistry::new(store));

    // Chain records
    let records: Arc<dyn RecordStore> = if config.database_url.is_some() {
        let db = Database::new(&config).await?;
        tracing::info!("Running database migrations...");
        db.run_migrations().await?;
        Arc::new(db)
    } else {
        tracing::warn!("DATABASE_URL not set; chain records are kept in memory");
        Arc::new(MemoryRecordStore::new())
    };

    let client = EvmChainClient::from_config(&config)?;

    let settings = Arc::new(PipelineSettings::from_config(&config));
    let runner = PipelineRunner::new(registry.clone(), Arc::new(client), records.clone(), settings.clone());
    let dispatcher = Arc::new(Dispatcher::new(config.max_inflight_pipelines));
    let service = PipelineService::new(runner, dispatcher);

    // Start background services
    let sweep = spawn_expiry_sweep(
        registry,
        settings.retention,
        settings.sweep_interval,
        service.shutdown_signal(),
    );

    let app_state = api::AppState {
        service: service.clone(),
        config: config.clone(),
        records_backend: records.backend_name(),
    };
    let app = build_router(app_state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, draining pipelines...");
    if !service.shutdown(config.shutdown_grace()).await {
        tracing::warn!("Some pipelines were still running at exit");
    }
    if let Err(err) = sweep.await {
        tracing::warn!("Expiry sweep ended abnormally: {}", err);
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn build_router(state: api::AppState) -> Router {
    let cors = cors_from_config(&state.config);

    Router::new()
        // Health
        .route("/health", get(api::health::health_check))
        // NFT
        .route("/api/v1/nft/mint", post(api::nft::mint))
        // DAO
        .route("/api/v1/dao/proposals", post(api::dao::create_proposal))
        .route(
            "/api/v1/dao/proposals/{proposal_id}/vote",
            post(api::dao::vote),
        )
        .route(
            "/api/v1/dao/proposals/{proposal_id}/close",
            post(api::dao::close_proposal),
        )
        // Pipelines
        .route("/api/v1/pipelines", get(api::pipelines::list))
        .route(
            "/api/v1/pipelines/{request_id}",
            get(api::pipelines::get_status),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_from_config(config: &Config) -> CorsLayer {
    let raw = config.cors_allowed_origins.trim();
    if raw.is_empty() || raw == "*" {
        return CorsLayer::very_permissive();
    }

    let allowed: Vec<HeaderValue> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins parsed; falling back to permissive");
        return CorsLayer::very_permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::{ScriptedChainClient, SubmitScript};
    use crate::config::test_config;
    use crate::error::PipelineError;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app_with(client: ScriptedChainClient) -> Router {
        let config = test_config();
        let registry = Arc::new(PipelineRegistry::new(Arc::new(MemoryPipelineStore::new())));
        let runner = PipelineRunner::new(
            registry,
            Arc::new(client),
            Arc::new(MemoryRecordStore::new()),
            Arc::new(PipelineSettings::from_config(&config)),
        );
        let service = PipelineService::new(runner, Arc::new(Dispatcher::new(4)));
        build_router(api::AppState {
            service,
            config,
            records_backend: "memory",
        })
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    const RECIPIENT: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    #[tokio::test]
    async fn health_reports_backends() {
        let app = app_with(ScriptedChainClient::new());
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["pipelineStore"], "memory");
        assert_eq!(body["recordStore"], "memory");
    }

    #[tokio::test(start_paused = true)]
    async fn sync_mint_returns_submission() {
        let app = app_with(
            ScriptedChainClient::new().with_submits(vec![SubmitScript::Succeed("0xabc".into())]),
        );
        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/nft/mint",
            Some(json!({ "to": RECIPIENT, "tokenUri": "ipfs://sword" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["txHash"], "0xabc");
        assert_eq!(body["data"]["status"], "SUBMITTED");
        assert_eq!(body["data"]["attempts"], 1);
        assert_eq!(body["data"]["referenceLink"], "https://explorer.test/tx/0xabc");
        assert_eq!(body["data"]["result"]["tokenUri"], "ipfs://sword");
    }

    #[tokio::test(start_paused = true)]
    async fn async_vote_is_accepted_and_trackable() {
        let app = app_with(ScriptedChainClient::new());
        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/dao/proposals/7/vote",
            Some(json!({ "support": true, "processAsync": true })),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        let request_id = body["data"]["requestId"].as_str().unwrap().to_string();
        assert!(request_id.starts_with("vote_"));
        assert_eq!(body["data"]["steps"].as_array().unwrap().len(), 7);
        let endpoint = body["data"]["statusCheckEndpoint"].as_str().unwrap().to_string();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let (status, body) = call(&app, "GET", &endpoint, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["requestId"], request_id);
        assert_eq!(body["data"]["kind"], "vote");
        assert_eq!(body["data"]["status"], "SUBMITTED");
        assert_eq!(body["data"]["txHash"], "0xfeed");
        assert!(body["data"]["estimatedCompletionTime"].is_string());

        let (status, body) = call(&app, "GET", "/api/v1/pipelines", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["requestId"], request_id);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_sync_pipeline_maps_to_bad_gateway() {
        let rejected = || SubmitScript::Fail(PipelineError::Submission("execution reverted".into()));
        let app = app_with(ScriptedChainClient::new().with_submits(vec![
            rejected(),
            rejected(),
            rejected(),
        ]));
        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/dao/proposals",
            Some(json!({ "description": "Raise the item cap" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "PIPELINE_FAILED");
        assert_eq!(body["error"]["details"]["errorKind"], "rejected");
        let request_id = body["error"]["details"]["requestId"].as_str().unwrap();

        let (_, body) = call(&app, "GET", &format!("/api/v1/pipelines/{}", request_id), None).await;
        assert_eq!(body["data"]["status"], "ERROR");
        assert!(body["data"]["progressPercent"].as_u64().unwrap() < 100);
    }

    #[tokio::test]
    async fn invalid_mint_is_rejected_before_creation() {
        let app = app_with(ScriptedChainClient::new());
        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/nft/mint",
            Some(json!({ "to": "0x1234", "tokenUri": "ipfs://sword" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");

        let (_, body) = call(&app, "GET", "/api/v1/pipelines", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn close_accepts_empty_body() {
        let app = app_with(ScriptedChainClient::new());
        let (status, body) = call(&app, "POST", "/api/v1/dao/proposals/3/close", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["txHash"], "0xfeed");
    }

    #[tokio::test]
    async fn unknown_pipeline_is_not_found() {
        let app = app_with(ScriptedChainClient::new());
        let (status, body) = call(&app, "GET", "/api/v1/pipelines/mint_0_000000000000", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }
}
