//! Render server binary.
//!
//! Wires the local adapters into the render pipeline and serves the HTTP API.

use reelsmith::adapters::local::{
    api, compositor::CompositorCli, fetch::HttpFetcher, ffmpeg::FfmpegExecutor, fs::FsAdapter,
    memory::InMemoryJobStore,
};
use reelsmith::application::engine::RenderEngine;
use reelsmith::application::fallback::FallbackEncoder;
use reelsmith::application::materializer::AssetMaterializer;
use reelsmith::application::{JobOrchestrator, RenderPipeline};
use reelsmith::ports::renderer::PrimaryRenderer;
use reelsmith::RenderConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = RenderConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    for dir in [&config.output_dir, &config.scratch_dir, &config.upload_dir] {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(dir = %dir.display(), error = %e, "could not create directory");
        }
    }

    // 1. Primary engine, probed once
    let compositor = CompositorCli::from_config(&config);
    let engine = match compositor.probe().await {
        Ok(()) => {
            info!(engine = compositor.name(), "primary engine detected");
            RenderEngine::new(Arc::new(compositor), config.composition_id.clone())
        }
        Err(e) => {
            warn!(error = %e, "primary engine unavailable, renders use the fallback encoder");
            RenderEngine::unavailable(config.composition_id.clone())
        }
    };

    // 2. Adapters
    let store = Arc::new(InMemoryJobStore::new());
    let storage = Arc::new(
        FsAdapter::new(config.public_dir.clone())
            .mount("uploads", config.upload_dir.clone())
            .with_local_origin(&config.public_base_url),
    );
    let fetcher = match HttpFetcher::new(Duration::from_secs(60)) {
        Ok(fetcher) => Arc::new(fetcher),
        Err(e) => {
            error!(error = %e, "failed to build HTTP client");
            std::process::exit(1);
        }
    };
    let outputs = Arc::new(FsAdapter::new(config.output_dir.clone()));

    // 3. Application services
    let materializer = AssetMaterializer::new(
        storage,
        fetcher,
        config.scratch_dir.clone(),
        config.public_base_url.clone(),
    );
    let fallback = FallbackEncoder::new(Arc::new(FfmpegExecutor::new()), &config);
    let pipeline = RenderPipeline::new(
        store.clone(),
        materializer,
        Arc::new(engine),
        fallback,
        outputs,
        config.clone(),
    );
    let orchestrator = Arc::new(JobOrchestrator::new(
        store,
        Arc::new(pipeline),
        config.max_concurrent_renders,
    ));

    // 4. HTTP layer
    let app = api::router(orchestrator.clone(), &config);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port))
        .await
        .expect("Failed to bind TCP listener");
    info!("Listening at {}:{}", config.addr, config.port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed to start");

    orchestrator.shutdown().await;
    info!("render server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
