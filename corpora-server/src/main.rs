mod config;
mod error;
mod routes;
mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use config::{read_config_from_toml, read_source_list};
use corpora_core::catalog::memory::{InMemoryCatalog, InMemoryPendingStore};
use corpora_core::catalog::{Catalog, PendingStore};
use corpora_discovery::{AnySource, Dispatcher, IncrementalSource};
use log::{debug, info};
use state::AppState;
use tower_http::cors::{Any, CorsLayer};

const DEFAULT_LOGGING_LEVEL: &str = "info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = std::env::var("RUST_LOG")
        .map_err(|_| std::env::set_var("RUST_LOG", DEFAULT_LOGGING_LEVEL));
    pretty_env_logger::init_timed();

    let config = read_config_from_toml();
    debug!("config: {config:?}");

    let catalog: Arc<dyn Catalog> = Arc::new(InMemoryCatalog::new());
    let pending: Arc<dyn PendingStore> = Arc::new(InMemoryPendingStore::new());
    let sketch = Arc::new(corpora_core::sketch::InMemorySketchIndex::new());

    let mut dispatcher = Dispatcher::new(catalog.clone()).with_sketch(sketch.clone());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    if let Some(path) = &config.source_list_path {
        match read_source_list(path) {
            Ok(entries) => {
                for entry in entries {
                    let source = AnySource::Incremental(IncrementalSource::new(
                        entry.url.clone(),
                        entry.url.clone(),
                    ));
                    spawn_discovery_loop(source, &catalog, &pending, &dispatcher, shutdown_rx.clone());
                }
            }
            Err(e) => log::error!("failed to read source list {path}: {e}"),
        }
    } else {
        info!("no source_list_path configured; HTTP API runs without background discovery");
    }

    let dispatcher = Arc::new(dispatcher);
    tokio::spawn(dispatcher.run());

    let app_state = AppState {
        catalog: catalog.clone(),
        sketch: sketch.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::POST, axum::http::Method::GET])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let app = Router::new()
        .route("/search", post(routes::search))
        .route("/download/:id", get(routes::download))
        .route("/metadata/:id", get(routes::metadata))
        .route("/augment", post(routes::augment_reserved))
        .layer(cors)
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("listening on {}", config.listen_addr);
    axum::serve(listener, app).await?;

    let _ = shutdown_tx.send(true);
    Ok(())
}

fn spawn_discovery_loop(
    source: AnySource,
    catalog: &Arc<dyn Catalog>,
    pending: &Arc<dyn PendingStore>,
    dispatcher: &Dispatcher,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
) {
    let catalog = catalog.clone();
    let pending = pending.clone();
    let handle = dispatcher.handle();
    tokio::spawn(corpora_discovery::loop_runner::run(
        source, catalog, pending, handle, shutdown_rx,
    ));
}

