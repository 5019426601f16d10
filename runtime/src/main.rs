use std::{net::SocketAddr, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method, header};
use dotenvy::dotenv;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use krypton_runtime::{
    AppState,
    ai::ResponsesClient,
    airtable::{
        AirtableClient, AirtableOntologyRepository, InMemoryOntologyRepository,
        OntologyRepository, OntologyService,
    },
    build_router,
    config::{AppConfig, Secrets, load_config},
    pipeline::{
        ChunkConfig, DocumentAnalyzer, DocumentExtractor, DoclingExtractor, LlmSuggestionEngine,
        TiktokenTokenizer, TokenizerChunker, TypeSuggestionEngine, Utf8DocumentExtractor,
    },
    rate_limit::RateLimiter,
    storage::TtlCache,
    validation::UploadValidator,
};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = ?err, "Admin backend crashed");
            eprintln!("Admin backend crashed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    init_tracing();
    if dotenv().is_err() {
        info!("No .env file found, reading secrets from the process environment");
    }

    let config = load_config()
        .await
        .context("Failed to load application configuration")?;
    let secrets = Secrets::from_env();
    let state = build_state(config, &secrets)?;

    let shutdown = CancellationToken::new();
    let sweeper = state
        .suggestions_cache
        .spawn_sweeper(state.config.suggestions.sweep_interval(), shutdown.clone());

    let addr_string = format!("{}:{}", state.config.server.host, state.config.server.port);
    let addr = addr_string
        .parse::<SocketAddr>()
        .with_context(|| format!("Invalid server address: {addr_string}"))?;

    let app = build_router(Arc::clone(&state)).layer(cors_layer(&state.config.server.cors_origins));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind TCP listener on {addr}"))?;
    info!(%addr, "Admin backend listening");

    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    shutdown.cancel();
    if let Err(err) = sweeper.await {
        warn!(error = %err, "Cache sweeper did not stop cleanly");
    }

    server_result.context("Server encountered a fatal error")?;
    Ok(())
}

fn build_state(config: AppConfig, secrets: &Secrets) -> Result<Arc<AppState>> {
    let airtable_limiter = Arc::new(RateLimiter::new(
        config.airtable.requests_per_window,
        config.airtable.window(),
    ));

    let airtable = match &secrets.airtable_api_key {
        Some(key) => Some(Arc::new(
            AirtableClient::new(&config.airtable, key.clone(), airtable_limiter)
                .context("Failed to configure Airtable client")?,
        )),
        None => {
            warn!("AIRTABLE_API_KEY not set, ontologies are kept in memory only");
            None
        }
    };
    let repo: Arc<dyn OntologyRepository> = match &airtable {
        Some(client) => Arc::new(AirtableOntologyRepository::new(client.clone())),
        None => Arc::new(InMemoryOntologyRepository::new()),
    };

    let engine: Option<Arc<dyn TypeSuggestionEngine>> = match &secrets.openai_api_key {
        Some(key) => {
            let client = ResponsesClient::new(key.clone(), config.suggestions.openai_base_url.clone())?;
            Some(Arc::new(LlmSuggestionEngine::new(
                Arc::new(client),
                config.suggestions.model.clone(),
                config.suggestions.max_entity_types,
                config.suggestions.max_edge_types,
            )))
        }
        None => {
            warn!("OPENAI_API_KEY not set, type suggestions are unavailable");
            None
        }
    };

    let extractor: Arc<dyn DocumentExtractor> = match &config.docling.base_url {
        Some(url) => Arc::new(DoclingExtractor::new(url.clone(), config.docling.timeout())?),
        None => {
            info!("No conversion service configured, only text uploads are analysed");
            Arc::new(Utf8DocumentExtractor)
        }
    };

    let tokenizer = Arc::new(TiktokenTokenizer::new().context("Failed to load tokenizer")?);
    let chunker = Arc::new(TokenizerChunker::new(tokenizer));
    let analyzer = Arc::new(DocumentAnalyzer::new(
        extractor,
        chunker.clone(),
        ChunkConfig::from(config.chunking.clone()),
    ));

    info!(
        host = %config.server.host,
        port = config.server.port,
        cache_ttl_secs = config.suggestions.cache_ttl_secs,
        airtable = airtable.is_some(),
        suggestions = engine.is_some(),
        "Loaded configuration"
    );

    Ok(Arc::new(AppState {
        suggestions_cache: Arc::new(TtlCache::new(config.suggestions.cache_ttl())),
        analyzer,
        engine,
        ontologies: OntologyService::new(repo),
        airtable,
        chunker,
        uploads: UploadValidator::new(&config.uploads),
        config: Arc::new(config),
    }))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                if stream.recv().await.is_some() {
                    info!("Received SIGTERM");
                }
            }
            Err(err) => warn!(error = %err, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received termination signal (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received termination signal (SIGTERM)");
        }
    }
}
