use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use voicestudio::client::ApiClient;
use voicestudio::config::Config;
use voicestudio::dispatch::WorkDispatcher;
use voicestudio::download::{DownloadEvent, DownloadOrchestrator};
use voicestudio::error::{Result, VoiceError};
use voicestudio::models::{format_bytes, Catalog, CommandModelFactory, ModelFetcher, ModelRegistry};
use voicestudio::server::{self, AppState};
use voicestudio::store::{JsonStatusStore, StatusStore};

#[derive(Parser)]
#[command(name = "voicestudio")]
#[command(about = "Text-to-speech model server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// List the models this server can run
    Catalog,
    /// Show recorded download states of a running server
    States {
        /// Only these models
        model_ids: Vec<String>,
    },
    /// Download a model without starting the server
    ///
    /// Writes to the same status file as the server, so stop the server first.
    Download { model_id: String },
    /// List models loaded in a running server
    Loaded,
    /// Load a model in a running server
    Load { model_id: String },
    /// Unload a model from a running server
    Unload { model_id: String },
    /// Synthesize speech through a running server
    Say { model_id: String, text: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voicestudio=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        None | Some(Commands::Serve) => run_server(config).await,
        Some(Commands::Catalog) => {
            print_catalog();
            Ok(())
        }
        Some(Commands::States { model_ids }) => show_states(&config, model_ids).await,
        Some(Commands::Download { model_id }) => run_download(&config, model_id).await,
        Some(Commands::Loaded) => {
            let ids = ApiClient::from_config(&config.server).loaded_models().await?;
            if ids.is_empty() {
                println!("No models loaded");
            }
            for id in ids {
                println!("{id}");
            }
            Ok(())
        }
        Some(Commands::Load { model_id }) => {
            let response = ApiClient::from_config(&config.server)
                .load_model(&model_id)
                .await?;
            println!("{}", response.message);
            Ok(())
        }
        Some(Commands::Unload { model_id }) => {
            let response = ApiClient::from_config(&config.server)
                .unload_model(&model_id)
                .await?;
            println!("{}", response.message);
            Ok(())
        }
        Some(Commands::Say { model_id, text }) => {
            let output = ApiClient::from_config(&config.server)
                .synthesize(&model_id, &text)
                .await?;
            println!("{}", output.filename);
            Ok(())
        }
    }
}

fn build_registry(config: &Config) -> Arc<ModelRegistry> {
    let fetcher = ModelFetcher::new(config.storage.hf_cache.clone());
    tracing::debug!("Model cache: {}", fetcher.cache_dir().display());
    let factory = CommandModelFactory::new(config.synthesizer.clone(), fetcher);
    Arc::new(ModelRegistry::new(Catalog::builtin(), factory))
}

fn open_store(config: &Config) -> Result<Arc<dyn StatusStore>> {
    let store = JsonStatusStore::open(config.storage.status_path())?;
    tracing::info!("Status store: {}", store.path().display());
    Ok(Arc::new(store))
}

async fn run_server(config: Config) -> Result<()> {
    tracing::info!("Starting voicestudio server");

    let store = open_store(&config)?;
    let registry = build_registry(&config);
    let dispatcher = Arc::new(WorkDispatcher::from_config(&config.workers));

    let state = AppState::new(
        registry,
        dispatcher,
        store,
        config.server.output_dir.clone(),
        config.synthesizer.extension.clone(),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{addr}");

    server::serve(listener, state, server::shutdown_signal()).await?;
    tracing::info!("Server stopped");
    Ok(())
}

fn print_catalog() {
    for info in Catalog::builtin().iter() {
        println!(
            "{:<16} {:>10}  lang={} voice={}  {}",
            info.id,
            format_bytes(info.size_mb * 1024 * 1024),
            info.default_lang,
            info.default_voice,
            info.description
        );
    }
}

async fn show_states(config: &Config, model_ids: Vec<String>) -> Result<()> {
    let filter = (!model_ids.is_empty()).then_some(model_ids);
    let states = ApiClient::from_config(&config.server)
        .download_states(filter.as_deref())
        .await?;

    if states.is_empty() {
        println!("No downloads recorded");
    }
    for state in states {
        println!(
            "{:<16} {:<12} {}",
            state.model_id, state.download_status, state.modified_time
        );
    }
    Ok(())
}

async fn run_download(config: &Config, model_id: String) -> Result<()> {
    let orchestrator = Arc::new(DownloadOrchestrator::new(
        build_registry(config),
        open_store(config)?,
    ));

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .map_err(|e| VoiceError::Other(format!("Invalid progress template: {e}")))?,
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(format!("Downloading {model_id}"));

    let mut session = orchestrator.start(Some(model_id.clone()));
    while let Some(event) = session.events.recv().await {
        match event {
            DownloadEvent::Status { status, .. } => pb.set_message(format!("{model_id}: {status}")),
            DownloadEvent::Error { error, .. } => pb.set_message(format!("{model_id}: {error}")),
        }
    }

    let outcome = session
        .task
        .await
        .map_err(|e| VoiceError::Other(format!("Download task failed: {e}")))?;

    match outcome {
        Ok(status) => {
            pb.finish_with_message(format!("{model_id}: {status}"));
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message(format!("{model_id}: failed"));
            Err(e)
        }
    }
}
